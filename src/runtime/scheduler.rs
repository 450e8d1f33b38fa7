//! Thread-per-node scheduler for an acquisition chain
//!
//! Spawns a dedicated thread for each node's control loop and manages their
//! lifecycle. The chain protocol itself has no planned shutdown (nodes
//! cycle forever), so the scheduler owns the only stop mechanism: a shared
//! stop flag the node loops poll at their blocking points.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver as StdReceiver, Sender as StdSender, channel};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use super::watchdog::Watchdog;
use crate::node::machine::AcqNode;

/// Runtime scheduler that executes an acquisition chain
pub struct ChainScheduler {
    threads: Vec<(String, JoinHandle<()>)>,
    stop_signal: Arc<AtomicBool>,
    completion_tx: StdSender<String>,
    completion_rx: Option<StdReceiver<String>>,
    watchdog: Watchdog,
    watchdog_handle: JoinHandle<()>,
}

impl ChainScheduler {
    /// Create a new scheduler with watchdog monitoring
    pub fn new() -> Self {
        Self::with_watchdog(Watchdog::new())
    }

    pub fn with_watchdog(watchdog: Watchdog) -> Self {
        let (completion_tx, completion_rx) = channel();
        let watchdog_handle = watchdog.start_monitoring_thread();
        info!("watchdog enabled - will report nodes stuck in one phase");
        Self {
            threads: Vec::new(),
            stop_signal: Arc::new(AtomicBool::new(false)),
            completion_tx,
            completion_rx: Some(completion_rx),
            watchdog,
            watchdog_handle,
        }
    }

    /// Get a reference to the watchdog
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Start a node's control loop in its own thread
    pub fn start_node(&mut self, mut node: AcqNode) {
        let stop_signal = Arc::clone(&self.stop_signal);
        let completion_tx = self.completion_tx.clone();
        let name = node.name().to_string();
        let thread_name = name.clone();

        node.set_watchdog(self.watchdog.register_node(&name));
        debug!("starting node: {}", name);

        let handle = thread::spawn(move || {
            if let Err(e) = node.run(&stop_signal) {
                error!("[{}] node failed: {}", thread_name, e);
            }
            // Notify scheduler that this thread is about to complete
            let _ = completion_tx.send(thread_name);
        });

        self.threads.push((name, handle));
    }

    /// Signal all nodes to stop
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }

    /// Wait for all node threads to complete
    /// Uses a completion notification channel to join threads as they finish
    pub fn wait(mut self) {
        let completion_rx = self
            .completion_rx
            .take()
            .expect("completion_rx already taken");

        // Drop the main completion sender so the channel closes when all threads complete
        drop(self.completion_tx);

        let total_threads = self.threads.len();
        let mut completed = 0;

        info!("waiting for {} node threads to complete...", total_threads);

        let mut threads_by_name: HashMap<String, JoinHandle<()>> =
            self.threads.into_iter().collect();

        while completed < total_threads {
            match completion_rx.recv() {
                Ok(thread_name) => {
                    completed += 1;
                    if let Some(handle) = threads_by_name.remove(&thread_name) {
                        match handle.join() {
                            Ok(_) => info!(
                                "[{}] thread completed ({}/{})",
                                thread_name, completed, total_threads
                            ),
                            Err(e) => error!(
                                "[{}] thread panicked ({}/{}): {:?}",
                                thread_name, completed, total_threads, e
                            ),
                        }
                    }
                }
                Err(_) => {
                    // Channel closed - all thread senders dropped
                    break;
                }
            }
        }

        info!("all {} node threads completed", total_threads);

        self.watchdog.stop();
        let _ = self.watchdog_handle.join();
    }

    /// Get the number of running node threads
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Get the names of all running nodes
    pub fn node_names(&self) -> Vec<String> {
        self.threads.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Default for ChainScheduler {
    fn default() -> Self {
        Self::new()
    }
}
