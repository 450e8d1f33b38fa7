//! Phase-liveness watchdog for detecting stalled nodes
//!
//! Low-overhead monitoring using atomic timestamps instead of locks. Each
//! node records its current phase and phase-entry time in atomics, and the
//! watchdog periodically scans them to find nodes stuck in one phase. That
//! is the observable form of the stall deadlock, where an upstream neighbor
//! never pulses and a node sits in STALLED forever.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::node::machine::NodePhase;

/// Timestamp in milliseconds since UNIX_EPOCH
#[inline(always)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Shared state for a single node's phase tracking
struct NodeState {
    /// Current phase, as `NodePhase as u8`
    phase: AtomicU8,
    /// Timestamp (ms since epoch) when the current phase was entered
    entered_at: AtomicU64,
    /// Track if we've already warned about this node being stuck
    has_warned: AtomicBool,
    node_name: String,
}

/// Handle to a node's watchdog state (held by the node control loop)
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<NodeState>,
}

impl WatchdogHandle {
    /// Record a phase transition (stores the phase and current timestamp)
    pub fn enter_phase(&self, phase: NodePhase) {
        if self.state.has_warned.swap(false, Ordering::Relaxed) {
            info!(
                "recovered: [{}] left {} after a stall warning",
                self.state.node_name,
                NodePhase::from_u8(self.state.phase.load(Ordering::Relaxed))
            );
        }
        self.state.phase.store(phase as u8, Ordering::Relaxed);
        self.state.entered_at.store(now_millis(), Ordering::Relaxed);
    }
}

/// Shared watchdog state
#[derive(Clone)]
pub struct Watchdog {
    nodes: Arc<Mutex<Vec<Weak<NodeState>>>>,
    enabled: Arc<Mutex<bool>>,
    threshold: Duration,
}

impl Watchdog {
    /// Watchdog that reports nodes stuck in one phase for more than 5 seconds
    pub fn new() -> Self {
        Self::with_threshold(Duration::from_secs(5))
    }

    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            nodes: Arc::new(Mutex::new(Vec::new())),
            enabled: Arc::new(Mutex::new(true)),
            threshold,
        }
    }

    /// Register a new node for monitoring
    pub fn register_node(&self, node_name: &str) -> WatchdogHandle {
        let state = Arc::new(NodeState {
            phase: AtomicU8::new(NodePhase::Stalled as u8),
            entered_at: AtomicU64::new(now_millis()),
            has_warned: AtomicBool::new(false),
            node_name: node_name.to_string(),
        });

        self.nodes.lock().unwrap().push(Arc::downgrade(&state));

        WatchdogHandle { state }
    }

    /// Scan for nodes that have been in their current phase too long
    pub fn check_for_blocked(&self) {
        let now = now_millis();
        let threshold_ms = self.threshold.as_millis() as u64;

        let mut nodes = self.nodes.lock().unwrap();

        // Remove dead weak references and check live ones
        nodes.retain(|weak| {
            if let Some(state) = weak.upgrade() {
                let entered = state.entered_at.load(Ordering::Relaxed);
                let stuck_ms = now.saturating_sub(entered);
                if stuck_ms > threshold_ms {
                    // Only warn once per phase entry
                    if !state.has_warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            "stuck: [{}] in {} for {:.1}s",
                            state.node_name,
                            NodePhase::from_u8(state.phase.load(Ordering::Relaxed)),
                            stuck_ms as f64 / 1000.0
                        );
                    }
                }
                true
            } else {
                false
            }
        });
    }

    /// Start the watchdog monitoring thread
    pub fn start_monitoring_thread(&self) -> std::thread::JoinHandle<()> {
        let watchdog = self.clone();
        std::thread::spawn(move || {
            loop {
                std::thread::sleep(Duration::from_millis(250));

                if !*watchdog.enabled.lock().unwrap() {
                    break;
                }

                watchdog.check_for_blocked();
            }
        })
    }

    /// Stop the watchdog monitoring thread
    pub fn stop(&self) {
        *self.enabled.lock().unwrap() = false;
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}
