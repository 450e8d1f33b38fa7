//! Node state machine
//!
//! One acquisition node cycles through
//! `Stalled → Sampling → Full → Transferring → Resetting` forever, advancing
//! a debug-visible cycle counter by the chain length each pass. A single
//! dispatch loop drives the phases; each exit condition is a named event
//! (upstream pulse, buffer full, transfer done) rather than a flag poll.
//!
//! Locking discipline: the producer's edge worker is the only buffer writer
//! and it is joined in `Full` before `Transferring` reads, so the transfer
//! never races a commit.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use tracing::{debug, info, warn};

use crate::runtime::errors::{HandoffError, NodeError, TransferError, TransportError};
use crate::runtime::watchdog::WatchdogHandle;
use crate::transport::{Transport, transfer};

use super::buffer::SampleBuffer;
use super::config::NodeConfig;
use super::handoff::{EdgeInput, EdgeOutput, PulseKind};
use super::sampler::{AdcPeripheral, SampleEvent, SampleProducer, Trigger};

/// How often the sampling wait wakes to notice a stop request.
const EVENT_POLL: Duration = Duration::from_millis(50);

/// The five phases of a node's acquisition cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NodePhase {
    Stalled = 0,
    Sampling = 1,
    Full = 2,
    Transferring = 3,
    Resetting = 4,
}

impl NodePhase {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => NodePhase::Sampling,
            2 => NodePhase::Full,
            3 => NodePhase::Transferring,
            4 => NodePhase::Resetting,
            _ => NodePhase::Stalled,
        }
    }
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            NodePhase::Stalled => "STALLED",
            NodePhase::Sampling => "SAMPLING",
            NodePhase::Full => "FULL",
            NodePhase::Transferring => "TRANSFERRING",
            NodePhase::Resetting => "RESETTING",
        };
        write!(f, "{name}")
    }
}

/// Snapshot of a node's phase and cycle counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleState {
    pub phase: NodePhase,
    pub cycle: u64,
}

struct CycleCell {
    phase: AtomicU8,
    cycle: AtomicU64,
}

/// Cloneable observer handle onto a node's live cycle state.
#[derive(Clone)]
pub struct CycleStateHandle {
    cell: Arc<CycleCell>,
}

impl CycleStateHandle {
    pub fn phase(&self) -> NodePhase {
        NodePhase::from_u8(self.cell.phase.load(Ordering::Acquire))
    }

    pub fn cycle(&self) -> u64 {
        self.cell.cycle.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> CycleState {
        CycleState {
            phase: self.phase(),
            cycle: self.cycle(),
        }
    }
}

/// One acquisition node: producer, handoff lines, transfer link, and the
/// perpetual control loop tying them together.
pub struct AcqNode {
    name: String,
    config: NodeConfig,
    buffer: Arc<Mutex<SampleBuffer>>,
    producer: SampleProducer,
    upstream: EdgeInput,
    downstream: EdgeOutput,
    events_rx: Receiver<SampleEvent>,
    link: Box<dyn Transport>,
    cell: Arc<CycleCell>,
    /// Head of the chain skips the stall exactly once, on its first pass.
    unlocked: bool,
    watchdog: Option<WatchdogHandle>,
}

impl AcqNode {
    /// Build a node from its configuration and collaborators.
    ///
    /// The upstream input is the line this node is released on; the
    /// downstream output is the line it pulses toward the next node. Fails
    /// if the config is invalid or the injected link does not match the
    /// configured transport.
    pub fn new(
        config: NodeConfig,
        adc: Box<dyn AdcPeripheral>,
        link: Box<dyn Transport>,
        upstream: EdgeInput,
        downstream: EdgeOutput,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        if link.kind() != config.transport {
            return Err(TransportError::Unavailable(format!(
                "configured {} but link is {}",
                config.transport,
                link.kind()
            ))
            .into());
        }

        let buffer = Arc::new(Mutex::new(SampleBuffer::new(
            config.capacity,
            config.record_timestamps,
        )));
        let (events_tx, events_rx) = bounded(4);
        let producer = SampleProducer::new(
            config.threshold,
            Arc::clone(&buffer),
            adc,
            events_tx,
            downstream.clone(),
        );

        Ok(Self {
            name: format!("node-{}", config.position),
            unlocked: config.head,
            config,
            buffer,
            producer,
            upstream,
            downstream,
            events_rx,
            link,
            cell: Arc::new(CycleCell {
                phase: AtomicU8::new(NodePhase::Stalled as u8),
                cycle: AtomicU64::new(0),
            }),
            watchdog: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle for delivering trigger edges to this node's producer.
    pub fn trigger(&self) -> Trigger {
        self.producer.trigger()
    }

    /// Observer handle onto the live phase and cycle counter.
    pub fn cycle_state(&self) -> CycleStateHandle {
        CycleStateHandle {
            cell: Arc::clone(&self.cell),
        }
    }

    /// Attach a watchdog handle (done by the scheduler).
    pub fn set_watchdog(&mut self, handle: WatchdogHandle) {
        self.watchdog = Some(handle);
    }

    fn enter(&mut self, phase: NodePhase) {
        self.cell.phase.store(phase as u8, Ordering::Release);
        if let Some(watchdog) = &self.watchdog {
            watchdog.enter_phase(phase);
        }
        debug!("[{}] -> {}", self.name, phase);
    }

    /// Run the perpetual control loop until a stop request or a fatal
    /// error. There is no planned shutdown in the protocol itself.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), NodeError> {
        info!(
            "[{}] starting ({}, capacity {}, threshold {}, {} transport)",
            self.name,
            if self.config.head { "head" } else { "chained" },
            self.config.capacity,
            self.config.threshold,
            self.config.transport
        );
        // Listen before anyone can possibly pulse us.
        self.upstream.arm();

        while self.run_cycle(stop)? {}
        info!("[{}] stopped after cycle {}", self.name, self.cycle());
        Ok(())
    }

    fn cycle(&self) -> u64 {
        self.cell.cycle.load(Ordering::Acquire)
    }

    /// One full pass of the state machine. Returns `Ok(false)` when a stop
    /// was requested.
    fn run_cycle(&mut self, stop: &AtomicBool) -> Result<bool, NodeError> {
        // ── STALLED ────────────────────────────────────────────────────
        if self.unlocked {
            // Head of the chain: the first pass goes straight to sampling.
            self.unlocked = false;
            debug!("[{}] head starts unlocked", self.name);
        } else {
            self.enter(NodePhase::Stalled);
            loop {
                match self.upstream.wait(self.config.stall_timeout, stop) {
                    Ok(PulseKind::Prepare) if !self.config.pipelined => {
                        // Strict token ring: only a release pulse unstalls.
                        debug!("[{}] prepare pulse ignored, waiting for release", self.name);
                        self.upstream.arm();
                    }
                    Ok(kind) => {
                        debug!("[{}] released by {kind:?} pulse", self.name);
                        break;
                    }
                    Err(HandoffError::Stopped) => return Ok(false),
                    Err(err) => return Err(err.into()),
                }
            }
        }

        // ── SAMPLING ───────────────────────────────────────────────────
        self.enter(NodePhase::Sampling);
        while self.events_rx.try_recv().is_ok() {}
        self.producer.enable();
        loop {
            if stop.load(Ordering::Relaxed) {
                self.producer.disable();
                return Ok(false);
            }
            match self.events_rx.recv_timeout(EVENT_POLL) {
                Ok(SampleEvent::ThresholdCrossed { cursor }) => {
                    debug!("[{}] threshold crossed at {cursor}, prepare sent", self.name);
                }
                Ok(SampleEvent::BufferFull { cursor }) => {
                    debug!("[{}] buffer full at {cursor}", self.name);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(false),
            }
        }

        // ── FULL ───────────────────────────────────────────────────────
        self.enter(NodePhase::Full);
        // Joining the edge worker here is the entire locking discipline:
        // no commit can race the transfer read below.
        self.producer.disable();

        // ── TRANSFERRING ───────────────────────────────────────────────
        self.enter(NodePhase::Transferring);
        {
            let buffer = self.buffer.lock().unwrap();
            match transfer(&buffer, self.link.as_mut()) {
                Ok(bytes) => debug!("[{}] transferred {bytes} bytes", self.name),
                Err(TransferError::Incomplete { written, expected }) => {
                    // Keep the chain's cadence: this cycle's data is lost.
                    warn!(
                        "[{}] incomplete transfer ({written}/{expected} bytes), proceeding to reset",
                        self.name
                    );
                }
                Err(TransferError::Transport(err)) => return Err(err.into()),
            }
        }

        // ── RESETTING ──────────────────────────────────────────────────
        self.enter(NodePhase::Resetting);
        self.buffer.lock().unwrap().clear();
        let cycle = self
            .cell
            .cycle
            .fetch_add(self.config.chain_len as u64, Ordering::AcqRel)
            + self.config.chain_len as u64;
        // Re-arm before releasing: the neighbor may cross its threshold and
        // pulse back at us arbitrarily soon after this release.
        self.upstream.arm();
        if !self.downstream.pulse(PulseKind::Release) && !self.config.pipelined {
            // In a strict ring the neighbor must be stalled on this line.
            warn!("[{}] release pulse found no armed listener", self.name);
        }
        debug!("[{}] reset complete, cycle counter {cycle}", self.name);
        Ok(true)
    }
}
