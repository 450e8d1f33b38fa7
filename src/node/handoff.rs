//! Edge-triggered handoff lines between adjacent nodes
//!
//! A line carries momentary pulses, not levels: a pulse raised while the
//! listener is not armed is lost, exactly like a GPIO edge interrupt that is
//! not enabled. The listener is one-shot: it disarms itself on the first
//! observed edge and must be re-armed for the next cycle.
//!
//! Because edges are not queued, arming order matters: a node must arm its
//! upstream listener *before* releasing its downstream neighbor, otherwise
//! the neighbor's earliest `Prepare` pulse can arrive at a dead line.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::debug;

use crate::runtime::errors::HandoffError;

/// How often a blocked `wait()` wakes to check the stop flag and deadline.
const WAIT_POLL: Duration = Duration::from_millis(50);

/// The two logical pulse kinds a node can send downstream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PulseKind {
    /// Early pipelined handoff, sent when the buffer crosses its threshold.
    Prepare,
    /// Sent after the node's own reset completes.
    Release,
}

struct LineShared {
    armed: AtomicBool,
    tx: Sender<PulseKind>,
}

/// Downstream end of a handoff line: the side that pulses.
#[derive(Clone)]
pub struct EdgeOutput {
    shared: Arc<LineShared>,
    min_pulse_width: Duration,
}

/// Upstream end of a handoff line: the side that listens.
pub struct EdgeInput {
    shared: Arc<LineShared>,
    rx: Receiver<PulseKind>,
}

/// Create a handoff line between two adjacent nodes.
///
/// `min_pulse_width` is the assertion duration for each outgoing pulse; it
/// must exceed the listening side's minimum detectable pulse width.
pub fn line(min_pulse_width: Duration) -> (EdgeOutput, EdgeInput) {
    // Capacity 1: an edge detector latches at most one pending edge.
    let (tx, rx) = bounded(1);
    let shared = Arc::new(LineShared {
        armed: AtomicBool::new(false),
        tx,
    });
    (
        EdgeOutput {
            shared: Arc::clone(&shared),
            min_pulse_width,
        },
        EdgeInput { shared, rx },
    )
}

impl EdgeOutput {
    /// Assert the line for at least the configured pulse width.
    ///
    /// Delivery is best-effort on purpose: if the listener is not armed the
    /// edge is dropped, never queued for later. Returns whether an armed
    /// listener latched the edge; on a pipelined line the release pulse
    /// routinely finds the neighbor already unstalled, so the drop itself
    /// is not an anomaly and is logged at debug only.
    pub fn pulse(&self, kind: PulseKind) -> bool {
        let delivered = if self.shared.armed.load(Ordering::Acquire) {
            if self.shared.tx.try_send(kind).is_err() {
                // An edge is already latched; the detector sees one event.
                debug!(?kind, "pulse coalesced with a pending edge");
            }
            true
        } else {
            debug!(?kind, "pulse dropped, listener not armed");
            false
        };
        if !self.min_pulse_width.is_zero() {
            thread::sleep(self.min_pulse_width);
        }
        delivered
    }
}

impl EdgeInput {
    /// Arm the one-shot edge listener, discarding any stale latched edge
    /// from a previous cycle.
    pub fn arm(&self) {
        while self.rx.try_recv().is_ok() {}
        self.shared.armed.store(true, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.shared.armed.load(Ordering::Acquire)
    }

    /// Block until a pulse arrives on the armed line.
    ///
    /// Wakes periodically to honor `stop` and the optional `deadline`
    /// (`HandoffError::Timeout` reports the observable stall condition). On
    /// success the listener disarms itself and reports which pulse kind
    /// released it.
    pub fn wait(
        &self,
        deadline: Option<Duration>,
        stop: &AtomicBool,
    ) -> Result<PulseKind, HandoffError> {
        let started = Instant::now();
        loop {
            if stop.load(Ordering::Relaxed) {
                return Err(HandoffError::Stopped);
            }
            if let Some(limit) = deadline
                && started.elapsed() >= limit
            {
                return Err(HandoffError::Timeout { waited: limit });
            }
            match self.rx.recv_timeout(WAIT_POLL) {
                Ok(kind) => {
                    self.shared.armed.store(false, Ordering::Release);
                    return Ok(kind);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(HandoffError::Disconnected),
            }
        }
    }
}
