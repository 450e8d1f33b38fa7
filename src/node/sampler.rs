//! Trigger-driven sample producer
//!
//! Stands in for the ADC trigger interrupt: a dedicated edge worker thread
//! blocks on the trigger line and performs exactly one blocking ADC read per
//! recognized edge, committing the value at the buffer cursor. Threshold and
//! buffer-full happen inline in edge context, each exactly once per
//! acquisition cycle, and are published to the control loop over a channel
//! rather than through shared flags.
//!
//! `enable()` arms the listener and spawns the worker; `disable()` disarms
//! and joins it, so once `disable()` returns no write can race a transfer
//! read of the buffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, trace, warn};

use super::buffer::SampleBuffer;
use super::handoff::{EdgeOutput, PulseKind};

/// How many trigger edges the line latches while the worker is busy with a
/// conversion. Edges beyond this are missed, as they would be on hardware.
const TRIGGER_LATCH: usize = 64;

/// How often the idle worker wakes to notice `disable()`.
const IDLE_POLL: std::time::Duration = std::time::Duration::from_millis(10);

/// The ADC peripheral boundary: one blocking single-sample conversion.
pub trait AdcPeripheral: Send {
    fn read(&mut self) -> u16;
}

/// Events published from edge context to the node control loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleEvent {
    /// The cursor just crossed the configured fill threshold; the `Prepare`
    /// pulse has already gone downstream.
    ThresholdCrossed { cursor: usize },
    /// The buffer is full; sampling for this cycle is complete.
    BufferFull { cursor: usize },
}

/// Cloneable handle for delivering rising edges on the trigger input.
#[derive(Clone)]
pub struct Trigger {
    tx: Sender<()>,
    enabled: Arc<AtomicBool>,
}

impl Trigger {
    /// Deliver one rising edge. Edges are recognized only while the producer
    /// is enabled; anything else is dropped at the pin.
    pub fn edge(&self) {
        if !self.enabled.load(Ordering::Acquire) {
            trace!("trigger edge ignored, producer disabled");
            return;
        }
        if self.tx.try_send(()).is_err() {
            debug!("trigger edge missed, latch full");
        }
    }
}

/// Interrupt-style sample producer for one node.
pub struct SampleProducer {
    threshold: usize,
    enabled: Arc<AtomicBool>,
    trigger_tx: Sender<()>,
    trigger_rx: Receiver<()>,
    buffer: Arc<Mutex<SampleBuffer>>,
    adc: Arc<Mutex<Box<dyn AdcPeripheral>>>,
    events_tx: Sender<SampleEvent>,
    downstream: EdgeOutput,
    worker: Option<JoinHandle<()>>,
}

impl SampleProducer {
    pub fn new(
        threshold: usize,
        buffer: Arc<Mutex<SampleBuffer>>,
        adc: Box<dyn AdcPeripheral>,
        events_tx: Sender<SampleEvent>,
        downstream: EdgeOutput,
    ) -> Self {
        let (trigger_tx, trigger_rx) = bounded(TRIGGER_LATCH);
        Self {
            threshold,
            enabled: Arc::new(AtomicBool::new(false)),
            trigger_tx,
            trigger_rx,
            buffer,
            adc: Arc::new(Mutex::new(adc)),
            events_tx,
            downstream,
            worker: None,
        }
    }

    /// A handle the trigger source (or a test) uses to deliver edges.
    pub fn trigger(&self) -> Trigger {
        Trigger {
            tx: self.trigger_tx.clone(),
            enabled: Arc::clone(&self.enabled),
        }
    }

    /// Arm the edge listener and spawn the edge worker.
    pub fn enable(&mut self) {
        if self.worker.is_some() {
            return;
        }
        // Stale edges from before this cycle must not replay.
        while self.trigger_rx.try_recv().is_ok() {}
        self.enabled.store(true, Ordering::Release);

        let enabled = Arc::clone(&self.enabled);
        let rx = self.trigger_rx.clone();
        let buffer = Arc::clone(&self.buffer);
        let adc = Arc::clone(&self.adc);
        let events = self.events_tx.clone();
        let downstream = self.downstream.clone();
        let threshold = self.threshold;

        self.worker = Some(thread::spawn(move || {
            while enabled.load(Ordering::Acquire) {
                match rx.recv_timeout(IDLE_POLL) {
                    Ok(()) => handle_edge(&buffer, &adc, &events, &downstream, threshold),
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }));
    }

    /// Deregister the edge listener and join the worker.
    ///
    /// Must be called before the transfer layer reads the buffer; after it
    /// returns, no further commit can happen until the next `enable()`.
    pub fn disable(&mut self) {
        self.enabled.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("sample producer worker panicked");
        }
        while self.trigger_rx.try_recv().is_ok() {}
    }
}

fn handle_edge(
    buffer: &Mutex<SampleBuffer>,
    adc: &Mutex<Box<dyn AdcPeripheral>>,
    events: &Sender<SampleEvent>,
    downstream: &EdgeOutput,
    threshold: usize,
) {
    // One blocking conversion per edge, before the commit.
    let value = adc.lock().unwrap().read();
    let timestamp = now_micros();

    let (cursor, filled) = {
        let mut buf = buffer.lock().unwrap();
        match buf.push(value, timestamp) {
            Some(cursor) => (cursor, buf.is_full()),
            None => {
                debug!("late trigger edge after full buffer, dropped");
                return;
            }
        }
    };

    // The cursor is monotonic within a cycle, so both conditions hold at
    // most once between resets. Pulse outside the buffer lock.
    if cursor == threshold {
        downstream.pulse(PulseKind::Prepare);
        let _ = events.send(SampleEvent::ThresholdCrossed { cursor });
    }
    if filled {
        let _ = events.send(SampleEvent::BufferFull { cursor });
    }
}

/// Microseconds since the first call in this process. Monotonic.
pub fn now_micros() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::handoff;
    use std::collections::VecDeque;
    use std::time::Duration;

    pub(crate) struct ScriptedAdc {
        values: VecDeque<u16>,
    }

    impl ScriptedAdc {
        pub(crate) fn new(values: impl IntoIterator<Item = u16>) -> Self {
            Self {
                values: values.into_iter().collect(),
            }
        }
    }

    impl AdcPeripheral for ScriptedAdc {
        fn read(&mut self) -> u16 {
            self.values.pop_front().unwrap_or(0)
        }
    }

    fn wait_for_cursor(buffer: &Mutex<SampleBuffer>, cursor: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while buffer.lock().unwrap().cursor() < cursor {
            assert!(Instant::now() < deadline, "cursor never reached {cursor}");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn producer_under_test(
        capacity: usize,
        threshold: usize,
        values: Vec<u16>,
    ) -> (
        SampleProducer,
        Arc<Mutex<SampleBuffer>>,
        Receiver<SampleEvent>,
        handoff::EdgeInput,
    ) {
        let buffer = Arc::new(Mutex::new(SampleBuffer::new(capacity, false)));
        let (events_tx, events_rx) = bounded(capacity + 2);
        let (downstream, listener) = handoff::line(Duration::ZERO);
        let producer = SampleProducer::new(
            threshold,
            Arc::clone(&buffer),
            Box::new(ScriptedAdc::new(values)),
            events_tx,
            downstream,
        );
        (producer, buffer, events_rx, listener)
    }

    #[test]
    fn k_edges_commit_k_values_in_order() {
        let (mut producer, buffer, _events, _listener) =
            producer_under_test(8, 8, vec![10, 11, 12, 13, 14]);
        let trigger = producer.trigger();

        producer.enable();
        for _ in 0..5 {
            trigger.edge();
        }
        wait_for_cursor(&buffer, 5);
        producer.disable();

        let buf = buffer.lock().unwrap();
        assert_eq!(buf.cursor(), 5);
        assert_eq!(buf.committed(), &[10, 11, 12, 13, 14]);
        assert!(!buf.is_full());
    }

    #[test]
    fn prepare_pulse_fires_exactly_once_at_threshold() {
        let (mut producer, buffer, events, listener) =
            producer_under_test(8, 6, (0..8).map(|v| v as u16 + 10).collect());
        let trigger = producer.trigger();
        let stop = AtomicBool::new(false);

        listener.arm();
        producer.enable();
        for _ in 0..8 {
            trigger.edge();
        }
        wait_for_cursor(&buffer, 8);

        // The prepare pulse arrives with the sixth commit, never earlier.
        assert_eq!(listener.wait(None, &stop).unwrap(), PulseKind::Prepare);
        assert_eq!(
            events.recv_timeout(Duration::from_secs(1)).unwrap(),
            SampleEvent::ThresholdCrossed { cursor: 6 }
        );
        assert_eq!(
            events.recv_timeout(Duration::from_secs(1)).unwrap(),
            SampleEvent::BufferFull { cursor: 8 }
        );

        // Spurious extra edges: no second pulse, no further events.
        listener.arm();
        for _ in 0..4 {
            trigger.edge();
        }
        thread::sleep(Duration::from_millis(50));
        producer.disable();
        assert!(matches!(
            listener.wait(Some(Duration::from_millis(100)), &stop),
            Err(crate::runtime::errors::HandoffError::Timeout { .. })
        ));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn edges_after_full_are_no_ops() {
        let (mut producer, buffer, events, _listener) =
            producer_under_test(3, 3, vec![1, 2, 3, 4, 5]);
        let trigger = producer.trigger();

        producer.enable();
        for _ in 0..5 {
            trigger.edge();
        }
        wait_for_cursor(&buffer, 3);
        thread::sleep(Duration::from_millis(50));
        producer.disable();

        let buf = buffer.lock().unwrap();
        assert_eq!(buf.committed(), &[1, 2, 3]);
        assert!(buf.is_full());
        // Exactly one full notification despite the extra edges.
        let fulls = events
            .try_iter()
            .filter(|e| matches!(e, SampleEvent::BufferFull { .. }))
            .count();
        assert_eq!(fulls, 1);
    }

    #[test]
    fn edges_while_disabled_are_dropped() {
        let (mut producer, buffer, _events, _listener) = producer_under_test(4, 4, vec![9, 9]);
        let trigger = producer.trigger();

        trigger.edge();
        trigger.edge();
        producer.enable();
        thread::sleep(Duration::from_millis(50));
        producer.disable();

        assert_eq!(buffer.lock().unwrap().cursor(), 0);
    }
}
