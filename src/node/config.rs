//! Per-node configuration, fixed at chain construction time

use std::time::Duration;

use crate::runtime::errors::ConfigError;
use crate::transport::TransportKind;

/// Immutable configuration for one acquisition node.
///
/// Built with [`NodeConfig::new`] plus `with_*` setters; [`validate`] is
/// called by the node constructor, so an invalid config never reaches a
/// running chain.
///
/// [`validate`]: NodeConfig::validate
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// Position of this node in the chain, 0-based.
    pub position: usize,
    /// Head of the chain starts unlocked; everyone else waits for handoff.
    pub head: bool,
    /// Buffer capacity in samples.
    pub capacity: usize,
    /// Fill level at which the early `Prepare` pulse goes downstream.
    pub threshold: usize,
    /// Physical link used to move completed buffers off the node.
    pub transport: TransportKind,
    /// Number of cooperating nodes; advances the debug cycle counter.
    pub chain_len: usize,
    /// Minimum assertion duration for outgoing handoff pulses. Must exceed
    /// the downstream edge detector's minimum detectable pulse width.
    pub min_pulse_width: Duration,
    /// Record a microsecond timestamp alongside each sample.
    pub record_timestamps: bool,
    /// Pipelined handoff: the early `Prepare` pulse releases this node from
    /// its stall, as in the shared-line chain wiring. When false the node
    /// runs a strict token ring and only a `Release` pulse unstalls it.
    pub pipelined: bool,
    /// Give up on an upstream pulse after this long. `None` preserves the
    /// original stall-forever behavior (the watchdog still warns).
    pub stall_timeout: Option<Duration>,
}

impl NodeConfig {
    /// Config with defaults: head iff position 0, SPI transport, no
    /// timestamps, no stall timeout, 1ms pulse width.
    pub fn new(position: usize, chain_len: usize, capacity: usize, threshold: usize) -> Self {
        Self {
            position,
            head: position == 0,
            capacity,
            threshold,
            transport: TransportKind::Spi,
            chain_len,
            min_pulse_width: Duration::from_millis(1),
            record_timestamps: false,
            pipelined: true,
            stall_timeout: None,
        }
    }

    pub fn with_pipelined(mut self, pipelined: bool) -> Self {
        self.pipelined = pipelined;
        self
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_head(mut self, head: bool) -> Self {
        self.head = head;
        self
    }

    pub fn with_min_pulse_width(mut self, width: Duration) -> Self {
        self.min_pulse_width = width;
        self
    }

    pub fn with_timestamps(mut self, record: bool) -> Self {
        self.record_timestamps = record;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Check the structural invariants: non-zero capacity, threshold in
    /// `(0, capacity]`, position inside the chain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.threshold == 0 || self.threshold > self.capacity {
            return Err(ConfigError::ThresholdOutOfRange {
                threshold: self.threshold,
                capacity: self.capacity,
            });
        }
        if self.chain_len == 0 {
            return Err(ConfigError::EmptyChain);
        }
        if self.position >= self.chain_len {
            return Err(ConfigError::PositionOutOfRange {
                position: self.position,
                chain_len: self.chain_len,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mark_position_zero_as_head() {
        assert!(NodeConfig::new(0, 3, 8, 6).head);
        assert!(!NodeConfig::new(1, 3, 8, 6).head);
    }

    #[test]
    fn validate_accepts_threshold_equal_to_capacity() {
        assert!(NodeConfig::new(0, 1, 8, 8).validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(matches!(
            NodeConfig::new(0, 1, 0, 1).validate(),
            Err(ConfigError::ZeroCapacity)
        ));
        assert!(matches!(
            NodeConfig::new(0, 1, 8, 0).validate(),
            Err(ConfigError::ThresholdOutOfRange { .. })
        ));
        assert!(matches!(
            NodeConfig::new(0, 1, 8, 9).validate(),
            Err(ConfigError::ThresholdOutOfRange { .. })
        ));
        assert!(matches!(
            NodeConfig::new(2, 2, 8, 4).validate(),
            Err(ConfigError::PositionOutOfRange { .. })
        ));
    }
}
