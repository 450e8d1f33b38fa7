//! Error types for the acquisition runtime

use std::time::Duration;

/// Error type for node configuration validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("buffer capacity must be non-zero")]
    ZeroCapacity,

    #[error("threshold {threshold} out of range (0, {capacity}]")]
    ThresholdOutOfRange { threshold: usize, capacity: usize },

    #[error("chain must have at least one node")]
    EmptyChain,

    #[error("node position {position} out of range for chain of {chain_len}")]
    PositionOutOfRange { position: usize, chain_len: usize },
}

/// Error type for the handoff protocol
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    /// The configured stall deadline elapsed without an upstream pulse.
    #[error("handoff timeout: no upstream pulse within {waited:?}")]
    Timeout { waited: Duration },

    /// The upstream end of the line was dropped.
    #[error("upstream handoff line disconnected")]
    Disconnected,

    /// The scheduler requested shutdown while waiting.
    #[error("stop requested while stalled")]
    Stopped,
}

/// Error type for the physical link boundary
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link failed to initialize; fatal for the node's cycle.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The receiving side of an in-process link went away.
    #[error("link peer disconnected")]
    Disconnected,
}

/// Error type for buffer transfer operations
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The link reported fewer bytes than the committed prefix serializes
    /// to. Surfaced distinctly from success; retry policy belongs to the
    /// node state machine.
    #[error("incomplete transfer: {written} of {expected} bytes written")]
    Incomplete { written: usize, expected: usize },
}

/// Fatal errors that terminate a node's control loop
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
