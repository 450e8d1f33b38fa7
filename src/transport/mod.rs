//! Physical link boundary for moving completed buffers off a node
//!
//! The link itself is an external collaborator; this module pins down only
//! the seam the transfer layer needs, `write_bytes`, plus the transport
//! selection value and a channel-backed link for in-process chains.

use std::fmt;

use crossbeam_channel::Sender;

use crate::runtime::errors::TransportError;

mod transfer;

pub use transfer::transfer;

/// Which physical link a node uses, selected at configuration time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Synchronous serial: one bulk transfer of the whole block.
    Spi,
    /// Asynchronous serial: one write per sample, low byte then high byte.
    Uart,
    /// Two-wire bus: one addressed transaction per byte.
    I2c,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportKind::Spi => write!(f, "spi"),
            TransportKind::Uart => write!(f, "uart"),
            TransportKind::I2c => write!(f, "i2c"),
        }
    }
}

/// A byte-oriented link capable of pushing a buffer off the node.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Write as many of `bytes` as the link accepts, returning the count
    /// actually taken. Partial completion is reported, not hidden.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, TransportError>;
}

/// In-process link that ships each write as one chunk over a channel,
/// e.g. to a collector thread reassembling blocks.
pub struct ChannelLink {
    kind: TransportKind,
    tx: Sender<Vec<u8>>,
}

impl ChannelLink {
    pub fn new(kind: TransportKind, tx: Sender<Vec<u8>>) -> Self {
        Self { kind, tx }
    }
}

impl Transport for ChannelLink {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, TransportError> {
        self.tx
            .send(bytes.to_vec())
            .map_err(|_| TransportError::Disconnected)?;
        Ok(bytes.len())
    }
}
