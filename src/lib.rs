//! Cooperative ring of ADC acquisition nodes with pipelined buffer handoff
//!
//! This crate implements the coordination core of a chain of independent
//! acquisition nodes that digitize an analog signal continuously, one node
//! active at a time, and relay each completed sample block to a downstream
//! collector over a byte-oriented link.
//!
//! # Architecture
//!
//! - **SampleProducer**: trigger-edge worker performing one blocking ADC
//!   read per edge, with inline threshold and buffer-full signaling
//! - **Handoff lines**: edge-triggered pulses between adjacent nodes
//!   enforcing "exactly one node samples at a time"
//! - **Transfer layer**: little-endian serialization of a completed buffer
//!   over the configured transport (SPI bulk, UART per-sample, I2C per-byte)
//! - **AcqNode**: the STALLED → SAMPLING → FULL → TRANSFERRING → RESETTING
//!   state machine, run forever on its own thread by [`ChainScheduler`]
//!
//! # Example
//!
//! ```no_run
//! use adcring::{AcqNode, ChainScheduler, NodeConfig, handoff};
//! use std::time::Duration;
//!
//! # fn adc() -> Box<dyn adcring::AdcPeripheral> { unimplemented!() }
//! # fn link() -> Box<dyn adcring::Transport> { unimplemented!() }
//! // Two-node ring: each node's downstream line is its neighbor's upstream.
//! let (a_down, b_up) = handoff::line(Duration::from_millis(1));
//! let (b_down, a_up) = handoff::line(Duration::from_millis(1));
//!
//! let mut scheduler = ChainScheduler::new();
//! scheduler.start_node(AcqNode::new(
//!     NodeConfig::new(0, 2, 32768, 22222),
//!     adc(), link(), a_up, a_down,
//! )?);
//! scheduler.start_node(AcqNode::new(
//!     NodeConfig::new(1, 2, 32768, 22222),
//!     adc(), link(), b_up, b_down,
//! )?);
//! scheduler.wait();
//! # Ok::<(), adcring::NodeError>(())
//! ```

pub mod collector;
pub mod node;
pub mod runtime;
pub mod transport;

pub use node::handoff;

// Re-export the node core
pub use node::{
    AcqNode, AdcPeripheral, CycleState, CycleStateHandle, NodeConfig, NodePhase, PulseKind,
    SampleBuffer, SampleEvent, SampleProducer, Trigger,
};

// Re-export the transfer layer
pub use transport::{ChannelLink, Transport, TransportKind, transfer};

// Re-export runtime components
pub use runtime::{
    ChainScheduler, ConfigError, HandoffError, NodeError, TransferError, TransportError, Watchdog,
};

// Re-export collector-side helpers
pub use collector::{BlockAssembler, BlockWriter, read_block};
