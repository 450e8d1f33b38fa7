//! The per-node acquisition core: buffer, handoff lines, sample producer,
//! and the state machine that cycles them.

pub mod buffer;
pub mod config;
pub mod handoff;
pub mod machine;
pub mod sampler;

pub use buffer::SampleBuffer;
pub use config::NodeConfig;
pub use handoff::{EdgeInput, EdgeOutput, PulseKind, line};
pub use machine::{AcqNode, CycleState, CycleStateHandle, NodePhase};
pub use sampler::{AdcPeripheral, SampleEvent, SampleProducer, Trigger};
