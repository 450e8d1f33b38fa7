//! Chain runtime: per-node threads, liveness monitoring, and the error
//! taxonomy shared across the crate.

pub mod errors;
pub mod scheduler;
pub mod watchdog;

pub use errors::{ConfigError, HandoffError, NodeError, TransferError, TransportError};
pub use scheduler::ChainScheduler;
pub use watchdog::{Watchdog, WatchdogHandle};
