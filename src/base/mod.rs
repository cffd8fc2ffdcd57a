pub mod scheduler;
pub mod signal;

pub use scheduler::{Cycle, Scheduler};
pub use signal::{DataVector, SigValue, Signal, SignalId};
