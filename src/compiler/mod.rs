//! Compiler process management.
//!
//! - `scheduler` - FIFO queue bounded by `maxParallel`
//! - `command` - `elm make`, postprocess and install invocations
//! - `process` - async subprocess runner with a kill switch
//! - `report` - human-readable compiler errors

pub mod command;
pub mod process;
pub mod report;
pub mod scheduler;

pub use process::ProcessOutcome;
pub use scheduler::Scheduler;
