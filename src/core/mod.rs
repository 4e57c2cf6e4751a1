//! Core types - pure abstractions shared across the codebase.

mod key;
mod mode;
mod state;
mod status;

pub use key::{ElmJsonPath, OutputPath, SessionId};
pub use mode::{CompilationMode, RunMode};
pub use state::{is_shutdown, register_shutdown, setup_shutdown_handler};
pub use status::{CompileKind, Status};
