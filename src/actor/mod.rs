//! Actor system for watch mode.
//!
//! ```text
//! FsActor --> CompilerActor --> WsActor
//! (watch)    (schedule, decide)  (transport)
//!                 ^                  |
//!                 +---- client ------+
//! ```
//!
//! # Module Structure
//!
//! - `messages` - Message types for inter-actor communication
//! - `fs` - File system watcher with debouncing
//! - `compiler` - The coordinating loop: scheduling, compiles, reload decisions
//! - `ws` - WebSocket sessions
//! - `coordinator` - Wires up and runs actors

pub mod compiler;
pub mod coordinator;
pub mod fs;
pub mod messages;
pub mod ws;

pub use compiler::{CompilerSettings, RunSummary};
pub use coordinator::Coordinator;
