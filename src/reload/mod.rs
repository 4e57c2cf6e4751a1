//! Hot reload.
//!
//! ```text
//! CompilerActor --Success--> ReloadHub --decide--> Outbox --frames--> WsActor --> page
//!       ^                                                                  |
//!       +--------------------[Hello / PatchApplied / EvalError]------------+
//! ```
//!
//! # Modules
//!
//! - `fingerprint` - summary of a compiled artifact
//! - `decide` - no action / hot patch / full reload for one connection
//! - `batch` - per-session coalescing of outgoing messages
//! - `hub` - connected sessions and what each one runs
//! - `message` - wire protocol
//! - `server` - websocket acceptor

pub mod batch;
pub mod decide;
pub mod fingerprint;
pub mod hub;
pub mod message;
pub mod server;

pub use decide::Baseline;
pub use fingerprint::Fingerprint;
pub use hub::{ReloadHub, Subscription};
pub use message::{ClientMessage, ServerMessage};
