//! Actor Message Definitions
//!
//! ```text
//! FsActor --SourcesChanged--> CompilerActor --Send--> WsActor
//!                                  ^    ^                |
//!             compile tasks -------+    +----Client------+
//! ```

use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{ElmJsonPath, OutputPath, SessionId};
use crate::reload::{ClientMessage, Fingerprint};

// =============================================================================
// CompilerActor Messages
// =============================================================================

/// Result of one compile task.
#[derive(Debug)]
pub enum CompileOutcome {
    /// Typecheck-only compile passed
    Typechecked,
    /// Full compile (and postprocess) passed; `code` is already in the
    /// temporary output file
    Compiled {
        code: Arc<str>,
        fingerprint: Fingerprint,
    },
    CompileError(String),
    /// Killed because a newer change arrived
    Interrupted,
}

#[derive(Debug)]
pub struct CompileReport {
    pub key: OutputPath,
    pub generation: u64,
    pub outcome: CompileOutcome,
    pub compile: Duration,
    pub postprocess: Option<Duration>,
}

/// Messages to Compiler Actor
#[derive(Debug)]
pub enum CompilerMsg {
    /// `.elm` files created, modified or removed
    SourcesChanged(Vec<PathBuf>),
    /// `elm.json` files changed
    ElmJsonChanged(Vec<PathBuf>),
    /// `elm-watch.json` changed
    ConfigChanged,
    /// Message from a connected program
    Client {
        session: SessionId,
        message: ClientMessage,
    },
    Disconnected(SessionId),
    /// A compile task moved on to its postprocess step
    Postprocessing { key: OutputPath, generation: u64 },
    Compiled(Box<CompileReport>),
    Installed {
        group: ElmJsonPath,
        result: Result<(), String>,
    },
    Shutdown,
}

// =============================================================================
// WsActor Messages
// =============================================================================

/// Messages to WebSocket Actor
#[derive(Debug)]
pub enum WsMsg {
    /// Accepted TCP stream, handshake pending
    AddClient(TcpStream),
    /// Text frame for one session
    Send { session: SessionId, text: String },
    /// Drop a session
    Close(SessionId),
    Shutdown,
}
