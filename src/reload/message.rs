//! Hot reload message protocol.
//!
//! JSON text frames over the websocket, discriminated by `tag`.
//!
//! # Server → client
//!
//! - `StatusChanged`: compile status of a target (for the overlay)
//! - `SuccessfullyCompiled`: the running artifact is current
//! - `CompileErrorOccurred`: rendered compiler output
//! - `HotPatch`: new code to swap in, with a summary of what changed
//! - `FullReload`: restart from scratch, with reasons
//! - `Batch`: several of the above, applied together
//!
//! # Client → server
//!
//! - `Hello`: targets running in this page, with their artifact hashes
//! - `PatchApplied`: acknowledgement of a `HotPatch`
//! - `EvalErrorOccurred`: a patch failed to evaluate
//! - `ChangeCompilationMode`: switch a target to standard/debug/optimize

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{CompilationMode, Status};

/// Piece of a program that changed between two artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Update,
    View,
    Subscriptions,
    /// Code outside the program record (helpers, dependencies)
    Other,
}

/// Message sent to a connected program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tag")]
pub enum ServerMessage {
    StatusChanged {
        target: String,
        status: Status,
    },

    SuccessfullyCompiled {
        target: String,
        artifact: String,
        mode: CompilationMode,
    },

    CompileErrorOccurred {
        target: String,
        error: String,
    },

    HotPatch {
        target: String,
        artifact: String,
        code: Arc<str>,
        changes: Vec<Change>,
    },

    FullReload {
        reasons: Vec<String>,
    },

    Batch {
        messages: Vec<ServerMessage>,
    },
}

impl ServerMessage {
    /// Wrap several messages. `None` when empty, the message itself when
    /// there is only one.
    pub fn batch(mut messages: Vec<ServerMessage>) -> Option<Self> {
        match messages.len() {
            0 => None,
            1 => messages.pop(),
            _ => Some(Self::Batch { messages }),
        }
    }

    pub fn is_patch(&self) -> bool {
        matches!(self, Self::HotPatch { .. })
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"tag":"FullReload","reasons":["internal: unserializable message"]}"#.to_string())
    }
}

/// One target announced in `Hello`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelloTarget {
    pub name: String,
    /// Hash of the artifact the page is running, if it has one
    #[serde(default)]
    pub artifact: Option<String>,
}

/// Message received from a connected program.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "tag")]
pub enum ClientMessage {
    Hello {
        targets: Vec<HelloTarget>,
    },

    PatchApplied {
        target: String,
    },

    EvalErrorOccurred {
        target: String,
        error: String,
    },

    ChangeCompilationMode {
        target: String,
        mode: CompilationMode,
    },
}

impl ClientMessage {
    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}
