//! Compiler Actor - the single coordinating loop
//!
//! Owns the project, the module graph, the compile scheduler and the reload
//! hub. Every status transition happens here; compiler processes run in
//! spawned tasks and report back over the actor's own channel.
//!
//! ```text
//! SourcesChanged ─▶ graph.affected ─▶ mark_dirty ─▶ Scheduler ─▶ spawn_compile
//!                                                                    │
//!     WsMsg::Send ◀── ReloadHub ◀── on_compiled ◀── Compiled ◀───────┘
//! ```

mod client;
mod dispatch;
mod handlers;
mod tasks;

#[cfg(all(test, unix))]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{mpsc, watch};

use super::messages::{CompilerMsg, WsMsg};
use crate::cache::PersistedState;
use crate::compiler::Scheduler;
use crate::config::WatchConfig;
use crate::core::{ElmJsonPath, OutputPath, RunMode};
use crate::deps::ModuleGraph;
use crate::logger::ProgressLine;
use crate::project::Project;
use crate::reload::ReloadHub;

/// Process-level settings shared with compile tasks.
#[derive(Debug, Clone)]
pub struct CompilerSettings {
    /// Resolved compiler executable
    pub compiler: PathBuf,
    pub postprocess: Option<Vec<String>>,
    pub run_mode: RunMode,
    /// Directory of `elm-watch.json`
    pub root: PathBuf,
}

/// How a `make` run ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub compiled: usize,
    /// `(target name, error text)` in configuration order
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct CompilerActor {
    pub(super) rx: mpsc::Receiver<CompilerMsg>,
    /// Handed to compile tasks
    pub(super) tx: mpsc::Sender<CompilerMsg>,
    /// `None` in make mode
    pub(super) ws_tx: Option<mpsc::Sender<WsMsg>>,
    pub(super) project: Project,
    pub(super) graph: ModuleGraph,
    pub(super) scheduler: Scheduler,
    pub(super) hub: ReloadHub,
    pub(super) persisted: PersistedState,
    /// Kill switch of each running compile
    pub(super) kills: FxHashMap<OutputPath, watch::Sender<bool>>,
    /// Groups with an installation in flight
    pub(super) installing: FxHashSet<ElmJsonPath>,
    pub(super) settings: Arc<CompilerSettings>,
    pub(super) progress: Option<ProgressLine>,
}

impl CompilerActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: mpsc::Receiver<CompilerMsg>,
        tx: mpsc::Sender<CompilerMsg>,
        ws_tx: Option<mpsc::Sender<WsMsg>>,
        project: Project,
        persisted: PersistedState,
        config: &WatchConfig,
        settings: CompilerSettings,
    ) -> Self {
        Self {
            rx,
            tx,
            ws_tx,
            project,
            graph: ModuleGraph::new(),
            scheduler: Scheduler::new(config.max_parallel),
            hub: ReloadHub::new(config.coalesce, config.ack_timeout),
            persisted,
            kills: FxHashMap::default(),
            installing: FxHashSet::default(),
            settings: Arc::new(settings),
            progress: None,
        }
    }

    pub(super) fn is_make(&self) -> bool {
        self.settings.run_mode == RunMode::Make
    }
}

/// Sleep until `deadline`, forever when there is none.
pub(super) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

