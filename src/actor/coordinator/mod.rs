//! Actor Coordinator - wires up the actor system
//!
//! - `run_hot`: FsActor, CompilerActor and WsActor on shared channels,
//!   until Ctrl+C
//! - `run_make`: the CompilerActor alone, until every target has settled

mod runtime;
mod watch_paths;

use anyhow::{Context, Result};
use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use super::compiler::{CompilerActor, CompilerSettings, RunSummary};
use super::fs::FsActor;
use super::messages::{CompilerMsg, WsMsg};
use super::ws::WsActor;
use crate::cache::PersistedState;
use crate::config::WatchConfig;
use crate::project::Project;

const CHANNEL_BUFFER: usize = 32;

pub struct Coordinator {
    config: WatchConfig,
    project: Project,
    persisted: PersistedState,
    settings: CompilerSettings,
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    pub fn new(config: WatchConfig, project: Project, persisted: PersistedState, settings: CompilerSettings) -> Self {
        Self {
            config,
            project,
            persisted,
            settings,
            shutdown_rx: None,
        }
    }

    /// Set shutdown signal receiver.
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Compile once. No watcher, no websocket.
    pub async fn run_make(self) -> RunSummary {
        let (compiler_tx, compiler_rx) = mpsc::channel::<CompilerMsg>(CHANNEL_BUFFER);
        let compiler = CompilerActor::new(
            compiler_rx,
            compiler_tx,
            None,
            self.project,
            self.persisted,
            &self.config,
            self.settings,
        );
        compiler.run().await
    }

    /// Watch and hot reload until shutdown.
    pub async fn run_hot(mut self) -> Result<()> {
        let (compiler_tx, compiler_rx) = mpsc::channel::<CompilerMsg>(CHANNEL_BUFFER);
        let (ws_tx, ws_rx) = mpsc::channel::<WsMsg>(CHANNEL_BUFFER);

        let port = crate::reload::server::start_ws_server(self.config.port, ws_tx.clone())
            .context("could not start the hot reload server")?;
        crate::log!("hot"; "websocket listening on ws://127.0.0.1:{}", port);
        for target in &self.config.targets {
            crate::debug!("hot"; "{} -> {}", target.name, self.config.display_path(&target.output));
        }

        // Watcher first: edits during the initial compile are buffered
        let roots = watch_paths::collect_watch_roots(&self.project, &self.config);
        let fs_actor = FsActor::new(roots, self.config.config_path.clone(), compiler_tx.clone())
            .context("file watcher failed to start")?;

        let ws_actor = WsActor::new(ws_rx, compiler_tx.clone());
        let shutdown_rx = self.shutdown_rx.take();
        let compiler_actor = CompilerActor::new(
            compiler_rx,
            compiler_tx.clone(),
            Some(ws_tx.clone()),
            self.project,
            self.persisted,
            &self.config,
            self.settings,
        );

        crate::debug!("actor"; "start");
        runtime::run_actors(fs_actor, compiler_actor, ws_actor, compiler_tx, ws_tx, shutdown_rx).await;
        crate::debug!("actor"; "stopped");
        Ok(())
    }
}
