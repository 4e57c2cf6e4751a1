use std::time::Instant;

use super::{CompilerActor, RunSummary, sleep_until};
use crate::actor::messages::{CompilerMsg, WsMsg};
use crate::logger::ProgressLine;

impl CompilerActor {
    /// Main event loop.
    ///
    /// Hot mode runs until `Shutdown`; make mode returns once every target
    /// has settled.
    pub async fn run(mut self) -> RunSummary {
        if self.is_make() {
            let total = self.project.targets().filter(|t| !t.disabled).count();
            self.progress = Some(ProgressLine::new("make", &[("compiled", total), ("failed", total)]));
        }
        self.start();
        self.pump();

        loop {
            if self.is_make() && self.is_settled() {
                break;
            }

            let deadline = self.hub.next_deadline();
            tokio::select! {
                biased;

                msg = self.rx.recv() => match msg {
                    None | Some(CompilerMsg::Shutdown) => {
                        self.shutdown().await;
                        break;
                    }
                    Some(msg) => self.dispatch(msg),
                },

                () = sleep_until(deadline) => self.expire_connections().await,
            }

            self.pump();
            self.send_due().await;
        }

        if let Some(progress) = self.progress.take() {
            progress.finish();
        }
        self.summary()
    }

    /// Route one message to its handler.
    pub(super) fn dispatch(&mut self, msg: CompilerMsg) {
        match msg {
            CompilerMsg::SourcesChanged(paths) => self.on_sources_changed(paths),
            CompilerMsg::ElmJsonChanged(paths) => self.on_elm_json_changed(paths),
            CompilerMsg::ConfigChanged => {
                crate::log!("watch"; "elm-watch.json changed, restart to apply");
            }
            CompilerMsg::Client { session, message } => self.on_client(session, message),
            CompilerMsg::Disconnected(session) => self.on_disconnected(session),
            CompilerMsg::Postprocessing { key, generation } => self.on_postprocessing(&key, generation),
            CompilerMsg::Compiled(report) => self.on_compiled(*report),
            CompilerMsg::Installed { group, result } => self.on_installed(group, result),
            CompilerMsg::Shutdown => {}
        }
    }

    /// Start installations and compiles while slots are free.
    pub(super) fn pump(&mut self) {
        self.start_installs();

        while self.scheduler.has_capacity() {
            let project = &self.project;
            let next = self.scheduler.next(|key| {
                project.is_compilable(key) && project.get(key).is_some_and(|t| t.state.is_ready())
            });
            let Some(key) = next else {
                break;
            };
            self.start_compile(key);
        }
    }

    /// Nothing queued, running or installing.
    pub(super) fn is_settled(&self) -> bool {
        self.scheduler.is_idle() && self.installing.is_empty()
    }

    /// Hand due frames to the websocket actor.
    pub(super) async fn send_due(&mut self) {
        let frames = self.hub.take_due(Instant::now());
        self.send_frames(frames).await;
    }

    async fn send_frames(&mut self, frames: Vec<(crate::core::SessionId, String)>) {
        let Some(ws_tx) = &self.ws_tx else {
            return;
        };
        for (session, text) in frames {
            if ws_tx.send(WsMsg::Send { session, text }).await.is_err() {
                return;
            }
        }
    }

    /// Drop connections that missed their patch acknowledgement.
    async fn expire_connections(&mut self) {
        let gone = self.hub.expired(Instant::now());
        for session in gone {
            self.detach_session(session);
            if let Some(ws_tx) = &self.ws_tx {
                let _ = ws_tx.send(WsMsg::Close(session)).await;
            }
        }
    }

    /// Kill running compiles, flush pending frames, save state.
    async fn shutdown(&mut self) {
        crate::debug!("compile"; "shutting down");
        for kill in self.kills.values() {
            let _ = kill.send(true);
        }
        let frames = self.hub.flush(Instant::now());
        self.send_frames(frames).await;
        self.save_state();
    }

    fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for target in self.project.targets().filter(|t| !t.disabled) {
            match target.state.status.error() {
                Some(error) => summary.failed.push((target.name.clone(), error.to_string())),
                None => summary.compiled += 1,
            }
        }
        summary
    }
}
