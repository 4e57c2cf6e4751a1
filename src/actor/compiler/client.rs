use std::time::Instant;

use super::CompilerActor;
use crate::core::{CompilationMode, CompileKind, OutputPath, SessionId, Status};
use crate::reload::message::HelloTarget;
use crate::reload::{Baseline, ClientMessage, ServerMessage, Subscription};

impl CompilerActor {
    pub(super) fn on_client(&mut self, session: SessionId, message: ClientMessage) {
        match message {
            ClientMessage::Hello { targets } => self.on_hello(session, targets),
            ClientMessage::PatchApplied { target } => self.hub.patch_applied(session, &target),
            ClientMessage::EvalErrorOccurred { target, error } => {
                self.hub.eval_error(session, &target, &error, Instant::now());
            }
            ClientMessage::ChangeCompilationMode { target, mode } => self.on_change_mode(&target, mode),
        }
    }

    /// A page announced the targets it runs.
    ///
    /// The first connection to a target turns its typechecks into full
    /// compiles; a page running stale code is brought up to date right away.
    fn on_hello(&mut self, session: SessionId, targets: Vec<HelloTarget>) {
        // A repeated Hello replaces the previous subscriptions
        self.detach_session(session);

        let mut subscriptions = Vec::new();
        for hello in targets {
            let Some(key) = self.project.key_for_name(&hello.name).cloned() else {
                crate::log!("hot"; "{session}: unknown target {:?}", hello.name);
                continue;
            };
            let Some(target) = self.project.get_mut(&key) else {
                continue;
            };
            if target.disabled {
                crate::log!("hot"; "{}: enabled by a connected page", target.name);
                target.disabled = false;
                if target.input_error.is_none() {
                    target.state.status = Status::Idle;
                }
            }
            target.state.connections.insert(session);

            let baseline = match hello.artifact {
                None => Baseline::Unknown,
                Some(hash) => match (&target.state.latest, &target.state.persisted) {
                    (Some(latest), _) if latest.fingerprint.hash == hash => {
                        Baseline::Full(latest.fingerprint.clone())
                    }
                    (_, Some(persisted)) if persisted.hash == hash => Baseline::Persisted(persisted.clone()),
                    _ => Baseline::Artifact(hash),
                },
            };
            subscriptions.push(Subscription::new(key, hello.name, baseline));
        }

        crate::debug!("hot"; "{session}: running {} targets", subscriptions.len());
        let keys: Vec<OutputPath> = subscriptions.iter().map(|s| s.target.clone()).collect();
        self.hub.connect(session, subscriptions);

        for key in &keys {
            self.catch_up(session, key);
        }
    }

    /// Bring one target of a fresh connection up to date.
    fn catch_up(&mut self, session: SessionId, key: &OutputPath) {
        let now = Instant::now();
        let Some(target) = self.project.get_mut(key) else {
            return;
        };
        let name = target.name.clone();
        let status = target.state.status.clone();
        self.hub.send(
            session,
            ServerMessage::StatusChanged {
                target: name.clone(),
                status: status.clone(),
            },
            now,
        );

        let Some(target) = self.project.get_mut(key) else {
            return;
        };
        match &status {
            Status::Compiling(CompileKind::TypecheckOnly) => target.state.promote = true,
            Status::Success(CompileKind::TypecheckOnly) | Status::Idle => self.touch(key),
            Status::Success(CompileKind::FullCompile) => {
                let mode = target.mode;
                if let Some(latest) = target.state.latest.clone()
                    && self
                        .hub
                        .deliver(key, &latest.fingerprint, &latest.code, now)
                        .contains(&session)
                {
                    let message = ServerMessage::SuccessfullyCompiled {
                        target: name,
                        artifact: latest.fingerprint.hash.clone(),
                        mode,
                    };
                    self.hub.send(session, message, now);
                }
            }
            Status::CompileError(error) => {
                self.hub.send(
                    session,
                    ServerMessage::CompileErrorOccurred {
                        target: name,
                        error: error.clone(),
                    },
                    now,
                );
            }
            _ => {}
        }
    }

    fn on_change_mode(&mut self, name: &str, mode: CompilationMode) {
        let Some(key) = self.project.key_for_name(name).cloned() else {
            crate::log!("hot"; "mode change for unknown target {:?}", name);
            return;
        };
        let Some(target) = self.project.get_mut(&key) else {
            return;
        };
        if target.mode == mode {
            return;
        }
        target.mode = mode;
        crate::log!("hot"; "{}: switching to {} mode", name, mode.label());

        self.persisted.set_mode(name, mode);
        self.save_state();
        self.touch(&key);
    }

    pub(super) fn on_disconnected(&mut self, session: SessionId) {
        if self.hub.is_connected(session) {
            crate::debug!("hot"; "{session} disconnected");
        }
        self.hub.disconnect(session);
        self.detach_session(session);
    }

    /// Remove a session from every target's connection set.
    pub(super) fn detach_session(&mut self, session: SessionId) {
        for key in self.project.keys().to_vec() {
            if let Some(target) = self.project.get_mut(&key) {
                target.state.connections.remove(&session);
            }
        }
    }
}
