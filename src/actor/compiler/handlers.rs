use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashSet;
use tokio::sync::watch;

use super::CompilerActor;
use super::tasks::{self, CompileJob};
use crate::actor::messages::{CompileOutcome, CompileReport};
use crate::cache::persist_state;
use crate::core::{CompileKind, ElmJsonPath, OutputPath, Status};
use crate::project::{Artifact, DirtyAction, GroupState, Target};
use crate::reload::{Fingerprint, ServerMessage};

impl CompilerActor {
    /// Walk every target's imports and queue the first compile.
    pub(super) fn start(&mut self) {
        self.persisted.retain_targets(self.project.names());
        self.graph.rebuild_all(&self.project.walk_jobs());

        for group in self.project.groups() {
            if let Some(error) = group.error() {
                crate::log!("error"; "{}: {}", group.elm_json, error);
            }
        }

        let keys = self.project.keys().to_vec();
        for key in &keys {
            let Some(target) = self.project.get(key) else {
                continue;
            };
            if let Some(error) = target.input_error.clone()
                && !target.disabled
            {
                let name = target.name.clone();
                self.failed(&name, &error);
                continue;
            }
            self.touch(key);
        }
    }

    /// Record a change to one target: bump its generation and queue it,
    /// interrupt its running process, or hold it until its group is ready.
    pub(super) fn touch(&mut self, key: &OutputPath) {
        let compilable = self.project.is_compilable(key);
        let blocked = self.blocked_status(key);
        let Some(target) = self.project.get_mut(key) else {
            return;
        };
        if !target.is_enabled() {
            return;
        }

        match target.state.mark_dirty(compilable) {
            DirtyAction::Enqueue => {
                target.state.queued_at.get_or_insert_with(Instant::now);
                self.scheduler.enqueue(key.clone());
            }
            DirtyAction::Interrupt => {
                crate::debug!("compile"; "{}: interrupting generation {}", target.name, target.state.generation - 1);
                if let Some(kill) = self.kills.get(key) {
                    let _ = kill.send(true);
                }
            }
            DirtyAction::Hold => {
                if let Some(status) = blocked {
                    let counts_as_failure = matches!(status, Status::DependenciesError(_))
                        && target.state.status != status;
                    target.state.status = status;
                    if counts_as_failure && let Some(progress) = &self.progress {
                        progress.inc("failed");
                    }
                }
            }
        }
        self.notify_status(key);
    }

    /// Queue a dirty target again after its previous process exited.
    fn requeue(&mut self, key: &OutputPath) {
        let compilable = self.project.is_compilable(key);
        let blocked = self.blocked_status(key);
        let Some(target) = self.project.get_mut(key) else {
            return;
        };
        if compilable {
            target.state.status = Status::NeedsCompile;
            target.state.dirty = true;
            target.state.queued_at.get_or_insert_with(Instant::now);
            self.scheduler.enqueue(key.clone());
        } else if let Some(status) = blocked {
            target.state.status = status;
        }
        self.notify_status(key);
    }

    /// Status of a target whose group keeps it from compiling.
    fn blocked_status(&self, key: &OutputPath) -> Option<Status> {
        let group = self.project.group_of(key)?;
        Some(match &group.state {
            GroupState::Error(error) => Status::DependenciesError(error.clone()),
            GroupState::Ready | GroupState::Installing => Status::DependenciesInstalling,
        })
    }

    // =========================================================================
    // File changes
    // =========================================================================

    pub(super) fn on_sources_changed(&mut self, paths: Vec<PathBuf>) {
        let mut affected = FxHashSet::default();
        for path in &paths {
            let dirs = self.project.source_dirs_containing(path);
            affected.extend(self.graph.affected(path, &dirs));
            for key in self.project.targets_with_input(path) {
                if self.project.revalidate(&key) {
                    crate::log!("watch"; "{}: inputs found", key);
                }
                affected.insert(key);
            }
        }

        if affected.is_empty() {
            crate::debug!("watch"; "{} changed files, no target affected", paths.len());
            return;
        }
        self.recompile(affected);
    }

    pub(super) fn on_elm_json_changed(&mut self, paths: Vec<PathBuf>) {
        let mut affected = FxHashSet::default();
        for path in &paths {
            let Some(key) = self.project.group_key_for(path) else {
                continue;
            };
            let Some(group) = self.project.group_mut(&key) else {
                continue;
            };
            group.reload_manifest();
            match group.error() {
                Some(error) => crate::log!("error"; "{}: {}", key, error),
                None => crate::log!("watch"; "{} changed, dependencies will be installed", key),
            }
            affected.extend(group.members.iter().cloned());
        }

        // A target without a usable elm.json may have one now
        let faulty: Vec<OutputPath> = self
            .project
            .targets()
            .filter(|t| t.input_error.is_some())
            .map(|t| t.output.clone())
            .collect();
        for key in faulty {
            if self.project.revalidate(&key) {
                affected.insert(key);
            }
        }

        self.recompile(affected);
    }

    /// Re-walk and touch targets, in configuration order.
    fn recompile(&mut self, affected: FxHashSet<OutputPath>) {
        let keys: Vec<OutputPath> = self
            .project
            .keys()
            .iter()
            .filter(|key| affected.contains(*key))
            .cloned()
            .collect();
        for key in &keys {
            if let Some(job) = self.project.walk_job(key) {
                self.graph.rebuild(&job);
            }
            self.touch(key);
        }
    }

    // =========================================================================
    // Dependency installation
    // =========================================================================

    /// Start the next pending installation. One at a time: every group
    /// shares the compiler's package cache.
    pub(super) fn start_installs(&mut self) {
        if !self.installing.is_empty() {
            return;
        }
        let project = &self.project;
        let next = project
            .groups()
            .find(|g| {
                g.needs_install
                    && g.state == GroupState::Ready
                    && g.members.iter().any(|m| project.get(m).is_some_and(Target::is_enabled))
            })
            .map(|g| g.elm_json.clone());
        let Some(key) = next else {
            return;
        };
        let Some(group) = self.project.group_mut(&key) else {
            return;
        };
        group.needs_install = false;
        group.state = GroupState::Installing;
        let members = group.members.clone();

        crate::debug!("compile"; "installing dependencies for {}", key);
        self.installing.insert(key.clone());
        tasks::spawn_install(key, Arc::clone(&self.settings), self.tx.clone());

        for member in &members {
            if let Some(target) = self.project.get_mut(member)
                && target.is_enabled()
                && !target.state.status.is_busy()
            {
                target.state.status = Status::DependenciesInstalling;
                self.notify_status(member);
            }
        }
    }

    pub(super) fn on_installed(&mut self, key: ElmJsonPath, result: Result<(), String>) {
        self.installing.remove(&key);
        let Some(group) = self.project.group_mut(&key) else {
            return;
        };
        if group.state != GroupState::Installing {
            crate::debug!("compile"; "{} changed during installation, discarding result", key);
            return;
        }
        let members = group.members.clone();

        match result {
            Ok(()) => {
                group.state = GroupState::Ready;
                crate::debug!("compile"; "dependencies ready for {}", key);
                for member in &members {
                    self.touch(member);
                }
            }
            Err(error) => {
                group.state = GroupState::Error(error.clone());
                let mut names = Vec::new();
                for member in &members {
                    let Some(target) = self.project.get_mut(member) else {
                        continue;
                    };
                    if !target.is_enabled() {
                        continue;
                    }
                    target.state.status = Status::DependenciesError(error.clone());
                    names.push(target.name.clone());
                    self.notify_status(member);
                }
                if let Some(progress) = &self.progress {
                    names.iter().for_each(|_| progress.inc("failed"));
                } else if !names.is_empty() {
                    crate::logger::status_error(&format!("{key}: installing dependencies failed"), &error);
                    crate::logger::status_detach();
                }
            }
        }
    }

    // =========================================================================
    // Compiles
    // =========================================================================

    /// Hand a dequeued target to a compile task. The scheduler slot is
    /// already claimed.
    pub(super) fn start_compile(&mut self, key: OutputPath) {
        let run_mode = self.settings.run_mode;
        let cwd = self.project.group_of(&key).map(|g| g.elm_json.dir().to_path_buf());
        let (Some(cwd), Some(target)) = (cwd, self.project.get_mut(&key)) else {
            self.scheduler.finish();
            return;
        };

        let kind = target.state.compile_kind(run_mode);
        let generation = target.state.begin(kind, Instant::now());
        crate::debug!("compile"; "{}: {} (generation {})", target.name, target.state.status.label(), generation);

        let job = CompileJob {
            key: key.clone(),
            generation,
            kind,
            name: target.name.clone(),
            inputs: target.inputs.clone(),
            temp_output: target.temp_output.clone(),
            mode: target.mode,
            cwd,
        };
        let (kill_tx, kill_rx) = watch::channel(false);
        self.kills.insert(key.clone(), kill_tx);
        tasks::spawn_compile(job, Arc::clone(&self.settings), self.tx.clone(), kill_rx);
        self.notify_status(&key);
    }

    pub(super) fn on_postprocessing(&mut self, key: &OutputPath, generation: u64) {
        let Some(target) = self.project.get_mut(key) else {
            return;
        };
        if target.state.generation != generation || target.state.running.is_none() {
            return;
        }
        target.state.status = Status::Postprocessing;
        self.notify_status(key);
    }

    pub(super) fn on_compiled(&mut self, report: CompileReport) {
        self.scheduler.finish();
        self.kills.remove(&report.key);
        let key = report.key;

        let Some(target) = self.project.get_mut(&key) else {
            return;
        };
        if target.state.end(report.generation).is_none() {
            crate::debug!("compile"; "{}: discarding result of generation {}", target.name, report.generation);
            if target.state.dirty {
                self.requeue(&key);
            }
            return;
        }
        target.state.timings.compile = Some(report.compile);
        target.state.timings.postprocess = report.postprocess;

        match report.outcome {
            CompileOutcome::Typechecked => self.on_typechecked(&key),
            CompileOutcome::Compiled { code, fingerprint } => self.on_full_compile(&key, code, fingerprint),
            CompileOutcome::CompileError(error) => self.on_compile_error(&key, error),
            CompileOutcome::Interrupted => self.requeue(&key),
        }
    }

    fn on_typechecked(&mut self, key: &OutputPath) {
        let Some(target) = self.project.get_mut(key) else {
            return;
        };
        target.state.status = Status::Success(CompileKind::TypecheckOnly);
        let follow_up = target.state.promote || !target.state.connections.is_empty();
        let line = format!("{}: typecheck ok ({})", target.name, target.state.timings.summary());
        self.notify_status(key);

        if follow_up {
            crate::debug!("compile"; "{}", line);
            self.touch(key);
        } else {
            self.succeeded(&line);
        }
    }

    fn on_full_compile(&mut self, key: &OutputPath, code: Arc<str>, fingerprint: Fingerprint) {
        let Some(target) = self.project.get(key) else {
            return;
        };
        let name = target.name.clone();
        let mode = target.mode;
        if let Err(e) = promote_output(&target.temp_output, key.as_path()) {
            self.on_compile_error(key, format!("could not write {key}: {e}"));
            return;
        }

        let persisted = fingerprint.to_persisted();
        self.persisted.set_fingerprint(&name, persisted.clone());
        self.save_state();

        let Some(target) = self.project.get_mut(key) else {
            return;
        };
        target.state.status = Status::Success(CompileKind::FullCompile);
        target.state.persisted = Some(persisted);
        target.state.latest = Some(Artifact {
            fingerprint: fingerprint.clone(),
            code: Arc::clone(&code),
        });
        let line = format!("{name}: compiled ({})", target.state.timings.summary());

        // Pages already running this artifact only see the status change
        let now = Instant::now();
        let message = ServerMessage::SuccessfullyCompiled {
            target: name,
            artifact: fingerprint.hash.clone(),
            mode,
        };
        for session in self.hub.deliver(key, &fingerprint, &code, now) {
            self.hub.send(session, message.clone(), now);
        }
        self.notify_status(key);
        self.succeeded(&line);
    }

    fn on_compile_error(&mut self, key: &OutputPath, error: String) {
        let Some(target) = self.project.get_mut(key) else {
            return;
        };
        target.state.status = Status::CompileError(error.clone());
        let name = target.name.clone();

        self.hub.notify(
            key,
            ServerMessage::CompileErrorOccurred {
                target: name.clone(),
                error: error.clone(),
            },
            Instant::now(),
        );
        self.notify_status(key);
        self.failed(&name, &error);
    }

    // =========================================================================
    // Reporting
    // =========================================================================

    pub(super) fn notify_status(&mut self, key: &OutputPath) {
        let Some(target) = self.project.get(key) else {
            return;
        };
        let message = ServerMessage::StatusChanged {
            target: target.name.clone(),
            status: target.state.status.clone(),
        };
        self.hub.notify(key, message, Instant::now());
    }

    fn succeeded(&self, line: &str) {
        match &self.progress {
            Some(progress) => progress.inc("compiled"),
            None => crate::logger::status_success(line),
        }
    }

    pub(super) fn failed(&self, name: &str, detail: &str) {
        match &self.progress {
            Some(progress) => progress.inc("failed"),
            None => {
                crate::logger::status_error(&format!("{name}: error"), detail);
                crate::logger::status_detach();
            }
        }
    }

    pub(super) fn save_state(&self) {
        if let Err(e) = persist_state(&self.persisted, self.project.root()) {
            crate::debug!("cache"; "could not save state: {}", e);
        }
    }
}

/// Move the compiled temp file over the real output.
fn promote_output(temp: &Path, output: &Path) -> std::io::Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::rename(temp, output).is_err() {
        // Across filesystems
        std::fs::copy(temp, output)?;
        let _ = std::fs::remove_file(temp);
    }
    Ok(())
}
