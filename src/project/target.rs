//! One compilation target and the state of its output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::cache::PersistedFingerprint;
use crate::core::{CompilationMode, CompileKind, ElmJsonPath, OutputPath, RunMode, SessionId, Status};
use crate::reload::Fingerprint;

/// Durations of the last compile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    pub queue: Option<Duration>,
    pub compile: Option<Duration>,
    pub postprocess: Option<Duration>,
}

impl Timings {
    /// `queue 3ms, compile 1.20s`
    pub fn summary(&self) -> String {
        [
            ("queue", self.queue),
            ("compile", self.compile),
            ("postprocess", self.postprocess),
        ]
        .into_iter()
        .filter_map(|(label, d)| d.map(|d| format!("{label} {}", format_duration(d))))
        .collect::<Vec<_>>()
        .join(", ")
    }
}

pub fn format_duration(d: Duration) -> String {
    if d.as_millis() < 1000 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

/// Compile in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Running {
    pub generation: u64,
    pub kind: CompileKind,
    pub started: Instant,
}

/// Last successfully delivered full compile.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub fingerprint: Fingerprint,
    pub code: Arc<str>,
}

/// What [`OutputState::mark_dirty`] asks the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyAction {
    /// Queue a compile
    Enqueue,
    /// Kill the running process; queue again once it has exited
    Interrupt,
    /// Not compilable right now
    Hold,
}

#[derive(Debug, Clone)]
pub struct OutputState {
    pub status: Status,
    /// Bumped by every change; results of older generations are stale
    pub generation: u64,
    pub dirty: bool,
    pub connections: FxHashSet<SessionId>,
    pub timings: Timings,
    pub running: Option<Running>,
    /// A connection arrived during a typecheck-only compile
    pub promote: bool,
    pub latest: Option<Artifact>,
    /// Fingerprint left by a previous session
    pub persisted: Option<PersistedFingerprint>,
    pub queued_at: Option<Instant>,
}

impl OutputState {
    pub fn new(status: Status, persisted: Option<PersistedFingerprint>) -> Self {
        Self {
            status,
            generation: 0,
            dirty: false,
            connections: FxHashSet::default(),
            timings: Timings::default(),
            running: None,
            promote: false,
            latest: None,
            persisted,
            queued_at: None,
        }
    }

    /// Record a change. Always bumps the generation.
    pub fn mark_dirty(&mut self, compilable: bool) -> DirtyAction {
        self.generation += 1;
        self.dirty = true;
        if self.running.is_some() {
            self.status = Status::Interrupted;
            return DirtyAction::Interrupt;
        }
        if !compilable {
            return DirtyAction::Hold;
        }
        self.status = Status::NeedsCompile;
        DirtyAction::Enqueue
    }

    /// Dirty, not running: may be handed to a compiler process.
    pub fn is_ready(&self) -> bool {
        self.dirty && self.running.is_none()
    }

    /// Start a compile of the current generation.
    pub fn begin(&mut self, kind: CompileKind, now: Instant) -> u64 {
        self.dirty = false;
        self.promote = false;
        self.timings = Timings {
            queue: self.queued_at.take().map(|t| now.saturating_duration_since(t)),
            ..Timings::default()
        };
        self.running = Some(Running {
            generation: self.generation,
            kind,
            started: now,
        });
        self.status = Status::Compiling(kind);
        self.generation
    }

    /// The running process exited. Returns it when its result is current.
    pub fn end(&mut self, generation: u64) -> Option<Running> {
        let running = self.running.take()?;
        (running.generation == generation && self.generation == generation).then_some(running)
    }

    /// Connections decide between typechecking and a full compile.
    pub fn compile_kind(&self, run_mode: RunMode) -> CompileKind {
        match run_mode {
            RunMode::Make => CompileKind::FullCompile,
            RunMode::Hot if self.connections.is_empty() => CompileKind::TypecheckOnly,
            RunMode::Hot => CompileKind::FullCompile,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub inputs: Vec<PathBuf>,
    pub output: OutputPath,
    /// Compiler writes here; renamed over `output` on success
    pub temp_output: PathBuf,
    pub mode: CompilationMode,
    pub disabled: bool,
    pub group: Option<ElmJsonPath>,
    /// Configuration fault, blocks compilation
    pub input_error: Option<String>,
    pub state: OutputState,
}

impl Target {
    /// Neither disabled nor misconfigured.
    pub fn is_enabled(&self) -> bool {
        !self.disabled && self.input_error.is_none()
    }
}
