//! External process execution.
//!
//! Builder API over `tokio::process` with stdin piping and a kill switch.
//!
//! ```ignore
//! let (kill_tx, kill_rx) = watch::channel(false);
//! let outcome = Cmd::new("elm")
//!     .args(["make", "--report=json", "src/Main.elm"])
//!     .cwd(root)
//!     .run(Some(kill_rx))
//!     .await?;
//! ```

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long pipes are read after a kill.
const DRAIN_AFTER_KILL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` failed while running: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// How a process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Killed through the kill switch
    pub interrupted: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.interrupted && self.code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Command builder for external process execution.
#[derive(Debug, Default, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(String, String)>,
    stdin_data: Option<Vec<u8>>,
}

impl Cmd {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            ..Default::default()
        }
    }

    /// Create from a command array (e.g., `["node", "postprocess.js"]`).
    pub fn from_slice<S: AsRef<OsStr>>(cmd: &[S]) -> Self {
        let mut iter = cmd.iter();
        let program = iter
            .next()
            .map(|s| s.as_ref().to_owned())
            .unwrap_or_default();
        Self {
            program,
            args: iter.map(|s| s.as_ref().to_owned()).collect(),
            ..Default::default()
        }
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    pub fn cwd<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cwd = Some(dir.as_ref().to_owned());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Data piped to the process's stdin.
    pub fn stdin<D: Into<Vec<u8>>>(mut self, data: D) -> Self {
        self.stdin_data = Some(data.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Full argv, for logging.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion. Setting `kill` to `true` hard-kills the process
    /// and waits for it to exit; the outcome is then marked interrupted.
    pub async fn run(self, kill: Option<watch::Receiver<bool>>) -> Result<ProcessOutcome, ProcessError> {
        let program = self.program_name();
        let io_err = |source| ProcessError::Io {
            program: program.clone(),
            source,
        };

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().cloned())
            .stdin(if self.stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        // Own group, so wrapper scripts are killed along with what they start
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Feed stdin concurrently so a chatty child cannot deadlock on a
        // full stdout pipe
        let writer = match (child.stdin.take(), self.stdin_data) {
            (Some(mut stdin), Some(data)) => Some(tokio::spawn(async move {
                let result = stdin.write_all(&data).await;
                drop(stdin);
                result
            })),
            _ => None,
        };
        let stdout = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                out.read_to_end(&mut buf).await.map(|_| buf)
            })
        });
        let stderr = child.stderr.take().map(|mut err| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                err.read_to_end(&mut buf).await.map(|_| buf)
            })
        });

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            () = killed(kill) => None,
        };
        let interrupted = exited.is_none();
        let status = match exited {
            Some(status) => status.map_err(io_err)?,
            None => {
                kill_tree(&mut child);
                child.wait().await.map_err(io_err)?
            }
        };

        if let Some(writer) = writer
            && let Ok(Err(e)) = writer.await
            && e.kind() != std::io::ErrorKind::BrokenPipe
            && !interrupted
        {
            return Err(io_err(e));
        }

        // A killed process may have left a descendant holding the pipes
        let drain = if interrupted { Some(DRAIN_AFTER_KILL) } else { None };
        Ok(ProcessOutcome {
            code: status.code(),
            stdout: collect(stdout, drain).await,
            stderr: collect(stderr, drain).await,
            interrupted,
        })
    }
}

/// Resolves once the kill switch is set; never when there is none or its
/// sender was dropped.
async fn killed(kill: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = kill else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Hard-kill the child and, on unix, every process in its group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
        // SAFETY: plain syscall; the group was created for this child at spawn
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    // Already exited is fine
    let _ = child.start_kill();
}

async fn collect(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>, limit: Option<Duration>) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    let result = match limit {
        None => (&mut handle).await,
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(result) => result,
            Err(_) => {
                handle.abort();
                return Vec::new();
            }
        },
    };
    result.ok().and_then(Result::ok).unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[tokio::test]
    async fn test_captures_output_and_code() {
        let outcome = Cmd::new("sh")
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .run(None)
            .await
            .unwrap();
        assert_eq!(outcome.code, Some(3));
        assert_eq!(outcome.stdout_lossy(), "out\n");
        assert_eq!(outcome.stderr_lossy(), "err\n");
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn test_stdin_piped() {
        let outcome = Cmd::new("sh")
            .args(["-c", "tr a-z A-Z"])
            .stdin("hello")
            .run(None)
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout_lossy(), "HELLO");
    }

    #[tokio::test]
    async fn test_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = Cmd::new("sh")
            .args(["-c", "echo $GREETING; pwd"])
            .env("GREETING", "hi")
            .cwd(dir.path())
            .run(None)
            .await
            .unwrap();
        let stdout = outcome.stdout_lossy();
        assert!(stdout.starts_with("hi\n"));
        let name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(stdout.trim_end().ends_with(&name));
    }

    #[tokio::test]
    async fn test_kill_interrupts() {
        let (tx, rx) = watch::channel(false);
        let start = Instant::now();
        let handle = tokio::spawn(Cmd::new("sh").args(["-c", "sleep 30"]).run(Some(rx)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.interrupted);
        assert!(!outcome.success());
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_kill_reaches_wrapper_children() {
        // No `exec`: the sleep is a grandchild holding stdout
        let (tx, rx) = watch::channel(false);
        let start = Instant::now();
        let handle = tokio::spawn(Cmd::new("sh").args(["-c", "sleep 8; echo done"]).run(Some(rx)));
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.interrupted);
        assert!(!outcome.stdout_lossy().contains("done"));
        assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
    }

    #[tokio::test]
    async fn test_dropped_kill_switch_does_not_kill() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let outcome = Cmd::new("sh").args(["-c", "exit 0"]).run(Some(rx)).await.unwrap();
        assert!(outcome.success());
    }

    #[tokio::test]
    async fn test_already_killed_never_runs_long() {
        let (_tx, rx) = watch::channel(true);
        let outcome = Cmd::new("sh").args(["-c", "sleep 30"]).run(Some(rx)).await.unwrap();
        assert!(outcome.interrupted);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = Cmd::new("definitely-not-a-real-program-xyz")
            .run(None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn test_from_slice_display() {
        let cmd = Cmd::from_slice(&["node", "post.js"]).arg("main");
        assert_eq!(cmd.display(), "node post.js main");
        assert_eq!(cmd.program_name(), "node");
    }
}
