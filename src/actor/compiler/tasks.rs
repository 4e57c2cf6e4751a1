use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use super::CompilerSettings;
use crate::actor::messages::{CompileOutcome, CompileReport, CompilerMsg};
use crate::compiler::{ProcessOutcome, command, report};
use crate::core::{CompilationMode, CompileKind, ElmJsonPath, OutputPath};
use crate::reload::Fingerprint;

/// Everything a compile task needs, copied out of the project.
#[derive(Debug, Clone)]
pub(super) struct CompileJob {
    pub(super) key: OutputPath,
    pub(super) generation: u64,
    pub(super) kind: CompileKind,
    pub(super) name: String,
    pub(super) inputs: Vec<PathBuf>,
    pub(super) temp_output: PathBuf,
    pub(super) mode: CompilationMode,
    /// Directory of the target's `elm.json`
    pub(super) cwd: PathBuf,
}

/// Spawn one compile. The report always comes back, also when the task
/// panics.
pub(super) fn spawn_compile(
    job: CompileJob,
    settings: Arc<CompilerSettings>,
    tx: mpsc::Sender<CompilerMsg>,
    kill: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let key = job.key.clone();
        let generation = job.generation;
        let inner = tokio::spawn(compile(job, settings, tx.clone(), kill));

        let report = match inner.await {
            Ok(report) => report,
            Err(e) => CompileReport {
                key,
                generation,
                outcome: CompileOutcome::CompileError(format!("internal error while compiling: {e}")),
                compile: Duration::ZERO,
                postprocess: None,
            },
        };
        let _ = tx.send(CompilerMsg::Compiled(Box::new(report))).await;
    });
}

async fn compile(
    job: CompileJob,
    settings: Arc<CompilerSettings>,
    tx: mpsc::Sender<CompilerMsg>,
    kill: watch::Receiver<bool>,
) -> CompileReport {
    let started = Instant::now();
    let finish = |outcome: CompileOutcome, postprocess: Option<Duration>| CompileReport {
        key: job.key.clone(),
        generation: job.generation,
        outcome,
        compile: started.elapsed(),
        postprocess,
    };

    if job.kind == CompileKind::FullCompile
        && let Some(parent) = job.temp_output.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        return finish(CompileOutcome::CompileError(format!("{}: {e}", parent.display())), None);
    }

    let cmd = command::elm_make(&settings.compiler, &job.cwd, &job.inputs, &job.temp_output, job.mode, job.kind);
    crate::debug!("compile"; "{}", cmd.display());
    match cmd.run(Some(kill.clone())).await {
        Err(e) => return finish(CompileOutcome::CompileError(e.to_string()), None),
        Ok(out) if out.interrupted => return finish(CompileOutcome::Interrupted, None),
        Ok(out) if !out.success() => {
            let rendered = report::render(&out.stderr_lossy(), &settings.root);
            return finish(CompileOutcome::CompileError(rendered), None);
        }
        Ok(_) => {}
    }
    let compile_time = started.elapsed();

    if job.kind == CompileKind::TypecheckOnly {
        return finish(CompileOutcome::Typechecked, None);
    }

    let code = match tokio::fs::read_to_string(&job.temp_output).await {
        Ok(code) => code,
        Err(e) => {
            let error = format!("could not read {}: {e}", job.temp_output.display());
            return finish(CompileOutcome::CompileError(error), None);
        }
    };

    let (code, postprocess) = match &settings.postprocess {
        None => (code, None),
        Some(argv) => {
            let _ = tx
                .send(CompilerMsg::Postprocessing {
                    key: job.key.clone(),
                    generation: job.generation,
                })
                .await;
            let post_started = Instant::now();
            let cmd = command::postprocess(argv, &settings.root, &job.name, job.mode, settings.run_mode, code);
            crate::debug!("compile"; "{}", cmd.display());
            let outcome = cmd.run(Some(kill)).await;
            let elapsed = Some(post_started.elapsed());

            match outcome {
                Err(e) => return finish(CompileOutcome::CompileError(e.to_string()), elapsed),
                Ok(out) if out.interrupted => return finish(CompileOutcome::Interrupted, elapsed),
                Ok(out) if !out.success() => {
                    return finish(CompileOutcome::CompileError(postprocess_error(&out)), elapsed);
                }
                Ok(out) => {
                    let code = out.stdout_lossy();
                    if let Err(e) = tokio::fs::write(&job.temp_output, &code).await {
                        let error = format!("could not write {}: {e}", job.temp_output.display());
                        return finish(CompileOutcome::CompileError(error), elapsed);
                    }
                    (code, elapsed)
                }
            }
        }
    };

    let mode = job.mode;
    let extracted = tokio::task::spawn_blocking(move || {
        let fingerprint = Fingerprint::extract(&code, mode);
        (code, fingerprint)
    })
    .await;

    let mut done = match extracted {
        Ok((code, fingerprint)) => finish(
            CompileOutcome::Compiled {
                code: Arc::from(code),
                fingerprint,
            },
            postprocess,
        ),
        Err(e) => finish(CompileOutcome::CompileError(format!("internal error: {e}")), postprocess),
    };
    done.compile = compile_time;
    done
}

/// Exit status on its own line, then both streams as the command wrote them.
fn postprocess_error(out: &ProcessOutcome) -> String {
    let code = out
        .code
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    let mut error = format!("postprocess exited with {code}\n");
    for (name, stream) in [("stderr", &out.stderr), ("stdout", &out.stdout)] {
        if !stream.is_empty() {
            error.push_str(&format!("\n{name}:\n{}", String::from_utf8_lossy(stream)));
        }
    }
    error
}

/// Install a group's dependencies by compiling a dummy module.
pub(super) fn spawn_install(group: ElmJsonPath, settings: Arc<CompilerSettings>, tx: mpsc::Sender<CompilerMsg>) {
    tokio::spawn(async move {
        let result = match command::install(&settings.compiler, group.dir()) {
            Err(e) => Err(format!("could not write the install module: {e}")),
            Ok(cmd) => match cmd.run(None).await {
                Ok(out) if out.success() => Ok(()),
                Ok(out) => Err(report::render(&out.stderr_lossy(), &settings.root)),
                Err(e) => Err(e.to_string()),
            },
        };
        let _ = tx.send(CompilerMsg::Installed { group, result }).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postprocess_error_keeps_streams_verbatim() {
        let out = ProcessOutcome {
            code: Some(2),
            stdout: b"  partial output\n\n".to_vec(),
            stderr: b"\n  bad input\n".to_vec(),
            interrupted: false,
        };
        assert_eq!(
            postprocess_error(&out),
            "postprocess exited with 2\n\nstderr:\n\n  bad input\n\nstdout:\n  partial output\n\n"
        );
    }

    #[test]
    fn test_postprocess_error_without_output() {
        let out = ProcessOutcome::default();
        assert_eq!(postprocess_error(&out), "postprocess exited with signal\n");
    }
}
