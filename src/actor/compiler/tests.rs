//! Actor-level tests against a fake compiler script.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::mpsc;

use super::{CompilerActor, CompilerSettings};
use crate::actor::messages::{CompilerMsg, WsMsg};
use crate::cache::{PersistedState, restore_state};
use crate::config::WatchConfig;
use crate::core::{CompilationMode, CompileKind, RunMode, SessionId, Status};
use crate::project::Project;
use crate::reload::ClientMessage;
use crate::reload::fingerprint::tests::Sample;
use crate::reload::message::HelloTarget;
use crate::utils::path::normalize_path;

const TIMEOUT: Duration = Duration::from_secs(20);

/// Stands in for `elm make`: copies `artifact.js` to `--output`, fails with
/// the content of `fail`. Waits while `hold` exists; with `slow` it runs a
/// 30s child that only a kill of the whole process group stops early.
/// Dependency installs succeed unless `install-fail` exists.
const FAKE_COMPILER: &str = r#"#!/bin/sh
dir=$(dirname "$0")
case "$*" in
  *ElmWatchDummy*)
    if [ -f "$dir/install-fail" ]; then
      echo "could not reach package.elm-lang.org" >&2
      exit 1
    fi
    exit 0
    ;;
esac
out=""
for arg in "$@"; do
  case "$arg" in
    --output=*) out="${arg#--output=}" ;;
  esac
done
while [ -f "$dir/hold" ]; do
  sleep 0.05
done
if [ -f "$dir/slow" ]; then
  sleep 30
  exit 1
fi
if [ -f "$dir/fail" ]; then
  cat "$dir/fail" >&2
  exit 1
fi
if [ "$out" != "/dev/null" ]; then
  cat "$dir/artifact.js" > "$out"
fi
"#;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    postprocess: Option<Vec<String>>,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(
            root.join("elm.json"),
            r#"{"type":"application","source-directories":["src"]}"#,
        )
        .unwrap();
        fs::write(
            root.join("src/Main.elm"),
            "module Main exposing (main)\nimport Html\nimport Page\nmain = Html.text \"hi\"\n",
        )
        .unwrap();
        fs::write(root.join("src/Page.elm"), "module Page exposing (x)\nx = 1\n").unwrap();
        fs::write(
            root.join("elm-watch.json"),
            r#"{"targets":{"main":{"inputs":["src/Main.elm"],"output":"build/main.js"}},"coalesceMs":0}"#,
        )
        .unwrap();

        let compiler = root.join("bin/fake-elm");
        fs::write(&compiler, FAKE_COMPILER).unwrap();
        fs::set_permissions(&compiler, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(root.join("bin/artifact.js"), Sample::default().render()).unwrap();

        Self {
            _dir: dir,
            root,
            postprocess: None,
        }
    }

    fn marker(&self, name: &str, content: &str) {
        fs::write(self.root.join("bin").join(name), content).unwrap();
    }

    fn clear_marker(&self, name: &str) {
        fs::remove_file(self.root.join("bin").join(name)).unwrap();
    }

    fn output(&self) -> PathBuf {
        self.root.join("build/main.js")
    }

    fn actor(&self, run_mode: RunMode) -> (CompilerActor, mpsc::Receiver<WsMsg>) {
        let config = WatchConfig::from_path(&self.root.join("elm-watch.json"), None).unwrap();
        let persisted = PersistedState::new();
        let mode = (run_mode == RunMode::Make).then_some(CompilationMode::Standard);
        let project = Project::from_config(&config, &[], mode, &persisted);

        let (tx, rx) = mpsc::channel(32);
        let (ws_tx, ws_rx) = mpsc::channel(256);
        let settings = CompilerSettings {
            compiler: self.root.join("bin/fake-elm"),
            postprocess: self.postprocess.clone(),
            run_mode,
            root: self.root.clone(),
        };
        let ws_tx = (run_mode == RunMode::Hot).then_some(ws_tx);
        let actor = CompilerActor::new(rx, tx, ws_tx, project, persisted, &config, settings);
        (actor, ws_rx)
    }
}

fn status(actor: &CompilerActor) -> Status {
    let key = actor.project.key_for_name("main").unwrap();
    actor.project.get(key).unwrap().state.status.clone()
}

fn generation(actor: &CompilerActor) -> u64 {
    let key = actor.project.key_for_name("main").unwrap();
    actor.project.get(key).unwrap().state.generation
}

/// Feed the actor its own messages until `done` holds.
async fn drive_until(actor: &mut CompilerActor, mut done: impl FnMut(&CompilerActor) -> bool) {
    tokio::time::timeout(TIMEOUT, async move {
        while !done(actor) {
            let msg = actor.rx.recv().await.unwrap();
            actor.dispatch(msg);
            actor.pump();
            actor.send_due().await;
        }
    })
    .await
    .expect("actor did not reach the expected state");
}

async fn boot(actor: &mut CompilerActor) {
    actor.start();
    actor.pump();
}

fn frames(ws_rx: &mut mpsc::Receiver<WsMsg>) -> Vec<String> {
    let mut texts = Vec::new();
    while let Ok(msg) = ws_rx.try_recv() {
        if let WsMsg::Send { text, .. } = msg {
            texts.push(text);
        }
    }
    texts
}

#[tokio::test]
async fn test_make_writes_output_and_state() {
    let fx = Fixture::new();
    let (actor, _ws) = fx.actor(RunMode::Make);

    let summary = tokio::time::timeout(TIMEOUT, actor.run()).await.unwrap();
    assert!(summary.is_success(), "{:?}", summary.failed);
    assert_eq!(summary.compiled, 1);

    let output = fs::read_to_string(fx.output()).unwrap();
    assert!(output.contains("$elm$browser$Browser$element"));

    let state = restore_state(&fx.root).unwrap();
    let saved = state.get("main").unwrap();
    assert!(saved.fingerprint.is_some());
    assert_eq!(saved.mode, CompilationMode::Standard);
}

#[tokio::test]
async fn test_make_reports_compile_error() {
    let fx = Fixture::new();
    fx.marker(
        "fail",
        r#"{"type":"error","path":null,"title":"NO MAIN","message":["Main has no `main` value."]}"#,
    );
    let (actor, _ws) = fx.actor(RunMode::Make);

    let summary = tokio::time::timeout(TIMEOUT, actor.run()).await.unwrap();
    assert!(!summary.is_success());
    let (name, error) = &summary.failed[0];
    assert_eq!(name, "main");
    assert!(error.contains("NO MAIN"));
    assert!(error.contains("has no `main` value"));
    assert!(!fx.output().exists());
}

#[tokio::test]
async fn test_make_runs_postprocess() {
    let mut fx = Fixture::new();
    fx.postprocess = Some(vec![
        "sh".into(),
        "-c".into(),
        r#"cat; echo "// post $0 $2""#.into(),
    ]);
    let (actor, _ws) = fx.actor(RunMode::Make);

    let summary = tokio::time::timeout(TIMEOUT, actor.run()).await.unwrap();
    assert!(summary.is_success(), "{:?}", summary.failed);
    let output = fs::read_to_string(fx.output()).unwrap();
    assert!(output.trim_end().ends_with("// post main make"));
}

#[tokio::test]
async fn test_make_reports_postprocess_failure() {
    let mut fx = Fixture::new();
    fx.postprocess = Some(vec!["sh".into(), "-c".into(), "echo bad >&2; exit 2".into()]);
    let (actor, _ws) = fx.actor(RunMode::Make);

    let summary = tokio::time::timeout(TIMEOUT, actor.run()).await.unwrap();
    assert!(!summary.is_success());
    let (name, error) = &summary.failed[0];
    assert_eq!(name, "main");
    assert!(error.starts_with("postprocess exited with 2\n"), "{error}");
    assert!(error.contains("stderr:\nbad\n"), "{error}");
    assert!(!fx.output().exists());
}

#[tokio::test]
async fn test_unconnected_target_only_typechecks() {
    let fx = Fixture::new();
    let (mut actor, _ws) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;

    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::TypecheckOnly)).await;
    assert!(!fx.output().exists());
    assert!(actor.scheduler.is_idle());
}

#[tokio::test]
async fn test_change_during_compile_interrupts() {
    let fx = Fixture::new();
    fx.marker("slow", "");
    let (mut actor, _ws) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;

    drive_until(&mut actor, |a| matches!(status(a), Status::Compiling(_))).await;
    let before = generation(&actor);

    fx.clear_marker("slow");
    let interrupted_at = Instant::now();
    actor.dispatch(CompilerMsg::SourcesChanged(vec![fx.root.join("src/Page.elm")]));
    assert_eq!(status(&actor), Status::Interrupted);
    assert_eq!(actor.scheduler.running(), 1, "slot held until the old process exits");

    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::TypecheckOnly)).await;
    assert_eq!(generation(&actor), before + 1);
    assert!(interrupted_at.elapsed() < Duration::from_secs(5), "old compile outlived its kill");
}

#[tokio::test]
async fn test_connection_during_typecheck_promotes_to_full_compile() {
    let fx = Fixture::new();
    fx.marker("hold", "");
    let (mut actor, mut ws_rx) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;
    drive_until(&mut actor, |a| status(a) == Status::Compiling(CompileKind::TypecheckOnly)).await;

    actor.dispatch(CompilerMsg::Client {
        session: SessionId::from_raw(2),
        message: ClientMessage::Hello {
            targets: vec![HelloTarget {
                name: "main".into(),
                artifact: None,
            }],
        },
    });
    actor.pump();
    assert_eq!(status(&actor), Status::Compiling(CompileKind::TypecheckOnly));

    fx.clear_marker("hold");
    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::FullCompile)).await;
    assert!(fx.output().exists());

    actor.send_due().await;
    let sent = frames(&mut ws_rx).join("\n");
    assert!(sent.contains(r#""tag":"FullReload""#), "{sent}");
}

#[tokio::test]
async fn test_identical_recompile_sends_no_reload() {
    let fx = Fixture::new();
    let (mut actor, mut ws_rx) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;
    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::TypecheckOnly)).await;

    // The page already runs exactly what the compiler produces
    let running = Sample::default().fingerprint(CompilationMode::Standard).hash;
    actor.dispatch(CompilerMsg::Client {
        session: SessionId::from_raw(4),
        message: ClientMessage::Hello {
            targets: vec![HelloTarget {
                name: "main".into(),
                artifact: Some(running),
            }],
        },
    });
    actor.pump();
    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::FullCompile)).await;
    let first = generation(&actor);

    fs::write(
        fx.root.join("src/Main.elm"),
        "module Main exposing (main)\nimport Html\nimport Page\nmain = Html.text \"hi\" -- touched\n",
    )
    .unwrap();
    actor.dispatch(CompilerMsg::SourcesChanged(vec![fx.root.join("src/Main.elm")]));
    actor.pump();
    drive_until(&mut actor, |a| {
        generation(a) > first && status(a) == Status::Success(CompileKind::FullCompile)
    })
    .await;

    actor.send_due().await;
    let sent = frames(&mut ws_rx).join("\n");
    assert!(sent.contains(r#""tag":"StatusChanged""#), "{sent}");
    for tag in ["SuccessfullyCompiled", "HotPatch", "FullReload"] {
        assert!(!sent.contains(&format!(r#""tag":"{tag}""#)), "{tag} in {sent}");
    }
}

#[tokio::test]
async fn test_connection_gets_full_compile_and_reload() {
    let fx = Fixture::new();
    let (mut actor, mut ws_rx) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;
    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::TypecheckOnly)).await;

    let session = SessionId::from_raw(1);
    actor.dispatch(CompilerMsg::Client {
        session,
        message: ClientMessage::Hello {
            targets: vec![HelloTarget {
                name: "main".into(),
                artifact: Some("from-an-older-build".into()),
            }],
        },
    });
    actor.pump();

    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::FullCompile)).await;
    assert!(fx.output().exists());

    actor.send_due().await;
    let sent = frames(&mut ws_rx).join("\n");
    assert!(sent.contains(r#""tag":"FullReload""#), "{sent}");
    assert!(sent.contains("running code predates this watcher session"));
    assert!(sent.contains(r#""tag":"SuccessfullyCompiled""#));
}

#[tokio::test]
async fn test_disconnect_returns_to_typecheck() {
    let fx = Fixture::new();
    let (mut actor, _ws) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;
    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::TypecheckOnly)).await;

    let session = SessionId::from_raw(7);
    actor.dispatch(CompilerMsg::Client {
        session,
        message: ClientMessage::Hello {
            targets: vec![HelloTarget {
                name: "main".into(),
                artifact: None,
            }],
        },
    });
    actor.dispatch(CompilerMsg::Disconnected(session));
    assert!(!actor.hub.is_connected(session));

    actor.pump();
    drive_until(&mut actor, |a| matches!(status(a), Status::Success(_))).await;
    assert_eq!(status(&actor), Status::Success(CompileKind::TypecheckOnly));
}

#[tokio::test]
async fn test_install_failure_blocks_group() {
    let fx = Fixture::new();
    fx.marker("install-fail", "");
    let (mut actor, _ws) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;

    drive_until(&mut actor, |a| a.installing.is_empty()).await;
    match status(&actor) {
        Status::DependenciesError(error) => assert!(error.contains("package.elm-lang.org")),
        other => panic!("unexpected status {other:?}"),
    }
    assert!(actor.scheduler.is_idle());

    // Fixed by the next elm.json change
    fx.clear_marker("install-fail");
    actor.dispatch(CompilerMsg::ElmJsonChanged(vec![fx.root.join("elm.json")]));
    actor.pump();
    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::TypecheckOnly)).await;
}

#[tokio::test]
async fn test_mode_change_is_persisted_and_recompiles() {
    let fx = Fixture::new();
    let (mut actor, _ws) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;
    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::TypecheckOnly)).await;

    actor.dispatch(CompilerMsg::Client {
        session: SessionId::from_raw(3),
        message: ClientMessage::ChangeCompilationMode {
            target: "main".into(),
            mode: CompilationMode::Debug,
        },
    });

    let key = actor.project.key_for_name("main").unwrap().clone();
    assert_eq!(actor.project.get(&key).unwrap().mode, CompilationMode::Debug);
    assert_eq!(status(&actor), Status::NeedsCompile);
    assert!(actor.scheduler.is_queued(&key));

    let state = restore_state(&fx.root).unwrap();
    assert_eq!(state.get("main").unwrap().mode, CompilationMode::Debug);
}

#[tokio::test]
async fn test_unrelated_change_is_ignored() {
    let fx = Fixture::new();
    let (mut actor, _ws) = fx.actor(RunMode::Hot);
    boot(&mut actor).await;
    drive_until(&mut actor, |a| status(a) == Status::Success(CompileKind::TypecheckOnly)).await;
    let before = generation(&actor);

    let other = fx.root.join("src/Unused.elm");
    fs::write(&other, "module Unused exposing (y)\ny = 2\n").unwrap();
    actor.dispatch(CompilerMsg::SourcesChanged(vec![other]));

    assert_eq!(generation(&actor), before);
    assert!(actor.scheduler.is_idle());
}
