use std::fs;

use tempfile::TempDir;

use super::*;
use crate::cache::PersistedTarget;
use crate::utils::path::normalize_path;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(
            root.join("elm.json"),
            r#"{"type":"application","source-directories":["src"]}"#,
        )
        .unwrap();
        fs::write(root.join("src/Main.elm"), "module Main exposing (main)\n").unwrap();
        fs::write(root.join("src/Admin.elm"), "module Admin exposing (main)\n").unwrap();
        Self { _dir: dir, root }
    }

    fn config(&self, targets: &str) -> WatchConfig {
        let path = self.root.join("elm-watch.json");
        fs::write(&path, format!(r#"{{"targets":{targets}}}"#)).unwrap();
        WatchConfig::from_path(&path, None).unwrap()
    }

    fn two_targets(&self) -> WatchConfig {
        self.config(
            r#"{
                "main": {"inputs": ["src/Main.elm"], "output": "build/main.js"},
                "admin": {"inputs": ["src/Admin.elm"], "output": "build/admin.js"}
            }"#,
        )
    }
}

#[test]
fn test_targets_share_group() {
    let fx = Fixture::new();
    let project = Project::from_config(&fx.two_targets(), &[], None, &PersistedState::new());

    assert_eq!(project.len(), 2);
    let names: Vec<_> = project.names().collect();
    assert_eq!(names, ["main", "admin"]);

    let groups: Vec<_> = project.groups().collect();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].members.len(), 2);
    assert_eq!(groups[0].source_dirs, vec![fx.root.join("src")]);

    let main = project.key_for_name("main").unwrap();
    assert_eq!(project.source_dirs(main), [fx.root.join("src")]);
    assert_eq!(project.get(main).unwrap().state.status, Status::Idle);
}

#[test]
fn test_filters_disable_others() {
    let fx = Fixture::new();
    let project = Project::from_config(
        &fx.two_targets(),
        &["adm".to_string()],
        None,
        &PersistedState::new(),
    );

    let main = project.get(project.key_for_name("main").unwrap()).unwrap();
    let admin = project.get(project.key_for_name("admin").unwrap()).unwrap();
    assert!(main.disabled);
    assert_eq!(main.state.status, Status::Disabled);
    assert!(admin.is_enabled());
}

#[test]
fn test_missing_input_is_input_error() {
    let fx = Fixture::new();
    let config = fx.config(r#"{"main": {"inputs": ["src/Nope.elm"], "output": "build/main.js"}}"#);
    let mut project = Project::from_config(&config, &[], None, &PersistedState::new());

    let key = project.key_for_name("main").unwrap().clone();
    let target = project.get(&key).unwrap();
    assert!(matches!(target.state.status, Status::InputError(_)));
    assert!(target.group.is_none());
    assert!(!project.is_compilable(&key));
    assert!(project.walk_jobs().is_empty());

    fs::write(fx.root.join("src/Nope.elm"), "module Nope exposing (x)\n").unwrap();
    assert!(project.revalidate(&key));
    assert_eq!(project.get(&key).unwrap().state.status, Status::Idle);
    assert_eq!(project.walk_jobs().len(), 1);
}

#[test]
fn test_bad_output_extension() {
    let fx = Fixture::new();
    let config = fx.config(r#"{"main": {"inputs": ["src/Main.elm"], "output": "build/main.html"}}"#);
    let project = Project::from_config(&config, &[], None, &PersistedState::new());
    let target = project.targets().next().unwrap();
    assert!(target.input_error.as_deref().unwrap().contains(".js"));
}

#[test]
fn test_group_must_install_before_compiling() {
    let fx = Fixture::new();
    let mut project = Project::from_config(&fx.two_targets(), &[], None, &PersistedState::new());
    let key = project.key_for_name("main").unwrap().clone();
    assert!(!project.is_compilable(&key));

    let group = project.get(&key).unwrap().group.clone().unwrap();
    project.group_mut(&group).unwrap().needs_install = false;
    assert!(project.is_compilable(&key));
}

#[test]
fn test_mode_from_persisted_and_override() {
    let fx = Fixture::new();
    let mut persisted = PersistedState::new();
    persisted.targets.insert(
        "main".into(),
        PersistedTarget {
            mode: CompilationMode::Debug,
            fingerprint: None,
        },
    );

    let project = Project::from_config(&fx.two_targets(), &[], None, &persisted);
    let mode_of = |p: &Project, name: &str| p.get(p.key_for_name(name).unwrap()).unwrap().mode;
    assert_eq!(mode_of(&project, "main"), CompilationMode::Debug);
    assert_eq!(mode_of(&project, "admin"), CompilationMode::Standard);

    let project = Project::from_config(
        &fx.two_targets(),
        &[],
        Some(CompilationMode::Optimize),
        &persisted,
    );
    assert_eq!(mode_of(&project, "main"), CompilationMode::Optimize);
}

#[test]
fn test_temp_outputs_are_distinct() {
    let fx = Fixture::new();
    let project = Project::from_config(&fx.two_targets(), &[], None, &PersistedState::new());
    let temps: Vec<_> = project.targets().map(|t| t.temp_output.clone()).collect();
    assert_ne!(temps[0], temps[1]);
    assert!(temps[0].starts_with(fx.root.join("elm-stuff/elm-watch/tmp")));
    assert!(temps[0].file_name().unwrap().to_string_lossy().starts_with("main-"));
}

#[test]
fn test_targets_with_input() {
    let fx = Fixture::new();
    let project = Project::from_config(&fx.two_targets(), &[], None, &PersistedState::new());
    let hits = project.targets_with_input(&fx.root.join("src/Main.elm"));
    assert_eq!(hits, vec![project.key_for_name("main").unwrap().clone()]);
}
