//! Project aggregate.
//!
//! Every target and `elm.json` group lives in one arena, keyed by
//! normalized output path and manifest path. The compiler actor owns the
//! project and is its only mutator.
//!
//! # Modules
//!
//! - `target` - `Target`, `OutputState` and its transitions
//! - `group` - `ElmJsonGroup`

mod group;
mod target;

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use group::ElmJsonGroup;
use target::OutputState;

pub use group::GroupState;
pub use target::{Artifact, DirtyAction, Target};

use crate::cache::{CACHE_DIR, PersistedState};
use crate::config::{WatchConfig, find_elm_json};
use crate::core::{CompilationMode, ElmJsonPath, OutputPath, Status};
use crate::deps::graph::WalkJob;
use crate::utils::hash;
use crate::utils::path::normalize_path;

#[derive(Debug, Default)]
pub struct Project {
    root: PathBuf,
    groups: FxHashMap<ElmJsonPath, ElmJsonGroup>,
    targets: FxHashMap<OutputPath, Target>,
    /// Configuration order
    order: Vec<OutputPath>,
    by_name: FxHashMap<String, OutputPath>,
}

impl Project {
    /// Build targets and groups from configuration.
    ///
    /// `filters` select targets by name substring; unselected targets start
    /// disabled. `mode` overrides the persisted compilation mode.
    pub fn from_config(
        config: &WatchConfig,
        filters: &[String],
        mode: Option<CompilationMode>,
        persisted: &PersistedState,
    ) -> Self {
        let mut project = Self {
            root: config.root.clone(),
            ..Self::default()
        };

        for tc in &config.targets {
            let output = OutputPath::new(normalize_path(&tc.output));
            let inputs: Vec<PathBuf> = tc.inputs.iter().map(|p| normalize_path(p)).collect();
            let saved = persisted.get(&tc.name);

            let (group, input_error) = match validate(&inputs, output.as_path()) {
                Ok(elm_json) => (Some(ElmJsonPath::new(elm_json)), None),
                Err(message) => (None, Some(message)),
            };
            let disabled = !filters.is_empty() && !filters.iter().any(|f| tc.name.contains(f.as_str()));

            let status = match (&input_error, disabled) {
                (Some(e), _) => Status::InputError(e.clone()),
                (None, true) => Status::Disabled,
                (None, false) => Status::Idle,
            };

            if let Some(elm_json) = &group {
                project
                    .groups
                    .entry(elm_json.clone())
                    .or_insert_with(|| ElmJsonGroup::load(elm_json.clone()))
                    .members
                    .push(output.clone());
            }

            let target = Target {
                name: tc.name.clone(),
                temp_output: temp_output_path(&config.root, &tc.name, &output),
                inputs,
                output: output.clone(),
                mode: mode
                    .or_else(|| saved.map(|s| s.mode))
                    .unwrap_or_default(),
                disabled,
                group,
                input_error,
                state: OutputState::new(status, saved.and_then(|s| s.fingerprint.clone())),
            };

            project.by_name.insert(tc.name.clone(), output.clone());
            project.order.push(output.clone());
            project.targets.insert(output, target);
        }

        project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, key: &OutputPath) -> Option<&Target> {
        self.targets.get(key)
    }

    pub fn get_mut(&mut self, key: &OutputPath) -> Option<&mut Target> {
        self.targets.get_mut(key)
    }

    pub fn key_for_name(&self, name: &str) -> Option<&OutputPath> {
        self.by_name.get(name)
    }

    /// Targets in configuration order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.order.iter().filter_map(|key| self.targets.get(key))
    }

    pub fn keys(&self) -> &[OutputPath] {
        &self.order
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn group_mut(&mut self, key: &ElmJsonPath) -> Option<&mut ElmJsonGroup> {
        self.groups.get_mut(key)
    }

    pub fn groups(&self) -> impl Iterator<Item = &ElmJsonGroup> {
        self.groups.values()
    }

    /// Group of a target, if it has one.
    pub fn group_of(&self, key: &OutputPath) -> Option<&ElmJsonGroup> {
        self.targets
            .get(key)
            .and_then(|t| t.group.as_ref())
            .and_then(|g| self.groups.get(g))
    }

    /// Group owning this manifest path.
    pub fn group_key_for(&self, elm_json: &Path) -> Option<ElmJsonPath> {
        let key = ElmJsonPath::new(elm_json);
        self.groups.contains_key(&key).then_some(key)
    }

    /// Source directories a target resolves imports against.
    pub fn source_dirs(&self, key: &OutputPath) -> &[PathBuf] {
        self.group_of(key)
            .map(|g| g.source_dirs.as_slice())
            .unwrap_or_default()
    }

    /// Every source directory of every group.
    pub fn all_source_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .groups
            .values()
            .flat_map(|g| g.source_dirs.iter().cloned())
            .collect();
        dirs.sort();
        dirs.dedup();
        dirs
    }

    /// Source directories of the group that owns `file`, if any.
    pub fn source_dirs_containing(&self, file: &Path) -> Vec<PathBuf> {
        self.groups
            .values()
            .flat_map(|g| g.source_dirs.iter())
            .filter(|dir| file.starts_with(dir))
            .cloned()
            .collect()
    }

    pub fn walk_job(&self, key: &OutputPath) -> Option<WalkJob> {
        let target = self.targets.get(key)?;
        target.group.as_ref()?;
        Some(WalkJob {
            key: key.clone(),
            inputs: target.inputs.clone(),
            source_dirs: self.source_dirs(key).to_vec(),
        })
    }

    /// Walk roots of every target that has a group.
    pub fn walk_jobs(&self) -> Vec<WalkJob> {
        self.order.iter().filter_map(|key| self.walk_job(key)).collect()
    }

    /// Targets with a configured input at `path`.
    pub fn targets_with_input(&self, path: &Path) -> Vec<OutputPath> {
        self.targets()
            .filter(|t| t.inputs.iter().any(|i| i == path))
            .map(|t| t.output.clone())
            .collect()
    }

    /// Re-check a misconfigured target after its inputs changed on disk.
    /// Returns `true` when the fault is gone.
    pub fn revalidate(&mut self, key: &OutputPath) -> bool {
        let Some(target) = self.targets.get(key) else {
            return false;
        };
        if target.input_error.is_none() {
            return false;
        }
        let Ok(elm_json) = validate(&target.inputs, key.as_path()) else {
            return false;
        };

        let group = ElmJsonPath::new(elm_json);
        self.groups
            .entry(group.clone())
            .or_insert_with(|| ElmJsonGroup::load(group.clone()))
            .members
            .push(key.clone());

        let Some(target) = self.targets.get_mut(key) else {
            return false;
        };
        target.group = Some(group);
        target.input_error = None;
        target.state.status = if target.disabled {
            Status::Disabled
        } else {
            Status::Idle
        };
        true
    }

    /// A target may be handed to the compiler: enabled and its group is
    /// ready.
    pub fn is_compilable(&self, key: &OutputPath) -> bool {
        let Some(target) = self.targets.get(key) else {
            return false;
        };
        target.is_enabled() && self.group_of(key).is_some_and(ElmJsonGroup::is_ready)
    }

    /// Names of every target, for pruning persisted state.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets().map(|t| t.name.as_str())
    }
}

/// Output must be `.js`, inputs must exist and be `.elm`, all inputs must
/// share one `elm.json`. Returns that `elm.json`.
fn validate(inputs: &[PathBuf], output: &Path) -> Result<PathBuf, String> {
    if output.extension().and_then(|e| e.to_str()) != Some("js") {
        return Err(format!("output must end with .js: {}", output.display()));
    }

    let mut elm_json: Option<PathBuf> = None;
    for input in inputs {
        if input.extension().and_then(|e| e.to_str()) != Some("elm") {
            return Err(format!("input must end with .elm: {}", input.display()));
        }
        if !input.is_file() {
            return Err(format!("input not found: {}", input.display()));
        }
        let Some(found) = find_elm_json(input) else {
            return Err(format!("no elm.json found for {}", input.display()));
        };
        let found = normalize_path(&found);
        match &elm_json {
            Some(existing) if existing != &found => {
                return Err(format!(
                    "inputs belong to different elm.json files: {} and {}",
                    existing.display(),
                    found.display()
                ));
            }
            Some(_) => {}
            None => elm_json = Some(found),
        }
    }

    elm_json.ok_or_else(|| "target has no inputs".to_string())
}

/// `elm-stuff/elm-watch/tmp/<name>-<hash>.js`, unique per output path.
fn temp_output_path(root: &Path, name: &str, output: &OutputPath) -> PathBuf {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let id = hash::compute(output.as_path().to_string_lossy().as_bytes());
    root.join(CACHE_DIR)
        .join("tmp")
        .join(format!("{sanitized}-{id:016x}.js"))
}

#[cfg(test)]
mod tests;
