//! Module dependency graph.
//!
//! Two layers:
//! - per-file import cache (`file → imported modules`) plus its inverse
//!   (`module → files importing it`)
//! - per-target related files (`target → files`) plus its inverse
//!   (`file → targets`)
//!
//! The graph is an over-approximation. Related sets include candidate paths
//! that do not exist (modules from packages, files not created yet), so a
//! later create event still finds its targets.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use super::resolve;
use super::scanner::{Imports, ModuleName};
use crate::core::OutputPath;

type PathSet = FxHashSet<PathBuf>;
type ImportCache = FxHashMap<PathBuf, Vec<ModuleName>>;

/// One target's walk roots.
#[derive(Debug, Clone)]
pub struct WalkJob {
    pub key: OutputPath,
    pub inputs: Vec<PathBuf>,
    pub source_dirs: Vec<PathBuf>,
}

/// Bidirectional target ↔ file graph.
///
/// # Invariants
/// - `forward` and `reverse` are always consistent
/// - `imports` and `importers` are always consistent
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// Target → every file it may depend on
    forward: FxHashMap<OutputPath, PathSet>,
    /// File → targets that may depend on it
    reverse: FxHashMap<PathBuf, FxHashSet<OutputPath>>,
    /// Parsed imports per existing file
    imports: ImportCache,
    /// Module → files importing it
    importers: FxHashMap<ModuleName, PathSet>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk every target, parsing files in parallel.
    pub fn rebuild_all(&mut self, jobs: &[WalkJob]) {
        let known = &self.imports;
        let results: Vec<(OutputPath, PathSet, ImportCache)> = jobs
            .par_iter()
            .map(|job| {
                let mut fresh = ImportCache::default();
                let related = walk(&job.inputs, &job.source_dirs, known, &mut fresh);
                (job.key.clone(), related, fresh)
            })
            .collect();

        for (key, related, fresh) in results {
            for (file, imports) in fresh {
                self.store_imports(file, imports);
            }
            self.record(key, related);
        }

        crate::debug!("deps"; "graph: {} targets, {} files tracked", self.forward.len(), self.reverse.len());
    }

    /// Re-walk one target, reusing cached imports.
    pub fn rebuild(&mut self, job: &WalkJob) {
        let mut fresh = ImportCache::default();
        let related = walk(&job.inputs, &job.source_dirs, &self.imports, &mut fresh);
        for (file, imports) in fresh {
            self.store_imports(file, imports);
        }
        self.record(job.key.clone(), related);
    }

    /// Drop cached imports of a changed file and return every target it may
    /// affect: targets that reach it directly, plus targets reaching any file
    /// that imports the module it defines.
    pub fn affected(&mut self, path: &Path, source_dirs: &[PathBuf]) -> FxHashSet<OutputPath> {
        self.invalidate(path);

        let mut targets = self.reverse.get(path).cloned().unwrap_or_default();
        if let Some(module) = resolve::module_for_path(path, source_dirs)
            && let Some(files) = self.importers.get(&module)
        {
            for file in files {
                if let Some(more) = self.reverse.get(file) {
                    targets.extend(more.iter().cloned());
                }
            }
        }
        targets
    }

    /// Targets that may depend on `file`.
    #[cfg(test)]
    pub fn targets_for(&self, file: &Path) -> Option<&FxHashSet<OutputPath>> {
        self.reverse.get(file)
    }

    /// Files a target may depend on.
    #[cfg(test)]
    pub fn related(&self, key: &OutputPath) -> Option<&PathSet> {
        self.forward.get(key)
    }

    /// Files known to import `module`.
    #[cfg(test)]
    pub fn importers_of(&self, module: &ModuleName) -> Option<&PathSet> {
        self.importers.get(module)
    }

    // -------------------------------------------------------------------------
    // Private
    // -------------------------------------------------------------------------

    /// Replace a target's related set.
    fn record(&mut self, key: OutputPath, related: PathSet) {
        self.remove_target(&key);
        for file in &related {
            self.reverse
                .entry(file.clone())
                .or_default()
                .insert(key.clone());
        }
        self.forward.insert(key, related);
    }

    fn remove_target(&mut self, key: &OutputPath) {
        let Some(old) = self.forward.remove(key) else {
            return;
        };
        for file in old {
            if let Some(targets) = self.reverse.get_mut(&file) {
                targets.remove(key);
                if targets.is_empty() {
                    self.reverse.remove(&file);
                }
            }
        }
    }

    fn store_imports(&mut self, file: PathBuf, imports: Vec<ModuleName>) {
        self.invalidate(&file);
        for module in &imports {
            self.importers
                .entry(module.clone())
                .or_default()
                .insert(file.clone());
        }
        self.imports.insert(file, imports);
    }

    fn invalidate(&mut self, file: &Path) {
        let Some(old) = self.imports.remove(file) else {
            return;
        };
        for module in old {
            if let Some(files) = self.importers.get_mut(&module) {
                files.remove(file);
                if files.is_empty() {
                    self.importers.remove(&module);
                }
            }
        }
    }
}

/// Breadth-first walk from the inputs through resolvable imports.
///
/// Files missing from both caches are read and parsed into `fresh`.
fn walk(inputs: &[PathBuf], source_dirs: &[PathBuf], known: &ImportCache, fresh: &mut ImportCache) -> PathSet {
    let mut related = PathSet::default();
    let mut queue: VecDeque<PathBuf> = inputs.iter().cloned().collect();

    while let Some(file) = queue.pop_front() {
        if !related.insert(file.clone()) {
            continue;
        }
        if !known.contains_key(&file) && !fresh.contains_key(&file) {
            let Ok(bytes) = fs::read(&file) else {
                continue;
            };
            let mut scan = Imports::new(&bytes);
            let modules: Vec<ModuleName> = scan.by_ref().collect();
            if !scan.is_non_import() {
                // Only imports up to end of file, likely saved mid-edit
                crate::debug!("deps"; "{}: no declarations after imports", file.display());
            }
            fresh.insert(file.clone(), modules);
        }
        let Some(imports) = known.get(&file).or_else(|| fresh.get(&file)) else {
            continue;
        };
        for module in imports {
            for candidate in resolve::candidates(module, source_dirs) {
                if !related.contains(&candidate) {
                    queue.push_back(candidate);
                }
            }
        }
    }

    related
}
