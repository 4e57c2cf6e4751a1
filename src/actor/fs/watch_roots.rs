use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

/// One directory to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRoot {
    pub path: PathBuf,
    /// Source directories are watched recursively; manifest and config
    /// directories only for their direct entries
    pub recursive: bool,
}

impl WatchRoot {
    pub fn recursive(path: PathBuf) -> Self {
        Self { path, recursive: true }
    }

    pub fn shallow(path: PathBuf) -> Self {
        Self { path, recursive: false }
    }

    fn mode(&self) -> RecursiveMode {
        if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        }
    }
}

/// Keeps the watcher attached to every root that exists.
///
/// Roots missing at startup (a source directory not created yet) and roots
/// deleted and recreated are attached on the next `maintain`.
pub(super) struct WatchRoots {
    desired: Vec<WatchRoot>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(roots: Vec<WatchRoot>) -> Self {
        Self {
            desired: roots,
            attached: FxHashSet::default(),
        }
    }

    pub(super) fn attach_existing(&mut self, watcher: &mut RecommendedWatcher) -> notify::Result<()> {
        for root in &self.desired {
            if !root.path.is_dir() {
                crate::debug!("watch"; "not watching yet (missing): {}", root.path.display());
                continue;
            }
            watcher.watch(&root.path, root.mode())?;
            self.attached.insert(root.path.clone());
        }
        Ok(())
    }

    pub(super) fn maintain(&mut self, watcher: &mut RecommendedWatcher) {
        self.attached.retain(|path| path.is_dir());

        for root in &self.desired {
            if self.attached.contains(&root.path) || !root.path.is_dir() {
                continue;
            }
            if watcher.watch(&root.path, root.mode()).is_ok() {
                self.attached.insert(root.path.clone());
                crate::debug!("watch"; "attached watch: {}", root.path.display());
            }
        }
    }

    #[cfg(test)]
    pub(super) fn is_attached(&self, path: &std::path::Path) -> bool {
        self.attached.contains(path)
    }
}
