use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use super::types::{ChangeKind, DebouncedEvents, WatchedFile};

/// Turns raw debounced changes into events the compiler actor cares about.
///
/// Pipeline: correct_by_existence → categorize
pub(super) struct EventClassifier;

impl EventClassifier {
    pub(super) fn classify(
        raw: FxHashMap<PathBuf, ChangeKind>,
        config_path: &Path,
    ) -> Option<DebouncedEvents> {
        let mut changes = raw;
        Self::correct_by_existence(&mut changes);

        let events: Vec<_> = changes
            .into_iter()
            .filter_map(|(path, kind)| {
                let file = WatchedFile::of(&path, config_path)?;
                Some((path, kind, file))
            })
            .collect();

        (!events.is_empty()).then_some(DebouncedEvents(events))
    }

    /// Reconcile event kinds with what is on disk now.
    ///
    /// Atomic saves report Removed for a file that exists again, and a file
    /// may be gone before its Created event is processed.
    pub(super) fn correct_by_existence(changes: &mut FxHashMap<PathBuf, ChangeKind>) {
        changes.retain(|path, kind| {
            let exists = path.exists();
            match *kind {
                ChangeKind::Created if !exists => {
                    crate::debug!("watch"; "discard created (gone): {}", path.display());
                    false
                }
                ChangeKind::Modified if !exists => {
                    *kind = ChangeKind::Removed;
                    true
                }
                ChangeKind::Removed if exists => {
                    *kind = ChangeKind::Modified;
                    true
                }
                // Directory events carry no file content
                ChangeKind::Created | ChangeKind::Modified => !path.is_dir(),
                ChangeKind::Removed => true,
            }
        });
    }
}
