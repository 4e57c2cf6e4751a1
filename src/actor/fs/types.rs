use std::path::{Path, PathBuf};

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub(super) fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

/// Files the watcher reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WatchedFile {
    ElmSource,
    ElmJson,
    Config,
}

impl WatchedFile {
    /// Categorize a path; `None` for everything the watcher ignores.
    ///
    /// Anything under `elm-stuff` or `node_modules` is ignored, including the
    /// temporary outputs and the install dummy module.
    pub(super) fn of(path: &Path, config_path: &Path) -> Option<Self> {
        if path == config_path {
            return Some(Self::Config);
        }
        let generated = path.components().any(|c| {
            matches!(c.as_os_str().to_str(), Some("elm-stuff" | "node_modules"))
        });
        if generated {
            return None;
        }
        if path.file_name().is_some_and(|n| n == "elm.json") {
            return Some(Self::ElmJson);
        }
        if path.extension().is_some_and(|e| e == "elm") {
            return Some(Self::ElmSource);
        }
        None
    }
}

/// Debounced file events that survived classification
pub(super) struct DebouncedEvents(pub(super) Vec<(PathBuf, ChangeKind, WatchedFile)>);

impl DebouncedEvents {
    /// Paths grouped by category, each in a stable order.
    pub(super) fn split(self) -> (Vec<PathBuf>, Vec<PathBuf>, bool) {
        let mut sources = Vec::new();
        let mut manifests = Vec::new();
        let mut config = false;

        for (path, _, file) in self.0 {
            match file {
                WatchedFile::ElmSource => sources.push(path),
                WatchedFile::ElmJson => manifests.push(path),
                WatchedFile::Config => config = true,
            }
        }
        sources.sort();
        manifests.sort();

        (sources, manifests, config)
    }
}
