//! Targets sharing one `elm.json`.

use std::path::PathBuf;

use crate::config::ElmManifest;
use crate::core::{ElmJsonPath, OutputPath};

/// Dependency state of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupState {
    Ready,
    Installing,
    /// Manifest unreadable or installation failed
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ElmJsonGroup {
    pub elm_json: ElmJsonPath,
    /// Absolute source directories from the manifest
    pub source_dirs: Vec<PathBuf>,
    pub state: GroupState,
    /// Set on startup and on every `elm.json` change; cleared when an
    /// installation starts
    pub needs_install: bool,
    pub members: Vec<OutputPath>,
}

impl ElmJsonGroup {
    pub fn load(elm_json: ElmJsonPath) -> Self {
        let mut group = Self {
            elm_json,
            source_dirs: Vec::new(),
            state: GroupState::Ready,
            needs_install: true,
            members: Vec::new(),
        };
        group.reload_manifest();
        group
    }

    /// Re-read `source-directories`. A broken manifest puts the group in
    /// error until the next change.
    pub fn reload_manifest(&mut self) {
        match ElmManifest::read(self.elm_json.as_path()) {
            Ok(manifest) => {
                self.source_dirs = manifest.source_dirs;
                self.state = GroupState::Ready;
                self.needs_install = true;
            }
            Err(err) => {
                crate::debug!("deps"; "{}: {}", self.elm_json, err);
                self.state = GroupState::Error(err.flatten());
                self.needs_install = false;
            }
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            GroupState::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Members may be compiled.
    pub fn is_ready(&self) -> bool {
        self.state == GroupState::Ready && !self.needs_install
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_application_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elm.json");
        fs::write(
            &path,
            r#"{"type":"application","source-directories":["src","lib"]}"#,
        )
        .unwrap();

        let group = ElmJsonGroup::load(ElmJsonPath::new(&path));
        assert_eq!(group.state, GroupState::Ready);
        assert_eq!(group.source_dirs.len(), 2);
        assert!(group.needs_install);
        assert!(!group.is_ready());
    }

    #[test]
    fn test_broken_manifest_is_group_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elm.json");
        fs::write(&path, "{").unwrap();

        let mut group = ElmJsonGroup::load(ElmJsonPath::new(&path));
        assert!(group.error().is_some());
        assert!(!group.needs_install);

        fs::write(&path, r#"{"type":"application","source-directories":["src"]}"#).unwrap();
        group.reload_manifest();
        assert_eq!(group.error(), None);
        assert!(group.needs_install);
    }
}
