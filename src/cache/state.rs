//! `state.json` persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::CACHE_DIR;
use crate::core::CompilationMode;

/// State file name
const STATE_FILE: &str = "state.json";

/// Fingerprint data that survives a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedFingerprint {
    /// Full artifact hash (hex)
    pub hash: String,
    /// Hash of the debugger metadata, debug builds only
    #[serde(default)]
    pub debug_metadata: Option<u64>,
    /// Hash of the port name set
    pub ports: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedTarget {
    #[serde(default)]
    pub mode: CompilationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<PersistedFingerprint>,
}

/// All targets, keyed by target name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub targets: BTreeMap<String, PersistedTarget>,
}

impl PersistedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&PersistedTarget> {
        self.targets.get(name)
    }

    pub fn set_mode(&mut self, name: &str, mode: CompilationMode) {
        self.targets.entry(name.to_string()).or_default().mode = mode;
    }

    pub fn set_fingerprint(&mut self, name: &str, fingerprint: PersistedFingerprint) {
        self.targets.entry(name.to_string()).or_default().fingerprint = Some(fingerprint);
    }

    /// Drop entries for targets no longer configured.
    pub fn retain_targets<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let keep: Vec<&str> = names.into_iter().collect();
        self.targets.retain(|name, _| keep.contains(&name.as_str()));
    }
}

/// Check if file content is the same as new content
fn file_content_matches(path: &Path, content: &str) -> bool {
    path.exists() && fs::read_to_string(path).is_ok_and(|existing| existing == content)
}

/// Persist target state to disk
pub fn persist_state(state: &PersistedState, root: &Path) -> std::io::Result<()> {
    let cache_dir = root.join(CACHE_DIR);
    let path = cache_dir.join(STATE_FILE);

    fs::create_dir_all(&cache_dir)?;

    let json = serde_json::to_string_pretty(state)?;

    if file_content_matches(&path, &json) {
        crate::debug!("persist"; "state unchanged, skipping write");
        return Ok(());
    }

    fs::write(&path, &json)?;
    crate::debug!("persist"; "saved state for {} targets", state.targets.len());
    Ok(())
}

/// Restore target state from disk. Missing file = empty state.
pub fn restore_state(root: &Path) -> std::io::Result<PersistedState> {
    let path = root.join(CACHE_DIR).join(STATE_FILE);

    if !path.exists() {
        return Ok(PersistedState::new());
    }

    let json = fs::read_to_string(&path)?;
    let state: PersistedState = serde_json::from_str(&json)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    crate::debug!("persist"; "restored state for {} targets", state.targets.len());
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> PersistedFingerprint {
        PersistedFingerprint {
            hash: "ab12".into(),
            debug_metadata: None,
            ports: 7,
        }
    }

    #[test]
    fn test_restore_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(restore_state(dir.path()).unwrap(), PersistedState::new());
    }

    #[test]
    fn test_persist_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = PersistedState::new();
        state.set_mode("main", CompilationMode::Debug);
        state.set_fingerprint("main", fingerprint());
        state.set_mode("admin", CompilationMode::Optimize);

        persist_state(&state, dir.path()).unwrap();
        let restored = restore_state(dir.path()).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.get("main").unwrap().mode, CompilationMode::Debug);
        assert!(restored.get("admin").unwrap().fingerprint.is_none());
    }

    #[test]
    fn test_unchanged_state_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = PersistedState::new();
        state.set_mode("main", CompilationMode::Standard);
        persist_state(&state, dir.path()).unwrap();

        let path = dir.path().join(CACHE_DIR).join(STATE_FILE);
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        persist_state(&state, dir.path()).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn test_corrupt_state_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join(CACHE_DIR);
        fs::create_dir_all(&cache).unwrap();
        fs::write(cache.join(STATE_FILE), "{ nope").unwrap();
        let err = restore_state(dir.path()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_retain_targets() {
        let mut state = PersistedState::new();
        state.set_mode("a", CompilationMode::Standard);
        state.set_mode("b", CompilationMode::Standard);
        state.retain_targets(["b"]);
        assert!(state.get("a").is_none());
        assert!(state.get("b").is_some());
    }
}
