//! `elm.json` manifests.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::ConfigError;
use crate::utils::path::resolve_path;

pub const ELM_JSON: &str = "elm.json";

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawManifest {
    Application {
        #[serde(rename = "source-directories")]
        source_directories: Vec<PathBuf>,
    },
    Package {},
}

/// The parts of `elm.json` the watcher cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElmManifest {
    /// Absolute, normalized source directories
    pub source_dirs: Vec<PathBuf>,
}

impl ElmManifest {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let raw: RawManifest = serde_json::from_str(&content)
            .map_err(|err| ConfigError::Json(path.to_path_buf(), err))?;

        let dir = path.parent().unwrap_or(Path::new("."));
        let source_dirs = match raw {
            RawManifest::Application { source_directories } => source_directories
                .iter()
                .map(|relative| resolve_path(relative, dir))
                .collect(),
            RawManifest::Package {} => vec![resolve_path(Path::new("src"), dir)],
        };

        if source_dirs.is_empty() {
            return Err(ConfigError::Validation(format!(
                "{}: \"source-directories\" is empty",
                path.display()
            )));
        }
        Ok(Self { source_dirs })
    }
}

/// Closest `elm.json` at or above the directory containing `file`.
pub fn find_elm_json(file: &Path) -> Option<PathBuf> {
    file.ancestors()
        .skip(1)
        .map(|dir| dir.join(ELM_JSON))
        .find(|candidate| candidate.is_file())
}
