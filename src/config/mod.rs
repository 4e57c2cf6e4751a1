//! Watcher configuration.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── error       # ConfigError, ConfigDiagnostics
//! ├── manifest    # elm.json (source directories)
//! └── mod.rs      # WatchConfig (this file), elm-watch.json
//! ```
//!
//! # `elm-watch.json`
//!
//! | Key            | Purpose                                           |
//! |----------------|---------------------------------------------------|
//! | `targets`      | `{ name: { inputs: [..], output: "x.js" } }`      |
//! | `postprocess`  | argv of a command that rewrites compiled output   |
//! | `port`         | websocket port (next free port on conflict)       |
//! | `maxParallel`  | concurrent compiler processes                     |
//! | `compiler`     | compiler executable (default `elm`)               |
//! | `ackTimeoutMs` | wait for a patch acknowledgement                  |
//! | `coalesceMs`   | window for batching reload messages               |

mod error;
pub mod manifest;

pub use error::{ConfigDiagnostics, ConfigError};
pub use manifest::{ElmManifest, find_elm_json};

use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::path::{normalize_path, resolve_path};

pub const CONFIG_FILE: &str = "elm-watch.json";

/// Environment override for `maxParallel`.
pub const MAX_PARALLEL_ENV: &str = "ELM_WATCH_MAX_PARALLEL";

const DEFAULT_COMPILER: &str = "elm";
const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_COALESCE_MS: u64 = 30;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawConfig {
    targets: serde_json::Map<String, Value>,
    #[serde(default)]
    postprocess: Option<Vec<String>>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    max_parallel: Option<usize>,
    #[serde(default)]
    compiler: Option<String>,
    #[serde(default)]
    ack_timeout_ms: Option<u64>,
    #[serde(default)]
    coalesce_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    inputs: Vec<PathBuf>,
    output: PathBuf,
}

/// One configured target, paths resolved against the config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub name: String,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
}

/// Loaded `elm-watch.json`.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Absolute path of `elm-watch.json`
    pub config_path: PathBuf,
    /// Directory containing `elm-watch.json`
    pub root: PathBuf,
    /// Targets in file order
    pub targets: Vec<TargetConfig>,
    pub postprocess: Option<Vec<String>>,
    /// 0 = any free port
    pub port: u16,
    pub max_parallel: usize,
    pub compiler: String,
    pub ack_timeout: Duration,
    pub coalesce: Duration,
}

impl WatchConfig {
    /// Find `elm-watch.json` upward from `start` and load it.
    pub fn discover(start: &Path) -> Result<Self, ConfigError> {
        let path = find_config_file(start, Path::new(CONFIG_FILE)).ok_or_else(|| {
            ConfigError::Validation(format!(
                "{CONFIG_FILE} not found in {} or any parent directory",
                start.display()
            ))
        })?;
        let env = std::env::var(MAX_PARALLEL_ENV).ok();
        Self::from_path(&path, env.as_deref())
    }

    /// Load from an explicit path. `max_parallel_env` overrides the file.
    pub fn from_path(path: &Path, max_parallel_env: Option<&str>) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        let config_path = normalize_path(path);
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::parse(&content, config_path, root, max_parallel_env)
    }

    fn parse(
        content: &str,
        config_path: PathBuf,
        root: PathBuf,
        max_parallel_env: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(content)
            .map_err(|err| ConfigError::Json(config_path.clone(), err))?;

        let mut diag = ConfigDiagnostics::new();
        let targets = Self::parse_targets(&raw.targets, &root, &mut diag);

        if let Some(command) = &raw.postprocess
            && command.first().is_none_or(|program| program.is_empty())
        {
            diag.error("postprocess", "must be a non-empty array: [program, args...]");
        }
        if raw.max_parallel == Some(0) {
            diag.error_with_hint(
                "maxParallel",
                "must be at least 1",
                "remove the field to use the number of CPUs",
            );
        }
        diag.into_result()?;

        let max_parallel = match max_parallel_env {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "{MAX_PARALLEL_ENV} must be a positive integer, got `{value}`"
                    )));
                }
            },
            None => raw.max_parallel.unwrap_or_else(default_parallelism),
        };

        Ok(Self {
            config_path,
            root,
            targets,
            postprocess: raw.postprocess,
            port: raw.port.unwrap_or(0),
            max_parallel,
            compiler: raw.compiler.unwrap_or_else(|| DEFAULT_COMPILER.to_string()),
            ack_timeout: Duration::from_millis(raw.ack_timeout_ms.unwrap_or(DEFAULT_ACK_TIMEOUT_MS)),
            coalesce: Duration::from_millis(raw.coalesce_ms.unwrap_or(DEFAULT_COALESCE_MS)),
        })
    }

    fn parse_targets(
        raw: &serde_json::Map<String, Value>,
        root: &Path,
        diag: &mut ConfigDiagnostics,
    ) -> Vec<TargetConfig> {
        if raw.is_empty() {
            diag.error("targets", "at least one target is required");
        }

        let mut targets: Vec<TargetConfig> = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let field = format!("targets.{name}");
            if name.trim().is_empty() {
                diag.error(&field, "target name must not be empty");
                continue;
            }
            let target: RawTarget = match serde_json::from_value(value.clone()) {
                Ok(target) => target,
                Err(err) => {
                    diag.error(&field, err.to_string());
                    continue;
                }
            };
            if target.inputs.is_empty() {
                diag.error(format!("{field}.inputs"), "at least one input is required");
                continue;
            }

            let output = resolve_path(&target.output, root);
            if let Some(other) = targets.iter().find(|t| t.output == output) {
                diag.error(
                    format!("{field}.output"),
                    format!("same output as target `{}`", other.name),
                );
                continue;
            }

            targets.push(TargetConfig {
                name: name.clone(),
                inputs: target
                    .inputs
                    .iter()
                    .map(|input| resolve_path(input, root))
                    .collect(),
                output,
            });
        }
        targets
    }

    /// Path under the root, for display.
    pub fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Find config file by searching upward from `start`.
///
/// ```text
/// /home/user/app/src/Page/   ← start
/// /home/user/app/elm-watch.json  ← found!
/// ```
pub fn find_config_file(start: &Path, config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }
    start
        .ancestors()
        .map(|dir| dir.join(config_name))
        .find(|candidate| candidate.is_file())
}
