//! Compilation and run modes.

use serde::{Deserialize, Serialize};

/// Compiler flag set a target is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilationMode {
    #[default]
    Standard,
    /// `--debug`: enables the time-travelling debugger overlay
    Debug,
    /// `--optimize`: mangles record fields, strips debug info
    Optimize,
}

impl CompilationMode {
    /// Extra compiler flag, if any.
    pub fn flag(self) -> Option<&'static str> {
        match self {
            Self::Standard => None,
            Self::Debug => Some("--debug"),
            Self::Optimize => Some("--optimize"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Debug => "debug",
            Self::Optimize => "optimize",
        }
    }
}

/// Whether the session is a one-shot build or a long-running watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Make,
    Hot,
}

impl RunMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Make => "make",
            Self::Hot => "hot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_flags() {
        assert_eq!(CompilationMode::Standard.flag(), None);
        assert_eq!(CompilationMode::Debug.flag(), Some("--debug"));
        assert_eq!(CompilationMode::Optimize.flag(), Some("--optimize"));
    }

    #[test]
    fn test_mode_serde_lowercase() {
        let json = serde_json::to_string(&CompilationMode::Optimize).unwrap();
        assert_eq!(json, r#""optimize""#);
        let mode: CompilationMode = serde_json::from_str(r#""debug""#).unwrap();
        assert_eq!(mode, CompilationMode::Debug);
    }
}
