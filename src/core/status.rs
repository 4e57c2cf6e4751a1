//! Per-target compilation status.

use serde::Serialize;

/// How much work a compile does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompileKind {
    /// Type errors only, no output written
    TypecheckOnly,
    /// Produces the output file
    FullCompile,
}

/// Status of one target's output.
///
/// Transitions are driven exclusively by the compiler actor; see
/// `actor::compiler` for the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tag", content = "detail")]
pub enum Status {
    Idle,
    Disabled,
    NeedsCompile,
    Compiling(CompileKind),
    /// Running process was killed; a fresh compile follows once it exits
    Interrupted,
    Postprocessing,
    Success(CompileKind),
    CompileError(String),
    /// Missing input, missing elm.json, bad output path
    InputError(String),
    DependenciesInstalling,
    DependenciesError(String),
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Disabled => "disabled",
            Self::NeedsCompile => "waiting",
            Self::Compiling(CompileKind::TypecheckOnly) => "typechecking",
            Self::Compiling(CompileKind::FullCompile) => "compiling",
            Self::Interrupted => "interrupted",
            Self::Postprocessing => "postprocessing",
            Self::Success(CompileKind::TypecheckOnly) => "typecheck ok",
            Self::Success(CompileKind::FullCompile) => "success",
            Self::CompileError(_) => "compile error",
            Self::InputError(_) => "input error",
            Self::DependenciesInstalling => "installing dependencies",
            Self::DependenciesError(_) => "dependencies error",
        }
    }

    /// Error text carried by failure states.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::CompileError(e) | Self::InputError(e) | Self::DependenciesError(e) => Some(e),
            _ => None,
        }
    }

    /// A process for this target is (or is about to be) running.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Compiling(_) | Self::Interrupted | Self::Postprocessing
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_text() {
        assert_eq!(Status::CompileError("boom".into()).error(), Some("boom"));
        assert_eq!(Status::Idle.error(), None);
    }

    #[test]
    fn test_status_busy() {
        assert!(Status::Interrupted.is_busy());
        assert!(Status::Compiling(CompileKind::TypecheckOnly).is_busy());
        assert!(!Status::Success(CompileKind::TypecheckOnly).is_busy());
        assert!(!Status::NeedsCompile.is_busy());
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&Status::Compiling(CompileKind::FullCompile)).unwrap();
        assert_eq!(json, r#"{"tag":"Compiling","detail":"FullCompile"}"#);
        let json = serde_json::to_string(&Status::Idle).unwrap();
        assert_eq!(json, r#"{"tag":"Idle"}"#);
    }
}
