//! Per-connection reload decision.
//!
//! Compares the artifact a connection last received against a freshly
//! compiled one and picks the least disruptive way to bring it up to date.

use crate::cache::PersistedFingerprint;

use super::fingerprint::Fingerprint;
use super::message::Change;

/// What a connection is known to be running for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Baseline {
    /// Fingerprint delivered in this session
    Full(Fingerprint),
    /// Fingerprint from a previous session, matched by artifact hash
    Persisted(PersistedFingerprint),
    /// Artifact hash the client reported, nothing else known
    Artifact(String),
    /// Client did not report an artifact
    Unknown,
}

impl Baseline {
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Full(fp) => Some(&fp.hash),
            Self::Persisted(p) => Some(&p.hash),
            Self::Artifact(hash) => Some(hash),
            Self::Unknown => None,
        }
    }
}

/// Outcome for one (connection, target) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    HotPatch(Vec<Change>),
    FullReload(Vec<String>),
}

/// Decide how to move a connection from `prev` to `next`.
pub fn decide(prev: &Baseline, next: &Fingerprint) -> Decision {
    if prev.hash() == Some(next.hash.as_str()) {
        return Decision::NoAction;
    }

    let prev = match prev {
        Baseline::Full(fp) => fp,
        Baseline::Persisted(old) => return Decision::FullReload(persisted_reasons(old, next)),
        Baseline::Artifact(_) => {
            return Decision::FullReload(vec!["running code predates this watcher session".into()]);
        }
        Baseline::Unknown => {
            return Decision::FullReload(vec!["running code is unknown".into()]);
        }
    };

    let reasons = reload_reasons(prev, next);
    if !reasons.is_empty() {
        return Decision::FullReload(reasons);
    }

    let mut changes = Vec::new();
    if prev.update != next.update {
        changes.push(Change::Update);
    }
    if prev.view != next.view {
        changes.push(Change::View);
    }
    if prev.subscriptions != next.subscriptions {
        changes.push(Change::Subscriptions);
    }
    if changes.is_empty() {
        changes.push(Change::Other);
    }
    Decision::HotPatch(changes)
}

/// Changes a running program cannot absorb in place.
fn reload_reasons(prev: &Fingerprint, next: &Fingerprint) -> Vec<String> {
    let mut reasons = Vec::new();

    if prev.programs != next.programs {
        if prev.has_view() != next.has_view() {
            reasons.push(if next.has_view() {
                "the program now has a view".to_string()
            } else {
                "the program no longer has a view".to_string()
            });
        } else {
            reasons.push(format!(
                "the program changed from {} to {}",
                program_labels(prev),
                program_labels(next)
            ));
        }
    }
    if prev.init != next.init {
        reasons.push("`init` changed".into());
    }
    for port in next.ports.difference(&prev.ports) {
        reasons.push(format!("port added: {}", port_label(port)));
    }
    for port in prev.ports.difference(&next.ports) {
        reasons.push(format!("port removed: {}", port_label(port)));
    }
    if prev.flags != next.flags {
        reasons.push("the flags type changed".into());
    }
    if prev.debug_metadata != next.debug_metadata {
        reasons.push("the message type changed (debugger metadata)".into());
    }
    if prev.mangling != next.mangling {
        reasons.push("record field mangling changed".into());
    }

    reasons
}

/// A persisted baseline only keeps hashes; name what can be told apart.
fn persisted_reasons(old: &PersistedFingerprint, next: &Fingerprint) -> Vec<String> {
    let mut reasons = Vec::new();
    if old.ports != next.ports_hash() {
        reasons.push("the port set changed".into());
    }
    if old.debug_metadata != next.debug_metadata {
        reasons.push("the message type changed (debugger metadata)".into());
    }
    if reasons.is_empty() {
        reasons.push("the code changed while the watcher was stopped".into());
    }
    reasons
}

fn program_labels(fp: &Fingerprint) -> String {
    if fp.programs.is_empty() {
        return "no program".into();
    }
    fp.programs
        .iter()
        .map(|p| p.label())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `out:send` → `send (outgoing)`
fn port_label(port: &str) -> String {
    match port.split_once(':') {
        Some(("in", name)) => format!("{name} (incoming)"),
        Some(("out", name)) => format!("{name} (outgoing)"),
        _ => port.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompilationMode;
    use crate::reload::fingerprint::tests::Sample;

    fn full(sample: &Sample) -> Baseline {
        Baseline::Full(sample.fingerprint(CompilationMode::Standard))
    }

    fn next(sample: &Sample) -> Fingerprint {
        sample.fingerprint(CompilationMode::Standard)
    }

    #[test]
    fn test_identical_is_no_action() {
        let sample = Sample::default();
        assert_eq!(decide(&full(&sample), &next(&sample)), Decision::NoAction);
    }

    #[test]
    fn test_update_change_is_hot_patch() {
        let before = Sample::default();
        let after = Sample {
            update: "model + 2",
            ..Sample::default()
        };
        assert_eq!(
            decide(&full(&before), &next(&after)),
            Decision::HotPatch(vec![Change::Update])
        );
    }

    #[test]
    fn test_view_change_is_hot_patch() {
        let before = Sample::default();
        let after = Sample {
            view: "$elm$html$Html$text('bye')",
            ..Sample::default()
        };
        assert_eq!(
            decide(&full(&before), &next(&after)),
            Decision::HotPatch(vec![Change::View])
        );
    }

    #[test]
    fn test_helper_change_is_other() {
        let before = Sample::default();
        let after = Sample {
            helper: "2",
            ..Sample::default()
        };
        assert_eq!(
            decide(&full(&before), &next(&after)),
            Decision::HotPatch(vec![Change::Other])
        );
    }

    #[test]
    fn test_init_change_reloads() {
        let before = Sample::default();
        let after = Sample {
            init: "_Utils_Tuple2(1, $elm$core$Platform$Cmd$none)",
            ..Sample::default()
        };
        let Decision::FullReload(reasons) = decide(&full(&before), &next(&after)) else {
            panic!("expected full reload");
        };
        assert_eq!(reasons, vec!["`init` changed".to_string()]);
    }

    #[test]
    fn test_port_change_reloads() {
        let before = Sample::default();
        let after = Sample {
            ports: &["sendMessage"],
            ..Sample::default()
        };
        let Decision::FullReload(reasons) = decide(&full(&before), &next(&after)) else {
            panic!("expected full reload");
        };
        assert_eq!(reasons, vec!["port added: sendMessage (outgoing)".to_string()]);

        // and back
        let Decision::FullReload(reasons) = decide(&full(&after), &next(&before)) else {
            panic!("expected full reload");
        };
        assert_eq!(reasons, vec!["port removed: sendMessage (outgoing)".to_string()]);
    }

    #[test]
    fn test_flags_change_reloads() {
        let before = Sample::default();
        let after = Sample {
            flags: "$elm$json$Json$Decode$string",
            ..Sample::default()
        };
        assert!(matches!(
            decide(&full(&before), &next(&after)),
            Decision::FullReload(_)
        ));
    }

    #[test]
    fn test_program_kind_change_reloads() {
        let before = Sample::default();
        let after = Sample {
            program: "worker",
            ..Sample::default()
        };
        let Decision::FullReload(reasons) = decide(&full(&before), &next(&after)) else {
            panic!("expected full reload");
        };
        assert!(reasons.contains(&"the program no longer has a view".to_string()));

        let after = Sample {
            program: "document",
            ..Sample::default()
        };
        let Decision::FullReload(reasons) = decide(&full(&before), &next(&after)) else {
            panic!("expected full reload");
        };
        assert_eq!(
            reasons,
            vec!["the program changed from Browser.element to Browser.document".to_string()]
        );
    }

    #[test]
    fn test_mode_switch_reloads() {
        let sample = Sample::default();
        let debug = Sample {
            debug: r#"{"versions":{"elm":"0.19.1"},"types":{"message":"Main.Msg"}}"#,
            ..Sample::default()
        };
        let prev = full(&sample);
        let next = debug.fingerprint(CompilationMode::Debug);
        assert!(matches!(decide(&prev, &next), Decision::FullReload(_)));

        let optimized = sample.fingerprint(CompilationMode::Optimize);
        assert!(matches!(decide(&prev, &optimized), Decision::FullReload(_)));
    }

    #[test]
    fn test_partial_baselines() {
        let sample = Sample::default();
        let fp = next(&sample);

        assert_eq!(
            decide(&Baseline::Artifact(fp.hash.clone()), &fp),
            Decision::NoAction
        );
        assert_eq!(
            decide(&Baseline::Persisted(fp.to_persisted()), &fp),
            Decision::NoAction
        );
        assert!(matches!(
            decide(&Baseline::Artifact("stale".into()), &fp),
            Decision::FullReload(_)
        ));
        assert!(matches!(decide(&Baseline::Unknown, &fp), Decision::FullReload(_)));

        let with_port = Sample {
            ports: &["out"],
            ..Sample::default()
        };
        let Decision::FullReload(reasons) =
            decide(&Baseline::Persisted(fp.to_persisted()), &next(&with_port))
        else {
            panic!("expected full reload");
        };
        assert_eq!(reasons, vec!["the port set changed".to_string()]);
    }
}
