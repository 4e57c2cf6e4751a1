use super::types::DebouncedEvents;
use crate::actor::messages::CompilerMsg;

pub(super) fn log_events(events: &DebouncedEvents) {
    for (path, kind, _) in &events.0 {
        crate::debug!("watch"; "{}: {}", kind.label(), path.display());
    }
}

/// Convert classified events to compiler messages.
///
/// Manifest changes go first so the affected groups are reloaded before
/// source changes are mapped onto their targets.
pub(super) fn events_to_messages(events: DebouncedEvents) -> Vec<CompilerMsg> {
    let (sources, manifests, config) = events.split();

    let mut messages = Vec::new();
    if config {
        messages.push(CompilerMsg::ConfigChanged);
    }
    if !manifests.is_empty() {
        messages.push(CompilerMsg::ElmJsonChanged(manifests));
    }
    if !sources.is_empty() {
        messages.push(CompilerMsg::SourcesChanged(sources));
    }
    messages
}
