//! Coalescing outbox.
//!
//! Messages for one session that are produced within the coalescing window
//! leave as a single frame. A full reload anywhere in the window absorbs the
//! hot patches queued next to it.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::message::ServerMessage;
use crate::core::SessionId;

#[derive(Debug)]
struct Pending {
    deadline: Instant,
    messages: Vec<ServerMessage>,
    reload: Vec<String>,
}

impl Pending {
    /// Final frame content. Patches are dropped when a reload follows.
    fn finish(self) -> Option<ServerMessage> {
        let mut messages = self.messages;
        if !self.reload.is_empty() {
            messages.retain(|m| !m.is_patch());
            messages.push(ServerMessage::FullReload {
                reasons: self.reload,
            });
        }
        ServerMessage::batch(messages)
    }
}

/// Per-session pending messages with a flush deadline.
#[derive(Debug)]
pub struct Outbox {
    window: Duration,
    pending: FxHashMap<SessionId, Pending>,
}

impl Outbox {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: FxHashMap::default(),
        }
    }

    fn slot(&mut self, session: SessionId, now: Instant) -> &mut Pending {
        let window = self.window;
        self.pending.entry(session).or_insert_with(|| Pending {
            deadline: now + window,
            messages: Vec::new(),
            reload: Vec::new(),
        })
    }

    /// Queue a message. The window opens with the first message.
    pub fn push(&mut self, session: SessionId, message: ServerMessage, now: Instant) {
        match message {
            ServerMessage::FullReload { reasons } => self.slot(session, now).reload.extend(reasons),
            message => self.slot(session, now).messages.push(message),
        }
    }

    /// Queue a full reload, prefixing each reason with the target name.
    pub fn push_reload(&mut self, session: SessionId, target: &str, reasons: Vec<String>, now: Instant) {
        let slot = self.slot(session, now);
        slot.reload
            .extend(reasons.into_iter().map(|r| format!("{target}: {r}")));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Frames whose window has closed.
    pub fn take_due(&mut self, now: Instant) -> Vec<(SessionId, ServerMessage)> {
        let due: Vec<SessionId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(s, _)| *s)
            .collect();
        self.collect(due)
    }

    /// Every pending frame, regardless of deadline.
    pub fn flush_all(&mut self) -> Vec<(SessionId, ServerMessage)> {
        let all: Vec<SessionId> = self.pending.keys().copied().collect();
        self.collect(all)
    }

    /// Drop whatever is queued for a session that went away.
    pub fn forget(&mut self, session: SessionId) {
        self.pending.remove(&session);
    }

    fn collect(&mut self, mut sessions: Vec<SessionId>) -> Vec<(SessionId, ServerMessage)> {
        sessions.sort();
        sessions
            .into_iter()
            .filter_map(|s| {
                let pending = self.pending.remove(&s)?;
                pending.finish().map(|m| (s, m))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::reload::message::Change;

    fn patch(target: &str) -> ServerMessage {
        ServerMessage::HotPatch {
            target: target.into(),
            artifact: "h".into(),
            code: Arc::from(""),
            changes: vec![Change::Update],
        }
    }

    #[test]
    fn test_window_holds_until_deadline() {
        let start = Instant::now();
        let mut outbox = Outbox::new(Duration::from_millis(30));
        let s = SessionId::from_raw(1);

        outbox.push(s, patch("a"), start);
        outbox.push(s, patch("b"), start + Duration::from_millis(10));
        assert_eq!(outbox.next_deadline(), Some(start + Duration::from_millis(30)));

        assert!(outbox.take_due(start + Duration::from_millis(20)).is_empty());
        let frames = outbox.take_due(start + Duration::from_millis(30));
        assert_eq!(frames.len(), 1);
        let ServerMessage::Batch { messages } = &frames[0].1 else {
            panic!("expected batch");
        };
        assert_eq!(messages.len(), 2);
        assert_eq!(outbox.next_deadline(), None);
    }

    #[test]
    fn test_reload_absorbs_patches() {
        let now = Instant::now();
        let mut outbox = Outbox::new(Duration::from_millis(30));
        let s = SessionId::from_raw(1);

        outbox.push(s, patch("a"), now);
        outbox.push_reload(s, "b", vec!["`init` changed".into()], now);
        outbox.push_reload(s, "c", vec!["port added: x (incoming)".into()], now);

        let frames = outbox.flush_all();
        assert_eq!(
            frames,
            vec![(
                s,
                ServerMessage::FullReload {
                    reasons: vec![
                        "b: `init` changed".into(),
                        "c: port added: x (incoming)".into()
                    ],
                }
            )]
        );
    }

    #[test]
    fn test_sessions_are_independent() {
        let now = Instant::now();
        let mut outbox = Outbox::new(Duration::from_millis(30));
        let a = SessionId::from_raw(1);
        let b = SessionId::from_raw(2);

        outbox.push(a, patch("x"), now);
        outbox.push_reload(b, "x", vec!["r".into()], now);
        outbox.forget(b);

        let frames = outbox.flush_all();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].0, a);
        assert!(frames[0].1.is_patch());
    }
}
