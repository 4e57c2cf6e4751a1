//! Connected programs and what each one is running.
//!
//! The hub is owned by the compiler actor. It never touches the transport:
//! every operation queues into the outbox, and the actor drains due frames
//! with [`ReloadHub::take_due`] and hands them to the websocket actor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::batch::Outbox;
use super::decide::{Baseline, Decision, decide};
use super::fingerprint::Fingerprint;
use super::message::ServerMessage;
use crate::core::{OutputPath, SessionId};

/// One target running in a connection.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub target: OutputPath,
    pub name: String,
    pub baseline: Baseline,
    /// Deadline for the acknowledgement of the last hot patch
    pub awaiting_ack: Option<Instant>,
}

impl Subscription {
    pub fn new(target: OutputPath, name: impl Into<String>, baseline: Baseline) -> Self {
        Self {
            target,
            name: name.into(),
            baseline,
            awaiting_ack: None,
        }
    }
}

#[derive(Debug, Default)]
struct Connection {
    subscriptions: Vec<Subscription>,
    /// A full reload went out; the page is about to go away
    reloading: bool,
}

impl Connection {
    fn subscription_mut(&mut self, name: &str) -> Option<&mut Subscription> {
        self.subscriptions.iter_mut().find(|s| s.name == name)
    }
}

/// Decision log entry, kept for tests.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decided {
    pub session: SessionId,
    pub decision: Decision,
}

#[derive(Debug)]
pub struct ReloadHub {
    connections: FxHashMap<SessionId, Connection>,
    outbox: Outbox,
    ack_timeout: Duration,
    #[cfg(test)]
    decided: Vec<Decided>,
}

impl ReloadHub {
    pub fn new(coalesce: Duration, ack_timeout: Duration) -> Self {
        Self {
            connections: FxHashMap::default(),
            outbox: Outbox::new(coalesce),
            ack_timeout,
            #[cfg(test)]
            decided: Vec::new(),
        }
    }

    /// Register (or re-register) a session's targets.
    pub fn connect(&mut self, session: SessionId, subscriptions: Vec<Subscription>) {
        let connection = self.connections.entry(session).or_default();
        connection.reloading = false;
        connection.subscriptions = subscriptions;
    }

    /// Forget a session. Returns the targets it was subscribed to.
    pub fn disconnect(&mut self, session: SessionId) -> Vec<OutputPath> {
        self.outbox.forget(session);
        self.connections
            .remove(&session)
            .map(|c| c.subscriptions.into_iter().map(|s| s.target).collect())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, session: SessionId) -> bool {
        self.connections.contains_key(&session)
    }

    /// Sessions running `target`.
    pub fn sessions_for(&self, target: &OutputPath) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self
            .connections
            .iter()
            .filter(|(_, c)| c.subscriptions.iter().any(|s| &s.target == target))
            .map(|(id, _)| *id)
            .collect();
        sessions.sort();
        sessions
    }

    /// Bring every connection running `target` up to `next`.
    ///
    /// Decided per connection against what that connection last received.
    /// Returns the sessions that were sent a patch or a reload; connections
    /// already running `next` get nothing.
    pub fn deliver(&mut self, target: &OutputPath, next: &Fingerprint, code: &Arc<str>, now: Instant) -> Vec<SessionId> {
        let mut acted = Vec::new();
        for (session, connection) in &mut self.connections {
            if connection.reloading {
                continue;
            }
            for sub in connection.subscriptions.iter_mut().filter(|s| &s.target == target) {
                let decision = decide(&sub.baseline, next);
                crate::debug!("hot"; "{} {}: {:?}", session, sub.name, decision);

                match &decision {
                    Decision::NoAction => {}
                    Decision::HotPatch(changes) => {
                        self.outbox.push(
                            *session,
                            ServerMessage::HotPatch {
                                target: sub.name.clone(),
                                artifact: next.hash.clone(),
                                code: Arc::clone(code),
                                changes: changes.clone(),
                            },
                            now,
                        );
                        sub.baseline = Baseline::Full(next.clone());
                    }
                    Decision::FullReload(reasons) => {
                        self.outbox.push_reload(*session, &sub.name, reasons.clone(), now);
                        sub.baseline = Baseline::Full(next.clone());
                    }
                }

                if decision != Decision::NoAction && !acted.contains(session) {
                    acted.push(*session);
                }

                #[cfg(test)]
                self.decided.push(Decided {
                    session: *session,
                    decision,
                });
            }
        }
        acted.sort();
        acted
    }

    /// Send to every connection running `target`.
    pub fn notify(&mut self, target: &OutputPath, message: ServerMessage, now: Instant) {
        for session in self.sessions_for(target) {
            self.outbox.push(session, message.clone(), now);
        }
    }

    /// Send to one connection.
    pub fn send(&mut self, session: SessionId, message: ServerMessage, now: Instant) {
        if self.connections.contains_key(&session) {
            self.outbox.push(session, message, now);
        }
    }

    /// Reload one connection because of `target`.
    pub fn reload(&mut self, session: SessionId, target: &str, reasons: Vec<String>, now: Instant) {
        if self.connections.contains_key(&session) {
            self.outbox.push_reload(session, target, reasons, now);
        }
    }

    pub fn patch_applied(&mut self, session: SessionId, target: &str) {
        if let Some(sub) = self
            .connections
            .get_mut(&session)
            .and_then(|c| c.subscription_mut(target))
        {
            sub.awaiting_ack = None;
        }
    }

    /// A patch failed to evaluate in one page; only that page reloads.
    pub fn eval_error(&mut self, session: SessionId, target: &str, error: &str, now: Instant) {
        crate::log!("hot"; "{session} {target}: patch failed to evaluate: {error}");
        if let Some(sub) = self
            .connections
            .get_mut(&session)
            .and_then(|c| c.subscription_mut(target))
        {
            sub.awaiting_ack = None;
        }
        self.reload(session, target, vec![format!("hot patch failed: {error}")], now);
    }

    /// Drop connections that did not acknowledge a patch in time.
    pub fn expired(&mut self, now: Instant) -> Vec<SessionId> {
        let mut gone: Vec<SessionId> = self
            .connections
            .iter()
            .filter(|(_, c)| {
                c.subscriptions
                    .iter()
                    .any(|s| s.awaiting_ack.is_some_and(|deadline| deadline <= now))
            })
            .map(|(id, _)| *id)
            .collect();
        gone.sort();
        for session in &gone {
            crate::log!("hot"; "{session} did not acknowledge a patch, dropping");
            self.connections.remove(session);
            self.outbox.forget(*session);
        }
        gone
    }

    /// Frames ready to go out, serialized.
    pub fn take_due(&mut self, now: Instant) -> Vec<(SessionId, String)> {
        let frames = self.outbox.take_due(now);
        self.sent(frames, now)
    }

    /// Everything queued, regardless of window.
    pub fn flush(&mut self, now: Instant) -> Vec<(SessionId, String)> {
        let frames = self.outbox.flush_all();
        self.sent(frames, now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        let acks = self
            .connections
            .values()
            .flat_map(|c| c.subscriptions.iter())
            .filter_map(|s| s.awaiting_ack);
        self.outbox.next_deadline().into_iter().chain(acks).min()
    }

    /// Track acknowledgements and reload state of frames leaving the hub.
    fn sent(&mut self, frames: Vec<(SessionId, ServerMessage)>, now: Instant) -> Vec<(SessionId, String)> {
        frames
            .into_iter()
            .map(|(session, message)| {
                if let Some(connection) = self.connections.get_mut(&session) {
                    let ack_deadline = now + self.ack_timeout;
                    visit(&message, &mut |m| match m {
                        ServerMessage::FullReload { .. } => connection.reloading = true,
                        ServerMessage::HotPatch { target, .. } => {
                            if let Some(sub) = connection.subscription_mut(target) {
                                sub.awaiting_ack = Some(ack_deadline);
                            }
                        }
                        _ => {}
                    });
                }
                (session, message.to_json())
            })
            .collect()
    }

    #[cfg(test)]
    pub fn take_decided(&mut self) -> Vec<Decided> {
        std::mem::take(&mut self.decided)
    }
}

fn visit(message: &ServerMessage, f: &mut impl FnMut(&ServerMessage)) {
    match message {
        ServerMessage::Batch { messages } => {
            for m in messages {
                visit(m, f);
            }
        }
        other => f(other),
    }
}
