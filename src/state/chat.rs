//! Chat sidebar state: message list and typing indicators.
//!
//! DESIGN
//! ======
//! `ChatSession` owns `ChatState` and consumes the connection client's event
//! receiver. Inbound events and typing expiries are handled one at a time by
//! `next_update`, so state is only ever mutated from a single place.
//!
//! Typing timers live in a delay queue owned by the session. Each sender has
//! an independent 2 s window that is not refreshed by repeat signals; the
//! timers are dropped with the session.

#[cfg(test)]
#[path = "chat_test.rs"]
mod chat_test;

use std::time::Duration;

use frames::{ChatEvent, ChatMessage, EventKind, TypingSignal};
use futures_util::StreamExt;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio_util::time::DelayQueue;

use crate::net::connection::ConnectionClient;

/// How long a sender stays in the typing set after their first signal.
pub const TYPING_WINDOW: Duration = Duration::from_millis(2000);

/// Rendered chat state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatState {
    /// Insertion-ordered; not deduplicated.
    pub messages: Vec<ChatMessage>,
    /// Senders currently typing, in arrival order, no duplicates.
    pub typing: Vec<String>,
}

/// What a processed event did to the state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatUpdate {
    MessageAdded(ChatMessage),
    TypingChanged,
    /// The event was understood but changed nothing.
    Unchanged(EventKind),
}

/// Outcome of `ChatSession::send_message`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing happened.
    Empty,
    /// Handed to the live connection.
    Sent,
    /// Connection not ready; appended locally only.
    LocalOnly(ChatMessage),
}

pub struct ChatSession {
    state: ChatState,
    events: mpsc::UnboundedReceiver<ChatEvent>,
    typing_expiry: DelayQueue<String>,
}

impl ChatSession {
    #[must_use]
    pub fn new(events: mpsc::UnboundedReceiver<ChatEvent>) -> Self {
        Self {
            state: ChatState::default(),
            events,
            typing_expiry: DelayQueue::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Replace the message list with fetched history.
    pub fn load_history(&mut self, history: Vec<ChatMessage>) {
        self.state.messages = history;
    }

    /// Apply one inbound event.
    ///
    /// Must be called from within a Tokio runtime (typing timers).
    pub fn apply(&mut self, event: ChatEvent) -> ChatUpdate {
        match event {
            ChatEvent::Message(msg) => {
                self.state.messages.push(msg.clone());
                ChatUpdate::MessageAdded(msg)
            }
            ChatEvent::Typing(TypingSignal { from }) => {
                if self.state.typing.contains(&from) {
                    return ChatUpdate::Unchanged(EventKind::Typing);
                }
                self.typing_expiry.insert(from.clone(), TYPING_WINDOW);
                self.state.typing.push(from);
                ChatUpdate::TypingChanged
            }
            other => {
                tracing::debug!(kind = other.kind().as_str(), "chat event has no handler");
                ChatUpdate::Unchanged(other.kind())
            }
        }
    }

    /// Wait for the next inbound event or typing expiry and apply it.
    ///
    /// Returns `None` once the event source is closed and no typing timers remain.
    pub async fn next_update(&mut self) -> Option<ChatUpdate> {
        let has_timers = !self.typing_expiry.is_empty();
        tokio::select! {
            Some(expired) = self.typing_expiry.next(), if has_timers => {
                Some(self.expire_typing(&expired.into_inner()))
            }
            Some(event) = self.events.recv() => Some(self.apply(event)),
            else => None,
        }
    }

    fn expire_typing(&mut self, from: &str) -> ChatUpdate {
        let before = self.state.typing.len();
        self.state.typing.retain(|name| name != from);
        if self.state.typing.len() == before {
            ChatUpdate::Unchanged(EventKind::Typing)
        } else {
            ChatUpdate::TypingChanged
        }
    }

    /// Send a chat message as `from`.
    ///
    /// Blank text is ignored. When the connection is not ready the message is
    /// appended locally under a temporary id so the author still sees it.
    pub fn send_message(&mut self, client: &ConnectionClient, from: &str, text: &str, now: OffsetDateTime) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Empty;
        }

        let outgoing = ChatMessage::outgoing(from, text, &clock_time(now));
        if client.send(&ChatEvent::Message(outgoing.clone())) {
            return SendOutcome::Sent;
        }

        let local = ChatMessage {
            id: format!("tmp-{}", now.unix_timestamp_nanos() / 1_000_000),
            ..outgoing
        };
        self.state.messages.push(local.clone());
        SendOutcome::LocalOnly(local)
    }

    /// Best-effort typing signal for `from`.
    pub fn send_typing(&self, client: &ConnectionClient, from: &str) -> bool {
        client.send(&ChatEvent::Typing(TypingSignal { from: from.to_owned() }))
    }

    /// "Bob is typing…" / "Bob, Ann are typing…", or `None` when nobody is.
    #[must_use]
    pub fn typing_label(&self) -> Option<String> {
        match self.state.typing.as_slice() {
            [] => None,
            [one] => Some(format!("{one} is typing…")),
            many => Some(format!("{} are typing…", many.join(", "))),
        }
    }
}

/// `HH:MM` wall-clock time of `now` in its own offset.
fn clock_time(now: OffsetDateTime) -> String {
    format!("{:02}:{:02}", now.hour(), now.minute())
}
