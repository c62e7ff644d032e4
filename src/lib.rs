//! Vetri client core: the live chat channel and the personal expense book.
//!
//! `net` talks to the chat server (history over HTTP, events over a
//! reconnecting WebSocket), `state` holds what the dashboard renders, and
//! `aggregate` derives the chart data from the expense list.

pub mod aggregate;
pub mod config;
pub mod net;
pub mod state;

pub use frames::{ChatEvent, ChatMessage, CodecError, EventKind};
