//! Client-side state.
//!
//! DESIGN
//! ======
//! Split by domain: `chat` holds the live message list and typing set fed by
//! the connection client, `expenses` holds the persisted expense book. The
//! two never touch each other.

pub mod chat;
pub mod expenses;
