//! Network layer: history REST helper, live-channel transport, and the
//! reconnecting connection client built on top of it.

pub mod api;
pub mod connection;
pub mod transport;
