//! Live chat connection client.
//!
//! The `ConnectionClient` owns one logical connection to the chat server:
//! connect, decode inbound envelopes, forward outbound events, and reconnect
//! whenever the connection ends. It is the bridge between the wire protocol
//! in `frames` and the chat view state.
//!
//! LIFECYCLE
//! =========
//! `connecting -> online -> offline -> connecting -> ...` with no terminal
//! state. Any close (clean, error, failed handshake) is followed by a fixed
//! `RECONNECT_DELAY` and another attempt. There is no backoff and no retry cap.
//!
//! Every spawned connection task carries the epoch it was started under.
//! `start` and `stop` bump the epoch inside the status channel's write lock,
//! so a task that is being torn down can never publish a status afterwards.

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use frames::ChatEvent;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

use super::transport::{Connection, Connector, TransportError};
use crate::config::ClientConfig;

/// Pause between a connection ending and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(1500);

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Online,
    Offline,
}

impl ConnectionStatus {
    /// Short label for the chat header.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting...",
            Self::Online => "Live",
            Self::Offline => "Offline",
        }
    }
}

pub struct ConnectionClient {
    url: String,
    connector: Arc<dyn Connector>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    epoch: Arc<AtomicU64>,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    events: mpsc::UnboundedSender<ChatEvent>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionClient {
    /// Create an idle client. Decoded inbound events are delivered on the
    /// returned receiver for as long as the client lives, across reconnects.
    pub fn new(config: &ClientConfig, connector: impl Connector) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let client = Self {
            url: config.ws_url.clone(),
            connector: Arc::new(connector),
            status: Arc::new(status),
            epoch: Arc::new(AtomicU64::new(0)),
            outbound_tx,
            outbound_rx: Arc::new(Mutex::new(outbound_rx)),
            events: events_tx,
            task: None,
        };
        (client, events_rx)
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Open the connection, restarting it if one is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        self.abort_task();
        let epoch = self.advance_epoch(ConnectionStatus::Connecting);

        let ctx = LoopContext {
            url: self.url.clone(),
            connector: Arc::clone(&self.connector),
            status: Arc::clone(&self.status),
            current_epoch: Arc::clone(&self.epoch),
            epoch,
            outbound: Arc::clone(&self.outbound_rx),
            events: self.events.clone(),
        };
        self.task = Some(tokio::spawn(run_connection_loop(ctx)));
    }

    /// Close the connection and cancel any pending reconnect. Idempotent.
    pub fn stop(&mut self) {
        if self.abort_task() {
            self.advance_epoch(ConnectionStatus::Offline);
            tracing::info!(url = %self.url, "chat channel stopped");
        }
    }

    /// Queue an event for the server.
    ///
    /// Returns `false` (and writes nothing) unless the connection is online.
    /// Delivery is not guaranteed even when `true`; callers wanting a local
    /// echo must add it themselves.
    pub fn send(&self, event: &ChatEvent) -> bool {
        if self.task.is_none() || self.status() != ConnectionStatus::Online {
            tracing::debug!(kind = event.kind().as_str(), "chat channel not online; event not sent");
            return false;
        }
        self.outbound_tx.send(frames::encode_event(event)).is_ok()
    }

    fn abort_task(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    fn advance_epoch(&self, status: ConnectionStatus) -> u64 {
        let mut epoch = 0;
        self.status.send_if_modified(|current| {
            epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
            let changed = *current != status;
            *current = status;
            changed
        });
        epoch
    }
}

impl Drop for ConnectionClient {
    fn drop(&mut self) {
        self.abort_task();
    }
}

// =============================================================================
// CONNECTION LOOP
// =============================================================================

struct LoopContext {
    url: String,
    connector: Arc<dyn Connector>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    current_epoch: Arc<AtomicU64>,
    epoch: u64,
    outbound: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl LoopContext {
    /// Publish a status unless this loop has been superseded.
    fn publish(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if self.current_epoch.load(Ordering::SeqCst) != self.epoch || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

async fn run_connection_loop(ctx: LoopContext) {
    // Held for the life of the loop; released when the task is aborted.
    let mut outbound = ctx.outbound.lock().await;

    loop {
        ctx.publish(ConnectionStatus::Connecting);

        match ctx.connector.connect(&ctx.url).await {
            Ok(conn) => {
                discard_pending(&mut outbound);
                ctx.publish(ConnectionStatus::Online);
                tracing::info!(url = %ctx.url, "chat channel online");

                match pump(conn, &mut outbound, &ctx.events).await {
                    Ok(()) => tracing::info!(url = %ctx.url, "chat channel closed"),
                    Err(e) => tracing::warn!(url = %ctx.url, error = %e, "chat channel dropped"),
                }
            }
            Err(e) => {
                tracing::warn!(url = %ctx.url, error = %e, "chat channel connect failed");
            }
        }

        ctx.publish(ConnectionStatus::Offline);
        discard_pending(&mut outbound);

        tracing::debug!(delay = ?RECONNECT_DELAY, "chat channel reconnect scheduled");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Shuttle frames both ways until the connection ends.
async fn pump(
    conn: Connection,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<ChatEvent>,
) -> Result<(), TransportError> {
    let Connection { mut sink, mut stream } = conn;

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(text)) => dispatch(&text, events),
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
            Some(text) = outbound.recv() => sink.send_text(text).await?,
        }
    }
}

/// Decode one inbound frame and hand it to the event consumer.
fn dispatch(text: &str, events: &mpsc::UnboundedSender<ChatEvent>) {
    match frames::decode_event(text) {
        Ok(Some(event)) => {
            if events.send(event).is_err() {
                tracing::debug!("chat event receiver gone; event dropped");
            }
        }
        Ok(None) => tracing::debug!("ignoring envelope without a recognised type"),
        Err(e) => tracing::warn!(error = %e, "dropping malformed chat event"),
    }
}

/// Events queued for a connection that has since gone away are never replayed.
fn discard_pending(outbound: &mut mpsc::UnboundedReceiver<String>) {
    let mut dropped = 0_usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!(dropped, "discarded events queued while disconnected");
    }
}
