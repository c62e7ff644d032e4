//! Transport seam between the connection client and the live channel.
//!
//! `Connector` opens one connection and hands back its two halves: a text
//! sink for outbound envelopes and a stream of inbound text frames. The
//! production implementation speaks WebSocket via `tokio-tungstenite`;
//! tests substitute in-memory doubles.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, SplitSink};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    #[error("websocket error: {0}")]
    Socket(Box<tungstenite::Error>),
}

/// Inbound text frames. The stream ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// Outbound half of an open connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
}

/// An established connection, split into its halves.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub stream: FrameStream,
}

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection to `url`. Resolves once the handshake completes.
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}

/// WebSocket connector used outside tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(Box::new(e)))?;
        let (write, read) = ws.split();

        // Only text frames carry envelopes; control and binary frames are skipped.
        let stream = read
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::Socket(Box::new(e)))),
                }
            })
            .boxed();

        Ok(Connection { sink: Box::new(WsSink(write)), stream })
    }
}

struct WsSink(SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Socket(Box::new(e)))
    }
}
