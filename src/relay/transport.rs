//! Socket transport for relay links.
//!
//! A [`Connector`] turns a relay URL into a [`Link`]: a pair of text
//! channels. The connection manager only ever talks to the channels, so
//! the WebSocket implementation can be swapped for an in-memory peer in
//! tests.
//!
//! A link is considered lost when its inbound channel closes. Dropping the
//! outbound sender closes the underlying socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use nostr::RelayUrl;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use super::error::{RelayError, RelayResult};

/// An established transport link.
#[derive(Debug)]
pub struct Link {
    /// Text frames to send to the relay.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Text frames received from the relay. Closes when the link is lost.
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Opens transport links to relays.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a link to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Connection`] if the relay cannot be reached.
    async fn connect(&self, url: &RelayUrl) -> RelayResult<Link>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &RelayUrl) -> RelayResult<Link> {
        let (stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| RelayError::Connection {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<String>();

        let relay = url.to_string();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(relay = %relay, error = %e, "websocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let relay = url.to_string();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(relay = %relay, ?frame, "relay closed websocket");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(relay = %relay, error = %e, "websocket read failed");
                        break;
                    }
                }
            }
        });

        Ok(Link { outbound, inbound })
    }
}
