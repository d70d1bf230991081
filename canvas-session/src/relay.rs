//! WebSocket client for the realtime relay.

use canvas_core::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::RelayError;

/// Outbound side of a relay connection.
///
/// Sends are fire-and-forget: success means the frame was queued, not that
/// anyone received it.
pub trait RelayLink: Send + Sync {
    /// Queue a message for the relay.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Closed`] once the connection is gone.
    fn send(&self, message: ClientMessage) -> Result<(), RelayError>;
}

/// Relay connection over tokio-tungstenite.
///
/// A writer task drains the outbound queue in order; a reader task decodes
/// server frames onto the channel returned by [`WsRelayClient::connect`].
#[derive(Debug, Clone)]
pub struct WsRelayClient {
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl WsRelayClient {
    /// Connect to the relay at `url` (e.g. `ws://localhost:5000/ws`).
    ///
    /// Returns the client and the stream of messages from the server, the
    /// `welcome` frame first. The stream ends when the connection closes.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::WebSocket`] if the handshake fails.
    pub async fn connect(
        url: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ServerMessage>), RelayError> {
        let (stream, _) = connect_async(url).await?;
        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tracing::info!(url = %url, "Relay connected");

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!("Failed to encode {}: {e}", message.type_name());
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text)).await {
                    tracing::warn!("Relay send failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::debug!("Ignoring undecodable relay frame: {e}"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Relay connection error: {e}");
                        break;
                    }
                }
            }
            tracing::info!("Relay connection closed");
        });

        Ok((
            Self {
                outbound: outbound_tx,
            },
            inbound_rx,
        ))
    }

    /// Whether the writer is still accepting messages.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

impl RelayLink for WsRelayClient {
    fn send(&self, message: ClientMessage) -> Result<(), RelayError> {
        self.outbound.send(message).map_err(|_| RelayError::Closed)
    }
}
