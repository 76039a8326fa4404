//! Real-time feed transport.
//!
//! A [`FeedTransport`] opens the feed and yields its inbound text frames as a
//! stream. The stream ending means the connection closed; an `Err` item is a
//! transport error that does not by itself end the connection.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::{Error, Result};

/// Inbound frames of one open feed connection.
pub type FeedStream = BoxStream<'static, Result<String>>;

/// Opens feed connections.
#[async_trait]
pub trait FeedTransport: Send + Sync + std::fmt::Debug {
    /// Open a connection. Resolves once the connection is established.
    async fn connect(&self, url: &Url) -> Result<FeedStream>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
///
/// Text frames are passed through; binary frames are accepted if they are
/// valid UTF-8. Control frames are handled by the protocol layer and never
/// surface. Dropping the stream drops the socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> Result<FeedStream> {
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!(name: "feed.frame.binary_discarded", "Discarding non UTF-8 binary frame");
                        None
                    }
                },
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_)) => None,
                Err(e) => Some(Err(Error::Transport(e.to_string()))),
            }
        });

        Ok(frames.boxed())
    }
}
