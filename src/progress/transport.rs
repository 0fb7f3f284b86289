//! WebSocket transport for the progress channel.

use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use super::channel::{ChannelError, FrameStream, ProgressTransport};

pub struct WebSocketTransport {
    url: Url,
}

impl WebSocketTransport {
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl ProgressTransport for WebSocketTransport {
    async fn open(&self) -> Result<FrameStream, ChannelError> {
        debug!(url = %self.url, "connecting progress websocket");
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;

        // Nothing is ever sent on this connection; only text frames carry
        // events. Close frames are followed by the end of the stream.
        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(ChannelError::Transport(e.to_string()))),
            }
        });

        Ok(Box::pin(frames))
    }
}
