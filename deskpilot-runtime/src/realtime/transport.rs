//! Bidirectional message channel to the realtime service.

use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Outbound half. Messages are JSON text envelopes.
#[async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Best-effort close handshake.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Inbound half. `None` means the peer closed the connection.
#[async_trait]
pub trait TransportStream: Send {
    async fn next(&mut self) -> Option<Result<String, TransportError>>;
}

pub type TransportPair = (Box<dyn TransportSink>, Box<dyn TransportStream>);

/// Opens a fresh transport for every stream start.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<TransportPair, TransportError>;
}

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector authenticating with a bearer token.
pub struct WebSocketConnector {
    url: String,
    api_key: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    /// OpenAI realtime endpoint for `model`.
    pub fn openai(model: &str, api_key: impl Into<String>) -> Self {
        Self::new(format!("{OPENAI_REALTIME_URL}?model={model}"), api_key)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<TransportPair, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(format!("invalid url: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| TransportError::Connect(format!("invalid api key: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("openai-beta", HeaderValue::from_static("realtime=v1"));

        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Realtime connection open: {}", self.url);

        let (write, read) = ws.split();
        Ok((Box::new(WsSink { write }), Box::new(WsStream { read })))
    }
}

struct WsSink {
    write: SplitSink<Ws, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.write
            .close()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

struct WsStream {
    read: SplitStream<Ws>,
}

#[async_trait]
impl TransportStream for WsStream {
    async fn next(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!("ignoring non-utf8 binary frame"),
                },
                Ok(Message::Close(_)) => return None,
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_url_carries_model() {
        let connector = WebSocketConnector::openai("gpt-4o-mini-realtime-preview-2024-12-17", "sk-test");
        assert_eq!(
            connector.url(),
            "wss://api.openai.com/v1/realtime?model=gpt-4o-mini-realtime-preview-2024-12-17"
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport_error() {
        let connector = WebSocketConnector::new("ws://127.0.0.1:1/", "k");
        let err = match connector.connect().await {
            Ok(_) => panic!("connect to a closed port should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
