//! WebSocket stream connector

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use streamgate_types::Record;

use crate::error::{ConnectorError, Result};
use crate::traits::{ConnectorState, StreamConnector};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Endpoint, `ws://` or `wss://`
    pub url: String,
    /// Extra request headers sent with the handshake
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Maximum idle time before the socket is presumed dead
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

/// Bidirectional persistent connection producing one record per inbound
/// message.
///
/// Undecodable frames become `{error, raw}` sentinel records — a bad frame
/// never ends the stream. Pings are answered; a Close frame or the end of
/// the stream surfaces as closure.
pub struct WebSocketConnector {
    config: WebSocketConfig,
    stream: Option<WsStream>,
    state: ConnectorState,
}

impl WebSocketConnector {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            stream: None,
            state: ConnectorState::Created,
        }
    }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&mut self) -> Result<()> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| {
                ConnectorError::Connection(format!(
                    "invalid websocket endpoint {}: {e}",
                    self.config.url
                ))
            })?;
        for (name, value) in &self.config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConnectorError::Configuration(format!("invalid header name {name}: {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                ConnectorError::Configuration(format!("invalid header value for {name}: {e}"))
            })?;
            request.headers_mut().insert(header_name, header_value);
        }

        let (stream, _response) = connect_async(request).await.map_err(|e| {
            ConnectorError::Connection(format!(
                "websocket connect to {} failed: {e}",
                self.config.url
            ))
        })?;
        info!(url = %self.config.url, "connected to websocket");
        self.stream = Some(stream);
        self.state = ConnectorState::Connected;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        if self.stream.is_none() {
            return Err(ConnectorError::NotConnected);
        }
        self.state = ConnectorState::Reading;
        let idle = self.config.idle_timeout_secs.map(Duration::from_secs);
        let stream = self.stream.as_mut().ok_or(ConnectorError::NotConnected)?;

        loop {
            let next = match idle {
                Some(limit) => tokio::time::timeout(limit, stream.next())
                    .await
                    .map_err(|_| {
                        ConnectorError::Transport(format!(
                            "no message within idle window of {}s",
                            limit.as_secs()
                        ))
                    })?,
                None => stream.next().await,
            };
            match next {
                None => return Err(ConnectorError::StreamEnded),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => return Ok(decode_frame(&text)),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(decode_frame(&String::from_utf8_lossy(&data)))
                }
                Some(Ok(Message::Ping(payload))) => {
                    stream.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "websocket close frame received");
                    return Err(ConnectorError::StreamEnded);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close(None).await {
                debug!(error = %e, "websocket close handshake failed");
            }
            info!("websocket connection closed");
        }
        self.state = ConnectorState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectorState {
        self.state
    }
}

/// Decodes one frame, surfacing failures as `{error, raw}` records.
fn decode_frame(raw: &str) -> Record {
    match Record::parse(raw) {
        Ok(record) => record,
        Err(e) => {
            warn!(error = %e, "undecodable websocket frame");
            Record::from_error_raw(e, raw)
        }
    }
}
