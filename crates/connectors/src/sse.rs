//! Server-sent-events stream connector

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde::Deserialize;
use tracing::{debug, info};

use streamgate_types::Record;

use crate::error::{ConnectorError, Result};
use crate::traits::{ConnectorState, StreamConnector};

const DATA_PREFIX: &str = "data: ";

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// SSE connector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SseConfig {
    pub url: String,
    /// Extra request headers; `Accept: text/event-stream` is always set
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Maximum idle time before the stream is presumed dead
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

/// Chunked-text-push connector for `data: <json>` framed event streams.
///
/// `read()` scans accumulated lines for the data prefix and decodes the
/// remainder; undecodable payloads are skipped silently, other lines are
/// ignored, and the end of the HTTP stream surfaces as closure.
pub struct SseConnector {
    config: SseConfig,
    stream: Option<ByteStream>,
    pending: Vec<u8>,
    lines: VecDeque<String>,
    state: ConnectorState,
}

impl SseConnector {
    pub fn new(config: SseConfig) -> Self {
        Self {
            config,
            stream: None,
            pending: Vec::new(),
            lines: VecDeque::new(),
            state: ConnectorState::Created,
        }
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ConnectorError::Configuration(format!("invalid header name {name}: {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                ConnectorError::Configuration(format!("invalid header value for {name}: {e}"))
            })?;
            headers.insert(header_name, header_value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        Ok(headers)
    }

    /// Splits completed lines out of the accumulated byte buffer.
    fn buffer_chunk(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        while let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=position).collect();
            self.lines
                .push_back(String::from_utf8_lossy(&line).trim().to_string());
        }
    }

    /// Next decodable event among the buffered lines, if any.
    fn next_event(&mut self) -> Option<Record> {
        while let Some(line) = self.lines.pop_front() {
            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            match Record::parse(payload) {
                Ok(record) => return Some(record),
                Err(e) => debug!(error = %e, "undecodable event payload, skipping"),
            }
        }
        None
    }
}

#[async_trait]
impl StreamConnector for SseConnector {
    async fn connect(&mut self) -> Result<()> {
        let headers = self.header_map()?;
        let client = reqwest::Client::new();
        let response = client
            .get(&self.config.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                ConnectorError::Connection(format!(
                    "sse connect to {} failed: {e}",
                    self.config.url
                ))
            })?
            .error_for_status()
            .map_err(|e| {
                ConnectorError::Connection(format!(
                    "sse endpoint {} rejected the stream: {e}",
                    self.config.url
                ))
            })?;
        self.stream = Some(Box::pin(response.bytes_stream()));
        info!(url = %self.config.url, "connected to sse stream");
        self.state = ConnectorState::Connected;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        if self.stream.is_none() {
            return Err(ConnectorError::NotConnected);
        }
        self.state = ConnectorState::Reading;
        let idle = self
            .config
            .idle_timeout_secs
            .map(std::time::Duration::from_secs);
        loop {
            if let Some(record) = self.next_event() {
                return Ok(record);
            }
            let chunk = {
                let stream = self.stream.as_mut().ok_or(ConnectorError::NotConnected)?;
                match idle {
                    Some(limit) => tokio::time::timeout(limit, stream.next())
                        .await
                        .map_err(|_| {
                            ConnectorError::Transport(format!(
                                "no event within idle window of {}s",
                                limit.as_secs()
                            ))
                        })?,
                    None => stream.next().await,
                }
            };
            match chunk {
                None => return Err(ConnectorError::StreamEnded),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(bytes)) => self.buffer_chunk(&bytes),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            info!("sse connection closed");
        }
        self.pending.clear();
        self.lines.clear();
        self.state = ConnectorState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectorState {
        self.state
    }
}
