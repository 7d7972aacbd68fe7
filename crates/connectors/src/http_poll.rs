//! HTTP polling connector

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use streamgate_types::Record;

use crate::error::{ConnectorError, Result};
use crate::traits::{ConnectorState, StreamConnector};

/// HTTP polling connector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpPollConfig {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Seconds between polls
    #[serde(default = "default_interval")]
    pub interval_secs: f64,
}

fn default_interval() -> f64 {
    1.0
}

/// Request/poll connector: one GET per `read()`, the decoded body as the
/// record.
///
/// Transport and decode failures yield `{error}` sentinel records after the
/// same interval sleep — a single bad poll never ends the caller's loop.
pub struct HttpPollConnector {
    config: HttpPollConfig,
    client: Option<reqwest::Client>,
    state: ConnectorState,
}

impl HttpPollConnector {
    pub fn new(config: HttpPollConfig) -> Self {
        Self {
            config,
            client: None,
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
        Ok(headers)
    }

    async fn poll_once(&self, client: &reqwest::Client) -> Record {
        let response = match client.get(&self.config.url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.config.url, error = %e, "http poll failed");
                return Record::from_error(e);
            }
        };
        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.config.url, error = %e, "http poll rejected");
                return Record::from_error(e);
            }
        };
        match response.json::<Value>().await {
            Ok(body) => match Record::from_value(body) {
                Ok(record) => record,
                Err(e) => {
                    warn!(url = %self.config.url, error = %e, "http poll body was not an object");
                    Record::from_error(e)
                }
            },
            Err(e) => {
                warn!(url = %self.config.url, error = %e, "http poll body was not JSON");
                Record::from_error(e)
            }
        }
    }
}

#[async_trait]
impl StreamConnector for HttpPollConnector {
    async fn connect(&mut self) -> Result<()> {
        let headers = self.header_map()?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectorError::Connection(format!("http client build failed: {e}")))?;
        self.client = Some(client);
        info!(url = %self.config.url, interval_secs = self.config.interval_secs, "http polling initialized");
        self.state = ConnectorState::Connected;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        let client = self.client.clone().ok_or(ConnectorError::NotConnected)?;
        self.state = ConnectorState::Reading;
        let record = self.poll_once(&client).await;
        tokio::time::sleep(Duration::from_secs_f64(self.config.interval_secs)).await;
        Ok(record)
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            info!("http session closed");
        }
        self.state = ConnectorState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectorState {
        self.state
    }
}
