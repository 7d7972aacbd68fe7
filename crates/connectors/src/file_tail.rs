//! File-tail connector for newline-delimited JSON logs

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info};

use streamgate_types::Record;

use crate::error::{ConnectorError, Result};
use crate::traits::{ConnectorState, StreamConnector};

/// File-tail connector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FileTailConfig {
    pub path: PathBuf,
    /// Start at end-of-file instead of replaying existing content
    #[serde(default = "default_tail")]
    pub tail: bool,
    /// Seconds between growth checks when no new line is available
    #[serde(default = "default_poll_interval")]
    pub interval_secs: f64,
}

fn default_tail() -> bool {
    true
}

fn default_poll_interval() -> f64 {
    0.1
}

/// Tails a growing NDJSON file, one record per line.
///
/// A line is only consumed once its newline has arrived; a partially written
/// tail line stays buffered until the writer completes it. Undecodable lines
/// are skipped.
pub struct FileTailConnector {
    config: FileTailConfig,
    reader: Option<BufReader<File>>,
    partial: String,
    state: ConnectorState,
}

impl FileTailConnector {
    pub fn new(config: FileTailConfig) -> Self {
        Self {
            config,
            reader: None,
            partial: String::new(),
            state: ConnectorState::Created,
        }
    }
}

#[async_trait]
impl StreamConnector for FileTailConnector {
    async fn connect(&mut self) -> Result<()> {
        let mut file = File::open(&self.config.path).await.map_err(|e| {
            ConnectorError::Connection(format!(
                "cannot open {}: {e}",
                self.config.path.display()
            ))
        })?;
        if self.config.tail {
            file.seek(SeekFrom::End(0)).await?;
        }
        self.reader = Some(BufReader::new(file));
        info!(
            path = %self.config.path.display(),
            tail = self.config.tail,
            "opened file stream"
        );
        self.state = ConnectorState::Connected;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        if self.reader.is_none() {
            return Err(ConnectorError::NotConnected);
        }
        self.state = ConnectorState::Reading;
        let interval = Duration::from_secs_f64(self.config.interval_secs);

        loop {
            let reader = self.reader.as_mut().ok_or(ConnectorError::NotConnected)?;
            let mut chunk = String::new();
            let bytes = reader.read_line(&mut chunk).await?;
            if bytes == 0 {
                // no new data; wait for the file to grow
                tokio::time::sleep(interval).await;
                continue;
            }
            self.partial.push_str(&chunk);
            if !self.partial.ends_with('\n') {
                // writer is mid-line
                continue;
            }
            let line = std::mem::take(&mut self.partial);
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match Record::parse(line) {
                Ok(record) => return Ok(record),
                Err(e) => debug!(error = %e, "skipping undecodable line"),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            info!(path = %self.config.path.display(), "file stream closed");
        }
        self.partial.clear();
        self.state = ConnectorState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectorState {
        self.state
    }
}
