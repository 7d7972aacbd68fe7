//! Concurrent connector lifecycle manager

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use streamgate_types::Record;

use crate::error::{ConnectorError, Result};
use crate::traits::StreamConnector;

/// Callback receiving each record a connector produces.
///
/// Invoked once per decoded record, in production order. It must not block
/// the connector's loop for long — hand heavy work to another task or queue.
pub type RecordCallback = Arc<dyn Fn(Record) + Send + Sync>;

struct ManagedConnector {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns named, independently running connectors and dispatches each incoming
/// record to that connector's callback.
///
/// Every connector runs its own spawned read loop, so one stalled or failing
/// transport never starves the others. A loop ends on cancellation, stream
/// end, or a terminal transport error, and closes its connector on every
/// exit path. Records from a single connector reach its callback in
/// production order; nothing is guaranteed across connectors.
#[derive(Default)]
pub struct StreamManager {
    registry: Mutex<HashMap<String, ManagedConnector>>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects and registers a named connector, then starts its read loop.
    ///
    /// Fails if the name is already registered or if `connect()` fails; a
    /// connector that fails to connect is never registered. The registry
    /// check, connect, and insert run under one lock, so two concurrent adds
    /// of the same name cannot both win.
    pub async fn add_connector(
        &self,
        name: impl Into<String>,
        mut connector: Box<dyn StreamConnector>,
        callback: RecordCallback,
    ) -> Result<()> {
        let name = name.into();
        let mut registry = self.registry.lock().await;
        if registry.contains_key(&name) {
            return Err(ConnectorError::DuplicateConnector(name));
        }
        connector.connect().await?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(read_loop(
            name.clone(),
            connector,
            callback,
            cancel.clone(),
        ));
        registry.insert(name.clone(), ManagedConnector { cancel, task });
        info!(connector = %name, "connector registered");
        Ok(())
    }

    /// Stops and forgets a connector; unknown names are a no-op.
    ///
    /// Returns once the read loop has observed cancellation and closed its
    /// transport.
    pub async fn remove_connector(&self, name: &str) {
        let handle = self.registry.lock().await.remove(name);
        if let Some(handle) = handle {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                warn!(connector = name, error = %e, "read loop task failed to join");
            }
            debug!(connector = name, "connector removed");
        }
    }

    /// Removes every registered connector; afterwards no read loop remains.
    pub async fn close_all(&self) {
        let drained: Vec<(String, ManagedConnector)> =
            self.registry.lock().await.drain().collect();
        for (name, handle) in drained {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                warn!(connector = %name, error = %e, "read loop task failed to join");
            }
        }
        info!("all connectors closed");
    }

    /// Names of the currently registered connectors.
    pub async fn names(&self) -> Vec<String> {
        self.registry.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }
}

/// One connector's pump: read until cancellation, stream end, or a terminal
/// error, then close the transport.
async fn read_loop(
    name: String,
    mut connector: Box<dyn StreamConnector>,
    callback: RecordCallback,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(connector = %name, "read loop cancelled");
                break;
            }
            result = connector.read() => match result {
                Ok(record) => callback(record),
                Err(ConnectorError::StreamEnded) => {
                    info!(connector = %name, "stream ended");
                    break;
                }
                Err(e) => {
                    error!(connector = %name, error = %e, "read loop terminated");
                    break;
                }
            }
        }
    }
    if let Err(e) = connector.close().await {
        warn!(connector = %name, error = %e, "close failed");
    }
}
