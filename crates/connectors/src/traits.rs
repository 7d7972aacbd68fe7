//! The stream connector contract

use async_trait::async_trait;
use streamgate_types::Record;

use crate::error::Result;

/// Lifecycle of a connector.
///
/// `Reading -> Closed` happens on any unrecoverable error or explicit stop.
/// There is no reconnecting state — observe closure and start a fresh
/// connector with the same configuration instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Created,
    Connected,
    Reading,
    Closed,
}

impl ConnectorState {
    /// State name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connected => "connected",
            Self::Reading => "reading",
            Self::Closed => "closed",
        }
    }
}

/// A transport-specific adapter exposing connect/read/close.
///
/// `connect` establishes the transport and fails fast when the target is
/// unreachable. `read` suspends the calling task until exactly one record is
/// available, or fails if the transport is unusable. `close` is idempotent
/// and releases the transport resource on every path, including after a
/// failed `read`.
///
/// Callers never branch on the concrete variant; the factory selects it from
/// a configuration tag.
#[async_trait]
pub trait StreamConnector: Send {
    async fn connect(&mut self) -> Result<()>;

    async fn read(&mut self) -> Result<Record>;

    async fn close(&mut self) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> ConnectorState;
}
