//! Manager lifecycle scenarios with scripted in-memory connectors

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use connectors::{
    ConnectorError, ConnectorState, RecordBuffer, Result, StreamConnector, StreamManager,
};
use streamgate_types::Record;

/// Emits a fixed script of records, then ends its stream.
struct ScriptedConnector {
    records: VecDeque<Record>,
    read_delay: Duration,
    fail_connect: bool,
    hang: bool,
    close_count: Arc<AtomicUsize>,
    state: ConnectorState,
}

impl ScriptedConnector {
    fn new(values: &[serde_json::Value], close_count: Arc<AtomicUsize>) -> Self {
        Self {
            records: values
                .iter()
                .map(|value| Record::from_object(value.as_object().unwrap().clone()))
                .collect(),
            read_delay: Duration::from_millis(5),
            fail_connect: false,
            hang: false,
            close_count,
            state: ConnectorState::Created,
        }
    }

    fn failing(close_count: Arc<AtomicUsize>) -> Self {
        let mut connector = Self::new(&[], close_count);
        connector.fail_connect = true;
        connector
    }

    fn hanging(close_count: Arc<AtomicUsize>) -> Self {
        let mut connector = Self::new(&[], close_count);
        connector.hang = true;
        connector
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(&mut self) -> Result<()> {
        if self.fail_connect {
            return Err(ConnectorError::Connection(
                "scripted connect failure".to_string(),
            ));
        }
        self.state = ConnectorState::Connected;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        self.state = ConnectorState::Reading;
        if self.hang {
            futures::future::pending::<()>().await;
        }
        tokio::time::sleep(self.read_delay).await;
        self.records.pop_front().ok_or(ConnectorError::StreamEnded)
    }

    async fn close(&mut self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.state = ConnectorState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectorState {
        self.state
    }
}

async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn records_from_two_connectors_interleave_with_per_connector_order() {
    let manager = StreamManager::new();
    let buffer = Arc::new(RecordBuffer::new(100));
    let closes_a = Arc::new(AtomicUsize::new(0));
    let closes_b = Arc::new(AtomicUsize::new(0));

    let a = ScriptedConnector::new(
        &[json!({"src": "a", "v": 1}), json!({"src": "a", "v": 2})],
        closes_a.clone(),
    );
    let b = ScriptedConnector::new(&[json!({"src": "b", "v": 10})], closes_b.clone());

    manager
        .add_connector("a", Box::new(a), buffer.callback())
        .await
        .unwrap();
    manager
        .add_connector("b", Box::new(b), buffer.callback())
        .await
        .unwrap();

    // both loops end naturally once their scripts run out
    let buffer_probe = buffer.clone();
    assert!(wait_until(Duration::from_secs(2), move || buffer_probe.len() == 3).await);
    manager.close_all().await;

    let records = buffer.snapshot();
    assert_eq!(records.len(), 3);

    let a_values: Vec<f64> = records
        .iter()
        .filter(|r| r.get("src") == Some(&json!("a")))
        .filter_map(|r| r.number("v"))
        .collect();
    assert_eq!(a_values, vec![1.0, 2.0]);
    assert_eq!(
        records
            .iter()
            .filter(|r| r.get("src") == Some(&json!("b")))
            .count(),
        1
    );

    // each transport released exactly once
    assert_eq!(closes_a.load(Ordering::SeqCst), 1);
    assert_eq!(closes_b.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let manager = StreamManager::new();
    let buffer = Arc::new(RecordBuffer::new(10));
    let closes = Arc::new(AtomicUsize::new(0));

    manager
        .add_connector(
            "events",
            Box::new(ScriptedConnector::hanging(closes.clone())),
            buffer.callback(),
        )
        .await
        .unwrap();

    let err = manager
        .add_connector(
            "events",
            Box::new(ScriptedConnector::hanging(closes.clone())),
            buffer.callback(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::DuplicateConnector(_)));
    assert_eq!(manager.len().await, 1);

    manager.close_all().await;
}

#[tokio::test]
async fn removing_an_unknown_name_is_a_no_op() {
    let manager = StreamManager::new();
    manager.remove_connector("missing").await;
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn failed_connect_never_registers() {
    let manager = StreamManager::new();
    let buffer = Arc::new(RecordBuffer::new(10));
    let closes = Arc::new(AtomicUsize::new(0));

    let err = manager
        .add_connector(
            "bad",
            Box::new(ScriptedConnector::failing(closes.clone())),
            buffer.callback(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::Connection(_)));
    assert!(manager.is_empty().await);
}

#[tokio::test]
async fn close_all_cancels_a_connector_that_never_yields() {
    let manager = StreamManager::new();
    let buffer = Arc::new(RecordBuffer::new(10));
    let closes = Arc::new(AtomicUsize::new(0));

    manager
        .add_connector(
            "stuck",
            Box::new(ScriptedConnector::hanging(closes.clone())),
            buffer.callback(),
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), manager.close_all())
        .await
        .expect("close_all must not hang on a blocked read");

    assert!(manager.is_empty().await);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remove_connector_waits_for_the_loop_and_closes_the_transport() {
    let manager = StreamManager::new();
    let buffer = Arc::new(RecordBuffer::new(10));
    let closes = Arc::new(AtomicUsize::new(0));

    manager
        .add_connector(
            "stuck",
            Box::new(ScriptedConnector::hanging(closes.clone())),
            buffer.callback(),
        )
        .await
        .unwrap();
    assert_eq!(manager.names().await, vec!["stuck".to_string()]);

    manager.remove_connector("stuck").await;
    assert!(manager.is_empty().await);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    // removing again is harmless
    manager.remove_connector("stuck").await;
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_connector_failing_does_not_stop_another() {
    let manager = StreamManager::new();
    let buffer = Arc::new(RecordBuffer::new(100));
    let closes = Arc::new(AtomicUsize::new(0));

    // ends almost immediately
    let short = ScriptedConnector::new(&[json!({"src": "short", "v": 1})], closes.clone());
    // keeps producing long after the other stream died
    let values: Vec<serde_json::Value> =
        (0..20).map(|v| json!({"src": "long", "v": v})).collect();
    let long = ScriptedConnector::new(&values, closes.clone());

    manager
        .add_connector("short", Box::new(short), buffer.callback())
        .await
        .unwrap();
    manager
        .add_connector("long", Box::new(long), buffer.callback())
        .await
        .unwrap();

    let buffer_probe = buffer.clone();
    assert!(wait_until(Duration::from_secs(3), move || buffer_probe.len() == 21).await);
    manager.close_all().await;
    assert_eq!(closes.load(Ordering::SeqCst), 2);
}
