//! Tails an NDJSON file through the stream manager and prints the buffered
//! records.
//!
//! Usage: `cargo run --example tail_file -- path/to/events.ndjson`

use std::sync::Arc;
use std::time::Duration;

use connectors::{create_connector, RecordBuffer, StreamManager};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "events.ndjson".to_string());

    let connector = create_connector("file", json!({"path": path, "tail": false}))?;
    let buffer = Arc::new(RecordBuffer::new(1024));

    let manager = StreamManager::new();
    manager
        .add_connector("events", connector, buffer.callback())
        .await?;

    // give the tail loop a moment to replay the file
    tokio::time::sleep(Duration::from_secs(1)).await;
    manager.close_all().await;

    for record in buffer.snapshot() {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
