//! MQTT broker-callback connector

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use streamgate_types::Record;

use crate::error::{ConnectorError, Result};
use crate::traits::{ConnectorState, StreamConnector};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// MQTT connector configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker host
    pub broker: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Topic to subscribe to
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Client id; generated when absent
    #[serde(default)]
    pub client_id: Option<String>,
    /// Capacity of the internal record queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_port() -> u16 {
    1883
}

fn default_queue_capacity() -> usize {
    256
}

/// Event-driven subscription: inbound publishes are decoded by a driver task
/// and enqueued; `read()` dequeues, blocking until an item exists.
///
/// `connect()` drives the event loop to CONNACK before returning, so an
/// unreachable broker fails fast. Undecodable payloads are logged and
/// skipped; the driver exiting closes the queue, which surfaces as closure.
pub struct MqttConnector {
    config: MqttConfig,
    client: Option<AsyncClient>,
    queue: Option<mpsc::Receiver<Record>>,
    driver: Option<JoinHandle<()>>,
    state: ConnectorState,
}

impl MqttConnector {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            client: None,
            queue: None,
            driver: None,
            state: ConnectorState::Created,
        }
    }

    fn client_id(&self) -> String {
        self.config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("streamgate-{}", Uuid::new_v4()))
    }

    /// Drives the event loop until the broker acknowledges the session.
    async fn await_connack(event_loop: &mut EventLoop) -> Result<()> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => {
                    return Err(ConnectorError::Connection(format!("mqtt connect failed: {e}")))
                }
            }
        }
    }
}

#[async_trait]
impl StreamConnector for MqttConnector {
    async fn connect(&mut self) -> Result<()> {
        let mut options = MqttOptions::new(
            self.client_id(),
            self.config.broker.as_str(),
            self.config.port,
        );
        options.set_keep_alive(KEEP_ALIVE);
        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username.as_str(), password.as_str());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 10);
        tokio::time::timeout(CONNECT_TIMEOUT, Self::await_connack(&mut event_loop))
            .await
            .map_err(|_| {
                ConnectorError::Connection(format!(
                    "mqtt connect to {}:{} timed out",
                    self.config.broker, self.config.port
                ))
            })??;
        client
            .subscribe(self.config.topic.as_str(), QoS::AtMostOnce)
            .await
            .map_err(|e| {
                ConnectorError::Connection(format!(
                    "mqtt subscribe to {} failed: {e}",
                    self.config.topic
                ))
            })?;

        let (sender, receiver) = mpsc::channel(self.config.queue_capacity);
        let topic = self.config.topic.clone();
        let driver = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match Record::parse_slice(&publish.payload) {
                            Ok(record) => {
                                if sender.send(record).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                debug!(error = %e, topic = %topic, "undecodable mqtt payload, skipping")
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        debug!(topic = %topic, "mqtt broker disconnected");
                        break;
                    }
                    Ok(_) => {}
                    Err(ConnectionError::RequestsDone) => break,
                    Err(e) => {
                        warn!(error = %e, topic = %topic, "mqtt event loop failed");
                        break;
                    }
                }
            }
        });

        info!(
            broker = %self.config.broker,
            port = self.config.port,
            topic = %self.config.topic,
            "connected to mqtt broker"
        );
        self.client = Some(client);
        self.queue = Some(receiver);
        self.driver = Some(driver);
        self.state = ConnectorState::Connected;
        Ok(())
    }

    async fn read(&mut self) -> Result<Record> {
        if self.queue.is_none() {
            return Err(ConnectorError::NotConnected);
        }
        self.state = ConnectorState::Reading;
        let queue = self.queue.as_mut().ok_or(ConnectorError::NotConnected)?;
        queue.recv().await.ok_or(ConnectorError::StreamEnded)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "mqtt disconnect failed");
            }
            info!("mqtt connection closed");
        }
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.queue = None;
        self.state = ConnectorState::Closed;
        Ok(())
    }

    fn state(&self) -> ConnectorState {
        self.state
    }
}
