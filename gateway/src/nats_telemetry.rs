//! NATS Event Publisher
//!
//! Forwards mount LogEvents to NATS subjects:
//! - mount.events.{kind} - e.g. mount.events.slew_start, mount.events.fault
//!
//! Without a NATS server the publisher runs offline and drains the queue.

use anyhow::Result;
use async_nats::Client;
use mount_control::{EventSink, LogEvent};
use tokio::sync::mpsc;

const NATS_DEFAULT_URL: &str = "nats://127.0.0.1:18020";
const SUBJECT_PREFIX: &str = "mount.events";
const QUEUE_CAPACITY: usize = 1000;

pub fn subject_for(event: &LogEvent) -> String {
    format!("{}.{}", SUBJECT_PREFIX, event.kind)
}

/// EventSink half: enqueues without blocking the coordinator
#[derive(Clone)]
pub struct NatsEventSink {
    tx: mpsc::Sender<LogEvent>,
}

impl EventSink for NatsEventSink {
    fn record(&self, event: LogEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::debug!("NATS event queue rejected event: {}", e);
        }
    }
}

/// Publishing half: owns the connection (if any) and the queue
pub struct NatsPublisher {
    client: Option<Client>,
    rx: mpsc::Receiver<LogEvent>,
}

impl NatsEventSink {
    /// Connect to `$NATS_URL` (or the default); falls back to offline mode
    pub async fn connect() -> (Self, NatsPublisher) {
        let nats_url = std::env::var("NATS_URL").unwrap_or_else(|_| NATS_DEFAULT_URL.to_string());

        let client = match async_nats::connect(&nats_url).await {
            Ok(client) => {
                tracing::info!("Connected to NATS at {}", nats_url);
                Some(client)
            }
            Err(e) => {
                tracing::warn!("NATS not available: {} (events will not be published)", e);
                None
            }
        };

        Self::with_client(client)
    }

    pub fn with_client(client: Option<Client>) -> (Self, NatsPublisher) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, NatsPublisher { client, rx })
    }
}

impl NatsPublisher {
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Publish until every sink handle is dropped. Returns the number of
    /// events taken off the queue.
    pub async fn run(mut self) -> Result<u64> {
        let mut handled = 0u64;
        match self.client.take() {
            Some(client) => {
                while let Some(event) = self.rx.recv().await {
                    handled += 1;
                    let subject = subject_for(&event);
                    let payload = serde_json::to_vec(&event)?;
                    if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                        tracing::error!("Failed to publish to {}: {}", subject, e);
                    }
                }
                client.flush().await?;
            }
            None => {
                tracing::info!("Running in offline mode (NATS not connected)");
                while self.rx.recv().await.is_some() {
                    handled += 1;
                }
            }
        }
        tracing::debug!(handled, "NATS publisher stopped");
        Ok(handled)
    }
}
