//! Fan-out publisher.
//!
//! Every publish is dispatched as its own task and never awaited inline, so
//! page N+1 can be fetched while page N is still being delivered. Each task
//! bumps exactly one of two shared counters when it finishes; `await_all`
//! is the join barrier that makes the final tally exact.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, Instrument, Span};

use crate::adapters::{MessageBus, OutboundMessage, IDEMPOTENCY_KEY_ATTRIBUTE};
use crate::domain::{FeedMessage, PublishTally};

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PublishTally {
        PublishTally::new(
            self.published.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
        )
    }
}

/// Dispatches messages to one topic and tallies their completion
pub struct FanoutPublisher {
    bus: Arc<dyn MessageBus>,
    topic: String,
    /// Log progress every N successful publishes, 0 disables
    log_every: u64,
    counters: Arc<Counters>,
    in_flight: JoinSet<()>,
}

impl FanoutPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, topic: impl Into<String>, log_every: u64) -> Self {
        Self {
            bus,
            topic: topic.into(),
            log_every,
            counters: Arc::new(Counters::default()),
            in_flight: JoinSet::new(),
        }
    }

    /// Serialize a feed message and dispatch it with its idempotency key
    ///
    /// A message that cannot be serialized counts as failed.
    pub fn publish<R: Serialize>(&mut self, message: &FeedMessage<R>) {
        let name = message.asset.name.clone();
        match serde_json::to_vec(message) {
            Ok(data) => {
                let outbound = OutboundMessage::new(data)
                    .with_attribute(IDEMPOTENCY_KEY_ATTRIBUTE, message.idempotency_key());
                self.publish_raw(name, outbound);
            }
            Err(e) => {
                error!(name = %name, error = %e, "Failed to serialize feed message");
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Dispatch an already encoded message; `label` is only used for logs
    pub fn publish_raw(&mut self, label: impl Into<String>, message: OutboundMessage) {
        let bus = Arc::clone(&self.bus);
        let counters = Arc::clone(&self.counters);
        let topic = self.topic.clone();
        let label = label.into();
        let log_every = self.log_every;

        self.in_flight.spawn(
            async move {
                match bus.publish(&topic, message).await {
                    Ok(message_id) => {
                        let published = counters.published.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(%label, %message_id, "Published");
                        if log_every > 0 && published % log_every == 0 {
                            info!(%topic, published, "Publish progress");
                        }
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                        error!(%label, %topic, error = %e, "Publish failed");
                    }
                }
            }
            .instrument(Span::current()),
        );
    }

    /// Messages dispatched but not yet completed
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for every dispatched publish and return the final counts
    ///
    /// A task that panicked or was cancelled counts as failed.
    pub async fn await_all(mut self) -> PublishTally {
        while let Some(joined) = self.in_flight.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Publish task did not complete");
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PublishError;
    use crate::domain::{Asset, Window};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingBus {
        sent: Mutex<Vec<(String, OutboundMessage)>>,
    }

    #[async_trait]
    impl MessageBus for RecordingBus {
        async fn publish(
            &self,
            topic: &str,
            message: OutboundMessage,
        ) -> Result<String, PublishError> {
            let body = String::from_utf8_lossy(&message.data).to_string();
            if body.contains("poison") {
                return Err(PublishError::Rejected("poison".to_string()));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((topic.to_string(), message));
            Ok(format!("id-{}", sent.len()))
        }
    }

    fn message(name: &str) -> FeedMessage<serde_json::Value> {
        FeedMessage {
            asset: Asset {
                name: name.to_string(),
                asset_type: "t".to_string(),
                ancestors: vec![],
                ancestry_path: String::new(),
                resource: serde_json::json!({}),
            },
            window: Window {
                start_time: Utc::now(),
            },
            deleted: false,
            origin: String::new(),
        }
    }

    #[tokio::test]
    async fn test_tally_counts_every_dispatch() {
        let bus = Arc::new(RecordingBus::default());
        let mut publisher = FanoutPublisher::new(bus.clone(), "topic-a", 2);

        for i in 0..5 {
            publisher.publish(&message(&format!("asset-{}", i)));
        }
        publisher.publish(&message("poison"));

        let tally = publisher.await_all().await;
        assert_eq!(tally, PublishTally::new(5, 1));
        assert_eq!(tally.total(), 6);

        let sent = bus.sent.lock().unwrap();
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().all(|(topic, _)| topic == "topic-a"));
    }

    #[tokio::test]
    async fn test_idempotency_attribute_attached() {
        let bus = Arc::new(RecordingBus::default());
        let mut publisher = FanoutPublisher::new(bus.clone(), "topic-a", 0);

        let msg = message("asset-1");
        publisher.publish(&msg);
        publisher.await_all().await;

        let sent = bus.sent.lock().unwrap();
        assert_eq!(
            sent[0].1.attributes.get(IDEMPOTENCY_KEY_ATTRIBUTE),
            Some(&msg.idempotency_key())
        );
    }

    #[tokio::test]
    async fn test_empty_publisher() {
        let publisher = FanoutPublisher::new(Arc::new(RecordingBus::default()), "t", 10);
        assert_eq!(publisher.pending(), 0);
        assert_eq!(publisher.await_all().await, PublishTally::default());
    }
}
