//! Side-index writer.
//!
//! Consumes feed messages and mirrors them into the cache store so that the
//! children of a deleted parent can be recovered later. Deleted assets are
//! removed, everything else is upserted under its parent's email.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use crate::adapters::{normalize_parent_key, CacheRecord, CacheStore};
use crate::domain::{FeedMessage, InboundMessage};

use super::gate;
use super::outcome::{Outcome, PipelineError};

/// What the sink did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    Upserted,
    Deleted,
}

/// Result of one sink invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheWrite {
    pub name: String,
    pub action: CacheAction,
    /// False when a later event already owns the row
    pub applied: bool,
}

/// Handler for feed messages destined to the side-index
pub struct CacheSink {
    cache: Result<Arc<dyn CacheStore>, String>,
    retry_timeout_seconds: i64,
}

impl CacheSink {
    pub fn new(cache: Result<Arc<dyn CacheStore>, String>, retry_timeout_seconds: i64) -> Self {
        Self {
            cache,
            retry_timeout_seconds,
        }
    }

    #[instrument(skip_all, fields(event_id = %message.event_id))]
    pub async fn handle(&self, message: &InboundMessage) -> Outcome<CacheWrite> {
        self.handle_at(message, Utc::now()).await
    }

    pub async fn handle_at(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome<CacheWrite> {
        let outcome = self.run(message, now).await;
        log_write(&message.event_id, &outcome);
        outcome
    }

    async fn run(&self, message: &InboundMessage, now: DateTime<Utc>) -> Outcome<CacheWrite> {
        let timeout = self.retry_timeout_seconds;
        let init_error = self.cache.as_ref().err().map(String::as_str);

        if let Some(rejected) =
            gate::admit(message.timestamp, timeout, init_error, now).rejection(timeout)
        {
            return rejected;
        }
        let cache = match &self.cache {
            Ok(cache) => cache,
            Err(reason) => return Outcome::retryable(PipelineError::InitFailed(reason.clone()), None),
        };

        let feed: FeedMessage<serde_json::Value> = match serde_json::from_slice(&message.data) {
            Ok(feed) => feed,
            Err(e) => {
                error!(error = %e, "Failed to decode feed message");
                return Outcome::malformed(e);
            }
        };
        if feed.asset.name.is_empty() {
            return Outcome::malformed("asset name is empty");
        }

        let name = feed.asset.name.clone();
        let start_time = feed.window.start_time;

        if feed.deleted {
            return match cache.delete(&name, start_time).await {
                Ok(applied) => {
                    info!(%name, applied, "Removed from cache");
                    Outcome::Succeeded(CacheWrite {
                        name,
                        action: CacheAction::Deleted,
                        applied,
                    })
                }
                Err(e) => Outcome::retryable(e, None),
            };
        }

        let parent_key = feed
            .asset
            .resource
            .get("groupEmail")
            .and_then(|v| v.as_str())
            .filter(|email| !email.is_empty())
            .map(normalize_parent_key);

        let data = match serde_json::to_string(&feed) {
            Ok(data) => data,
            Err(e) => return Outcome::malformed(e),
        };

        let record = CacheRecord {
            name: name.clone(),
            asset_type: feed.asset.asset_type.clone(),
            parent_key,
            data,
            start_time,
            cached_at: now,
        };

        match cache.upsert(record).await {
            Ok(applied) => {
                debug!(%name, applied, "Written to cache");
                Outcome::Succeeded(CacheWrite {
                    name,
                    action: CacheAction::Upserted,
                    applied,
                })
            }
            Err(e) => Outcome::retryable(e, None),
        }
    }
}

fn log_write(event_id: &str, outcome: &Outcome<CacheWrite>) {
    let verdict = outcome.verdict();
    match outcome {
        Outcome::Succeeded(write) => {
            info!(
                %event_id,
                %verdict,
                name = %write.name,
                action = ?write.action,
                applied = write.applied,
                "Invocation finished"
            );
        }
        Outcome::DroppedPermanently(reason) => {
            info!(%event_id, %verdict, %reason, "Invocation finished");
        }
        Outcome::RetryableFailure { cause, .. } => {
            error!(%event_id, %verdict, error = %cause, "Invocation finished");
        }
    }
}
