//! Member fan-out coordinator.
//!
//! One invocation per "group changed" event:
//! gate -> decode -> enumerate (live or cache) -> transform -> publish -> await.
//!
//! Enumeration and publishing are interleaved page by page; the only point
//! where the invocation waits for publishes is the final join. Only gate and
//! enumeration failures are retryable. Publish failures land in the tally.

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};

use crate::domain::{FeedMessage, Group, InboundMessage, PublishTally};

use super::clients::Clients;
use super::enumerator::MemberEnumeration;
use super::gate;
use super::outcome::{Outcome, PipelineError};
use super::publisher::FanoutPublisher;
use super::settings::PipelineSettings;
use super::transform::EventContext;

/// Handler for "group changed" events
pub struct MemberFanout {
    clients: Result<Clients, String>,
    settings: PipelineSettings,
}

impl MemberFanout {
    /// `clients` carries the cold-start failure, if any
    pub fn new(clients: Result<Clients, String>, settings: PipelineSettings) -> Self {
        Self { clients, settings }
    }

    /// Process one inbound event
    #[instrument(skip_all, fields(event_id = %message.event_id))]
    pub async fn handle(&self, message: &InboundMessage) -> Outcome<PublishTally> {
        self.handle_at(message, Utc::now()).await
    }

    /// Process one inbound event against an explicit clock
    pub async fn handle_at(
        &self,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Outcome<PublishTally> {
        let outcome = self.run(message, now).await;
        log_tally_outcome(&message.event_id, &outcome);
        outcome
    }

    async fn run(&self, message: &InboundMessage, now: DateTime<Utc>) -> Outcome<PublishTally> {
        let timeout = self.settings.retry_timeout_seconds;
        let init_error = self.clients.as_ref().err().map(String::as_str);

        if let Some(rejected) =
            gate::admit(message.timestamp, timeout, init_error, now).rejection(timeout)
        {
            return rejected;
        }
        let clients = match &self.clients {
            Ok(clients) => clients,
            Err(reason) => return Outcome::retryable(PipelineError::InitFailed(reason.clone()), None),
        };

        let group: FeedMessage<Group> = match serde_json::from_slice(&message.data) {
            Ok(group) => group,
            Err(e) => {
                error!(error = %e, "Failed to decode group event payload");
                return Outcome::malformed(e);
            }
        };
        if group.asset.resource.id.is_empty() {
            error!(name = %group.asset.name, "Group event has no group id");
            return Outcome::malformed("group id is empty");
        }

        let context = EventContext::for_group(message, &group);
        let mut enumeration = MemberEnumeration::select(
            &context.parent_id,
            &context.parent_email,
            context.is_deleted,
            clients.directory.clone(),
            clients.cache.clone(),
            self.settings.page_size,
            self.settings.record_error_policy,
        );

        info!(
            group = %context.parent_name,
            email = %context.parent_email,
            deleted = context.is_deleted,
            path = ?enumeration.path(),
            "Enumerating members"
        );

        let mut publisher = FanoutPublisher::new(
            clients.bus.clone(),
            &self.settings.member_topic,
            self.settings.log_every,
        );

        let mut yielded: u64 = 0;
        let aborted = loop {
            match enumeration.next_page().await {
                Ok(Some(records)) => {
                    for record in &records {
                        publisher.publish(&context.to_feed_message(record));
                    }
                    yielded += records.len() as u64;
                }
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };

        let tally = publisher.await_all().await;
        if enumeration.skipped() > 0 {
            warn!(skipped = enumeration.skipped(), "Unreadable cached records were skipped");
        }
        if tally.total() != yielded {
            warn!(yielded, completed = tally.total(), "Tally does not cover every record");
        }

        match aborted {
            None => Outcome::Succeeded(tally),
            Some(cause) => Outcome::retryable(cause, Some(tally)),
        }
    }
}

/// Final structured log line of a fan-out invocation
pub fn log_tally_outcome(event_id: &str, outcome: &Outcome<PublishTally>) {
    let verdict = outcome.verdict();
    let tally = outcome.summary().copied().unwrap_or_default();
    let (published, failed) = (tally.messages_published, tally.messages_failed);

    match outcome {
        Outcome::Succeeded(_) => {
            info!(%event_id, %verdict, published, failed, "Invocation finished");
        }
        Outcome::DroppedPermanently(reason) => {
            info!(%event_id, %verdict, published, failed, %reason, "Invocation finished");
        }
        Outcome::RetryableFailure { cause, .. } => {
            error!(%event_id, %verdict, published, failed, error = %cause, "Invocation finished");
        }
    }
}
