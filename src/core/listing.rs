//! Scheduled group traversal.
//!
//! A scheduler message (payload starting with `cron schedule`) fans out into
//! one query per directory domain and email prefix, published to the query
//! topic. Each query message then lists the matching groups and publishes
//! one feed message per group. Group events produced here feed the member
//! fan-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::adapters::{ListRequest, OutboundMessage};
use crate::domain::{Group, InboundMessage, PublishTally};

use super::clients::Clients;
use super::coordinator::log_tally_outcome;
use super::enumerator::LivePager;
use super::gate;
use super::outcome::{Outcome, PipelineError};
use super::publisher::FanoutPublisher;
use super::settings::PipelineSettings;
use super::transform::group_feed_message;

/// Payload prefix of scheduler-triggered messages
pub const CRON_TRIGGER_PREFIX: &str = "cron schedule";

/// One slice of the directory to list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupQuery {
    pub domain: String,
    pub email_prefix: String,
}

impl GroupQuery {
    /// Directory search expression; matching is case-insensitive upstream
    pub fn search(&self) -> String {
        format!("email:{}*", self.email_prefix)
    }
}

/// Prefixes covering every group email: digits then lowercase letters
pub fn email_prefixes() -> Vec<String> {
    ('0'..='9').chain('a'..='z').map(String::from).collect()
}

/// Handler for scheduler and group-query messages
pub struct GroupListing {
    clients: Result<Clients, String>,
    settings: PipelineSettings,
}

impl GroupListing {
    pub fn new(clients: Result<Clients, String>, settings: PipelineSettings) -> Self {
        Self { clients, settings }
    }

    #[instrument(skip_all, fields(event_id = %message.event_id))]
    pub async fn handle(&self, message: &InboundMessage) -> Outcome<PublishTally> {
        self.handle_at(message, Utc::now()).await
    }

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

        if message.data.starts_with(CRON_TRIGGER_PREFIX.as_bytes()) {
            return self.initiate_queries(clients).await;
        }

        let query: GroupQuery = match serde_json::from_slice(&message.data) {
            Ok(query) => query,
            Err(e) => {
                error!(error = %e, "Failed to decode group query payload");
                return Outcome::malformed(e);
            }
        };
        self.query_directory(clients, &query, message.timestamp).await
    }

    /// Publish one query per domain and prefix
    pub async fn initiate_queries(&self, clients: &Clients) -> Outcome<PublishTally> {
        let domains = match clients.directory.list_domains(&self.settings.customer_id).await {
            Ok(domains) => domains,
            Err(e) => return Outcome::retryable(e, None),
        };
        let prefixes = email_prefixes();
        info!(
            domains = domains.len(),
            prefixes = prefixes.len(),
            topic = %self.settings.group_query_topic,
            "Initiating group queries"
        );

        let mut publisher = FanoutPublisher::new(
            clients.bus.clone(),
            &self.settings.group_query_topic,
            self.settings.log_every,
        );
        for domain in &domains {
            for prefix in &prefixes {
                let query = GroupQuery {
                    domain: domain.clone(),
                    email_prefix: prefix.clone(),
                };
                match serde_json::to_vec(&query) {
                    Ok(data) => publisher.publish_raw(
                        format!("{}/{}", query.domain, query.email_prefix),
                        OutboundMessage::new(data),
                    ),
                    Err(e) => error!(domain = %query.domain, error = %e, "Failed to encode query"),
                }
            }
        }

        Outcome::Succeeded(publisher.await_all().await)
    }

    /// List groups matching one query and publish them
    pub async fn query_directory(
        &self,
        clients: &Clients,
        query: &GroupQuery,
        timestamp: DateTime<Utc>,
    ) -> Outcome<PublishTally> {
        let request = ListRequest::Groups {
            customer_id: self.settings.customer_id.clone(),
            domain: query.domain.clone(),
            query: query.search(),
        };
        info!(domain = %query.domain, search = %query.search(), "Listing groups");

        let mut pager: LivePager<Group> = LivePager::new(
            clients.directory.clone(),
            request,
            self.settings.page_size,
            self.settings.record_error_policy,
        );
        let mut publisher = FanoutPublisher::new(
            clients.bus.clone(),
            &self.settings.group_topic,
            self.settings.log_every,
        );

        let aborted = loop {
            match pager.next_page().await {
                Ok(Some(groups)) => {
                    for group in groups {
                        publisher.publish(&group_feed_message(
                            group,
                            &self.settings.customer_id,
                            timestamp,
                        ));
                    }
                }
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };

        let tally = publisher.await_all().await;
        info!(
            domain = %query.domain,
            pages = pager.pages_fetched(),
            listed = tally.total(),
            "Group listing finished"
        );
        if pager.parent_missing() {
            info!(domain = %query.domain, "Domain not found, no groups listed");
        } else if tally.total() == 0 && aborted.is_none() {
            info!(domain = %query.domain, prefix = %query.email_prefix, "No group found");
        }

        match aborted {
            None => Outcome::Succeeded(tally),
            Some(cause) => Outcome::retryable(cause, Some(tally)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_prefixes() {
        let prefixes = email_prefixes();
        assert_eq!(prefixes.len(), 36);
        assert_eq!(prefixes[0], "0");
        assert_eq!(prefixes[9], "9");
        assert_eq!(prefixes[10], "a");
        assert_eq!(prefixes[35], "z");
    }

    #[test]
    fn test_group_query_wire_format() {
        let query = GroupQuery {
            domain: "example.com".to_string(),
            email_prefix: "k".to_string(),
        };
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["domain"], "example.com");
        assert_eq!(json["emailPrefix"], "k");
        assert_eq!(query.search(), "email:k*");
    }
}
