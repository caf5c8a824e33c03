//! Per-process pipeline settings, read once from the resolved config.

use crate::config::ResolvedConfig;

use super::enumerator::RecordErrorPolicy;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Events older than this are acknowledged without work
    pub retry_timeout_seconds: i64,
    /// Records requested per directory or cache page
    pub page_size: u32,
    pub record_error_policy: RecordErrorPolicy,
    /// Progress log cadence of the publisher
    pub log_every: u64,
    pub member_topic: String,
    pub group_topic: String,
    pub group_query_topic: String,
    pub customer_id: String,
}

impl From<&ResolvedConfig> for PipelineSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            retry_timeout_seconds: config.service.retry_timeout_seconds,
            page_size: config.directory.max_results_per_page,
            record_error_policy: config.directory.record_error_policy,
            log_every: config.service.log_event_every_x_msg,
            member_topic: config.pubsub.member_topic.clone(),
            group_topic: config.pubsub.group_topic.clone(),
            group_query_topic: config.pubsub.group_query_topic.clone(),
            customer_id: config.directory.customer_id.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let directory = crate::config::DirectorySettings::default();
        let pubsub = crate::config::PubSubSettings::default();
        let service = crate::config::ServiceSettings::default();
        Self {
            retry_timeout_seconds: service.retry_timeout_seconds,
            page_size: directory.max_results_per_page,
            record_error_policy: directory.record_error_policy,
            log_every: service.log_event_every_x_msg,
            member_topic: pubsub.member_topic,
            group_topic: pubsub.group_topic,
            group_query_topic: pubsub.group_query_topic,
            customer_id: directory.customer_id,
        }
    }
}
