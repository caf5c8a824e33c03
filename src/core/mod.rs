//! Core enumeration and fan-out logic.
//!
//! This module contains:
//! - Gate: retry horizon and cold-start checks
//! - Enumerator: live and cache pagination of a group's children
//! - Transform: child record to feed message mapping
//! - Publisher: concurrent fan-out with an exact tally
//! - Coordinator, Listing, CacheSink: the per-invocation handlers

pub mod cache_sink;
pub mod clients;
pub mod coordinator;
pub mod enumerator;
pub mod gate;
pub mod listing;
pub mod outcome;
pub mod publisher;
pub mod settings;
pub mod transform;

// Re-export commonly used types
pub use cache_sink::{CacheAction, CacheSink, CacheWrite};
pub use clients::{open_cache, Clients};
pub use coordinator::MemberFanout;
pub use enumerator::{
    CachePager, CachedMember, ChildRecord, EnumerationError, EnumerationPath, LivePager,
    MemberEnumeration, RecordErrorPolicy,
};
pub use gate::{admit, Admission};
pub use listing::{email_prefixes, GroupListing, GroupQuery, CRON_TRIGGER_PREFIX};
pub use outcome::{DropReason, Outcome, PipelineError, Verdict};
pub use publisher::FanoutPublisher;
pub use settings::PipelineSettings;
pub use transform::{group_feed_message, EventContext};
