//! Adapter interfaces for external systems.
//!
//! Each external collaborator sits behind a trait so the pipeline can run
//! against the real services or against in-process fakes:
//! - `DirectoryApi`: paged listing of the upstream directory
//! - `CacheStore`: durable side-index of published messages
//! - `MessageBus`: output topic publishing

pub mod bus;
pub mod cache;
pub mod directory;

pub use bus::{MessageBus, OutboundMessage, PubSubBus, PublishError, IDEMPOTENCY_KEY_ATTRIBUTE};
pub use cache::{
    normalize_parent_key, CacheError, CacheRecord, CacheStore, CachedRow, SqliteCacheStore,
};
pub use directory::{
    AdminDirectoryClient, DirectoryApi, DirectoryError, ListRequest, RawPage, MAX_PAGE_SIZE,
};
