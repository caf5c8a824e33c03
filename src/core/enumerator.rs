//! Child enumeration.
//!
//! Produces the children of a parent one page at a time. Two strategies,
//! selected by whether the parent was deleted:
//! - Live: page through the upstream directory. Any page failure aborts the
//!   whole enumeration; "no such parent" ends it with no records.
//! - Cache: scan the side-index for children previously recorded under the
//!   parent. Undecodable rows are skipped, a failed scan aborts.
//!
//! Enumerations are finite and not restartable: once a pager returns
//! `Ok(None)` or an error it stays finished.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::adapters::{
    normalize_parent_key, CacheError, CacheStore, DirectoryApi, DirectoryError, ListRequest,
};
use crate::domain::{FeedMessage, Member, MemberResource, MEMBER_ASSET_TYPE};

/// What to do with a live record that does not decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordErrorPolicy {
    /// Fail the enumeration (retryable)
    #[default]
    Abort,

    /// Log and continue with the rest of the page
    Skip,
}

/// Errors that abort an enumeration
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("Directory page {page} failed: {source}")]
    Page {
        page: u32,
        #[source]
        source: DirectoryError,
    },

    #[error("Record {index} of page {page} is invalid: {reason}")]
    Record {
        page: u32,
        index: usize,
        reason: String,
    },

    #[error("Cache scan failed: {0}")]
    Cache(#[from] CacheError),
}

/// Which strategy an enumeration uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationPath {
    Live,
    Cache,
}

/// Pages through a live directory listing, decoding items into `T`
pub struct LivePager<T> {
    directory: Arc<dyn DirectoryApi>,
    request: ListRequest,
    page_size: u32,
    policy: RecordErrorPolicy,
    page_token: Option<String>,
    pages_fetched: u32,
    finished: bool,
    parent_missing: bool,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> LivePager<T> {
    pub fn new(
        directory: Arc<dyn DirectoryApi>,
        request: ListRequest,
        page_size: u32,
        policy: RecordErrorPolicy,
    ) -> Self {
        Self {
            directory,
            request,
            page_size,
            policy,
            page_token: None,
            pages_fetched: 0,
            finished: false,
            parent_missing: false,
            _record: PhantomData,
        }
    }

    /// Whether enumeration ended because the parent does not exist
    pub fn parent_missing(&self) -> bool {
        self.parent_missing
    }

    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Fetch and decode the next page, `Ok(None)` once exhausted
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, EnumerationError> {
        if self.finished {
            return Ok(None);
        }

        let page_number = self.pages_fetched + 1;
        let page = match self
            .directory
            .list_page(&self.request, self.page_size, self.page_token.as_deref())
            .await
        {
            Ok(page) => page,
            Err(e) if e.is_not_found() => {
                info!(request = ?self.request, error = %e, "Parent not found, nothing to enumerate");
                self.finished = true;
                self.parent_missing = true;
                return Ok(None);
            }
            Err(source) => {
                self.finished = true;
                return Err(EnumerationError::Page {
                    page: page_number,
                    source,
                });
            }
        };

        self.pages_fetched = page_number;
        self.page_token = page.next_page_token;
        if self.page_token.is_none() {
            self.finished = true;
        }

        let mut records = Vec::with_capacity(page.items.len());
        for (index, item) in page.items.into_iter().enumerate() {
            match serde_json::from_value::<T>(item) {
                Ok(record) => records.push(record),
                Err(e) => match self.policy {
                    RecordErrorPolicy::Skip => {
                        warn!(page = page_number, index, error = %e, "Skipping undecodable record");
                    }
                    RecordErrorPolicy::Abort => {
                        self.finished = true;
                        return Err(EnumerationError::Record {
                            page: page_number,
                            index,
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        debug!(page = page_number, records = records.len(), "Directory page decoded");
        Ok(Some(records))
    }
}

/// A member recovered from the side-index
#[derive(Debug, Clone, PartialEq)]
pub struct CachedMember {
    /// Asset name the member was published under
    pub name: String,
    pub resource: MemberResource,
    /// When the row was last written
    pub cached_at: DateTime<Utc>,
    pub was_deleted: bool,
}

/// Pages through the side-index for members of one group
pub struct CachePager {
    cache: Arc<dyn CacheStore>,
    parent_key: String,
    page_size: u32,
    after: Option<String>,
    finished: bool,
    skipped: u64,
}

impl CachePager {
    /// `group_email` is normalized before querying
    pub fn new(cache: Arc<dyn CacheStore>, group_email: &str, page_size: u32) -> Self {
        Self {
            cache,
            parent_key: normalize_parent_key(group_email),
            page_size: page_size.max(1),
            after: None,
            finished: false,
            skipped: 0,
        }
    }

    /// Rows skipped because they could not be read
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<CachedMember>>, EnumerationError> {
        if self.finished {
            return Ok(None);
        }

        let rows = match self
            .cache
            .query_page(
                MEMBER_ASSET_TYPE,
                &self.parent_key,
                self.after.as_deref(),
                self.page_size,
            )
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                self.finished = true;
                return Err(e.into());
            }
        };

        if rows.len() < self.page_size as usize {
            self.finished = true;
        }
        if rows.is_empty() {
            return Ok(None);
        }
        self.after = rows.last().map(|row| row.name.clone());

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            let message = match serde_json::from_str::<FeedMessage<MemberResource>>(&row.data) {
                Ok(message) => message,
                Err(e) => {
                    warn!(name = %row.name, error = %e, "Skipping unreadable cached record");
                    self.skipped += 1;
                    continue;
                }
            };
            let cached_at = match DateTime::parse_from_rfc3339(&row.cached_at) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    warn!(name = %row.name, error = %e, "Cached record has a bad timestamp");
                    message.window.start_time
                }
            };

            members.push(CachedMember {
                name: row.name,
                resource: message.asset.resource,
                cached_at,
                was_deleted: true,
            });
        }

        Ok(Some(members))
    }
}

/// One child of a group, live or cached
#[derive(Debug, Clone, PartialEq)]
pub enum ChildRecord {
    Live(Member),
    Cached(CachedMember),
}

impl ChildRecord {
    /// Upstream identity of the child, possibly empty for cached records
    pub fn id(&self) -> &str {
        match self {
            Self::Live(member) => &member.id,
            Self::Cached(cached) => &cached.resource.id,
        }
    }

    /// Name the child was last published under, if known
    pub fn stored_name(&self) -> Option<&str> {
        match self {
            Self::Live(_) => None,
            Self::Cached(cached) => Some(&cached.name),
        }
    }

    pub fn was_deleted(&self) -> bool {
        match self {
            Self::Live(_) => false,
            Self::Cached(cached) => cached.was_deleted,
        }
    }
}

/// Enumeration of a group's members
pub enum MemberEnumeration {
    Live(LivePager<Member>),
    Cache(CachePager),
}

impl MemberEnumeration {
    /// Pick the strategy: a deleted group is only ever read from the cache
    pub fn select(
        group_id: &str,
        group_email: &str,
        group_deleted: bool,
        directory: Arc<dyn DirectoryApi>,
        cache: Arc<dyn CacheStore>,
        page_size: u32,
        policy: RecordErrorPolicy,
    ) -> Self {
        if group_deleted {
            Self::Cache(CachePager::new(cache, group_email, page_size))
        } else {
            let request = ListRequest::Members {
                group_key: group_id.to_string(),
            };
            Self::Live(LivePager::new(directory, request, page_size, policy))
        }
    }

    /// Cached rows skipped because they could not be read
    pub fn skipped(&self) -> u64 {
        match self {
            Self::Live(_) => 0,
            Self::Cache(pager) => pager.skipped(),
        }
    }

    pub fn path(&self) -> EnumerationPath {
        match self {
            Self::Live(_) => EnumerationPath::Live,
            Self::Cache(_) => EnumerationPath::Cache,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<ChildRecord>>, EnumerationError> {
        match self {
            Self::Live(pager) => Ok(pager
                .next_page()
                .await?
                .map(|members| members.into_iter().map(ChildRecord::Live).collect())),
            Self::Cache(pager) => Ok(pager
                .next_page()
                .await?
                .map(|members| members.into_iter().map(ChildRecord::Cached).collect())),
        }
    }
}
