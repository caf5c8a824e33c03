//! Shared fakes for integration tests.
//!
//! Each test builds its own fakes; nothing is shared between tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use dirfeed::adapters::{
    CacheError, CacheRecord, CacheStore, CachedRow, DirectoryApi, DirectoryError, ListRequest,
    MessageBus, OutboundMessage, PublishError, RawPage, SqliteCacheStore,
};
use dirfeed::core::{Clients, PipelineSettings};
use dirfeed::domain::{FeedMessage, InboundMessage};

/// Fixed "now" for every test
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Event timestamp `age_seconds` before `now()`
pub fn aged(age_seconds: i64) -> DateTime<Utc> {
    now() - Duration::seconds(age_seconds)
}

/// Directory whose pages are scripted in order
#[derive(Default)]
pub struct ScriptedDirectory {
    pages: Mutex<VecDeque<Result<RawPage, DirectoryError>>>,
    domains: Vec<String>,
    requests: Mutex<Vec<ListRequest>>,
    page_calls: AtomicU32,
    domain_calls: AtomicU32,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domains(mut self, domains: &[&str]) -> Self {
        self.domains = domains.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Queue a page; `has_more` sets a continuation token
    pub fn page(self, items: Vec<Value>, has_more: bool) -> Self {
        let token = has_more.then(|| format!("token-{}", self.pages.lock().unwrap().len() + 1));
        self.pages.lock().unwrap().push_back(Ok(RawPage {
            items,
            next_page_token: token,
        }));
        self
    }

    pub fn failure(self, error: DirectoryError) -> Self {
        self.pages.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn page_calls(&self) -> u32 {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn domain_calls(&self) -> u32 {
        self.domain_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ListRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryApi for ScriptedDirectory {
    async fn list_page(
        &self,
        request: &ListRequest,
        _page_size: u32,
        _page_token: Option<&str>,
    ) -> Result<RawPage, DirectoryError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawPage::default()))
    }

    async fn list_domains(&self, _customer_id: &str) -> Result<Vec<String>, DirectoryError> {
        self.domain_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.domains.clone())
    }
}

/// Bus that records every message and rejects those containing a marker
#[derive(Default)]
pub struct RecordingBus {
    sent: Mutex<Vec<(String, OutboundMessage)>>,
    reject_marker: Option<String>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(marker: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject_marker: Some(marker.to_string()),
        }
    }

    pub fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Decoded bodies of messages sent to `topic`, sorted by asset name
    pub fn feed_messages<R: DeserializeOwned>(&self, topic: &str) -> Vec<FeedMessage<R>> {
        let mut messages: Vec<FeedMessage<R>> = self
            .sent()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, m)| serde_json::from_slice(&m.data).unwrap())
            .collect();
        messages.sort_by(|a, b| a.asset.name.cmp(&b.asset.name));
        messages
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(&self, topic: &str, message: OutboundMessage) -> Result<String, PublishError> {
        if let Some(marker) = &self.reject_marker {
            if String::from_utf8_lossy(&message.data).contains(marker.as_str()) {
                return Err(PublishError::Rejected(marker.clone()));
            }
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((topic.to_string(), message));
        Ok(format!("msg-{}", sent.len()))
    }
}

/// Cache whose every operation fails
#[derive(Default)]
pub struct FailingCache {
    query_calls: AtomicU32,
}

impl FailingCache {
    pub fn query_calls(&self) -> u32 {
        self.query_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for FailingCache {
    async fn query_page(
        &self,
        _asset_type: &str,
        _parent_key: &str,
        _after: Option<&str>,
        _limit: u32,
    ) -> Result<Vec<CachedRow>, CacheError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Poisoned)
    }

    async fn upsert(&self, _record: CacheRecord) -> Result<bool, CacheError> {
        Err(CacheError::Poisoned)
    }

    async fn delete(&self, _name: &str, _start_time: DateTime<Utc>) -> Result<bool, CacheError> {
        Err(CacheError::Poisoned)
    }
}

/// Everything a handler test needs
pub struct Harness {
    pub directory: Arc<ScriptedDirectory>,
    pub cache: Arc<SqliteCacheStore>,
    pub bus: Arc<RecordingBus>,
}

impl Harness {
    pub fn new(directory: ScriptedDirectory, bus: RecordingBus) -> Self {
        Self {
            directory: Arc::new(directory),
            cache: Arc::new(SqliteCacheStore::open_in_memory().unwrap()),
            bus: Arc::new(bus),
        }
    }

    pub fn clients(&self) -> Clients {
        let cache: Arc<dyn CacheStore> = self.cache.clone();
        Clients::new(self.directory.clone(), cache, self.bus.clone())
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        retry_timeout_seconds: 600,
        page_size: 2,
        customer_id: "C01".to_string(),
        ..PipelineSettings::default()
    }
}

/// Raw directory member record
pub fn member(id: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{}@example.com", id),
        "kind": "admin#directory#member",
        "role": "MEMBER",
        "type": "USER",
        "status": "ACTIVE"
    })
}

/// Raw directory group record
pub fn group(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "email": email,
        "name": id,
        "etag": "\"etag-value\"",
        "directMembersCount": "3"
    })
}

/// Payload of a "group changed" event
pub fn group_event(id: &str, email: &str, deleted: bool) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "asset": {
            "name": format!("//directories/C01/groups/{}", id),
            "assetType": "www.googleapis.com/admin/directory/groups",
            "ancestors": ["directories/C01"],
            "ancestryPath": "directories/C01",
            "resource": { "id": id, "email": email }
        },
        "window": { "startTime": "2024-05-01T11:59:00Z" },
        "deleted": deleted,
        "origin": "real-time"
    }))
    .unwrap()
}

pub fn inbound(data: Vec<u8>, timestamp: DateTime<Utc>) -> InboundMessage {
    InboundMessage::new("evt-1", timestamp, data)
}
