//! Cache sink integration tests
//!
//! The sink is what makes the deleted-group path work, so the last test runs
//! both handlers against one store.

mod common;

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use common::*;
use dirfeed::adapters::{CacheStore, SqliteCacheStore};
use dirfeed::core::{CacheAction, CacheSink, CacheWrite, MemberFanout, Outcome, Verdict};
use dirfeed::domain::{MemberResource, PublishTally, MEMBER_ASSET_TYPE};

fn member_feed(member_id: &str, start_time: &str, deleted: bool) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "asset": {
            "name": format!("//directories/C01/groups/g1/members/{}", member_id),
            "assetType": MEMBER_ASSET_TYPE,
            "ancestors": ["groups/g1", "directories/C01"],
            "ancestryPath": "//directories/C01/groups/g1",
            "resource": {
                "groupEmail": "Team@Example.com",
                "memberEmail": format!("{}@example.com", member_id),
                "id": member_id,
                "type": "USER"
            }
        },
        "window": { "startTime": start_time },
        "deleted": deleted,
        "origin": "real-time"
    }))
    .unwrap()
}

fn sink(cache: Arc<SqliteCacheStore>) -> CacheSink {
    let cache: Arc<dyn CacheStore> = cache;
    CacheSink::new(Ok(cache), 600)
}

#[tokio::test]
async fn test_upsert_then_delete() {
    let cache = Arc::new(SqliteCacheStore::open_in_memory().unwrap());
    let sink = sink(cache.clone());

    let outcome = sink
        .handle_at(&inbound(member_feed("m1", "2024-05-01T11:00:00Z", false), aged(5)), now())
        .await;
    assert!(matches!(
        outcome,
        Outcome::Succeeded(CacheWrite { action: CacheAction::Upserted, applied: true, .. })
    ));

    let rows = cache
        .query_page(MEMBER_ASSET_TYPE, "team@example.com", None, 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    let outcome = sink
        .handle_at(&inbound(member_feed("m1", "2024-05-01T11:30:00Z", true), aged(5)), now())
        .await;
    assert!(matches!(
        outcome,
        Outcome::Succeeded(CacheWrite { action: CacheAction::Deleted, applied: true, .. })
    ));

    let rows = cache
        .query_page(MEMBER_ASSET_TYPE, "team@example.com", None, 10)
        .await
        .unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_late_older_write_ignored() {
    let cache = Arc::new(SqliteCacheStore::open_in_memory().unwrap());
    let sink = sink(cache.clone());

    sink.handle_at(&inbound(member_feed("m1", "2024-05-01T11:30:00Z", false), aged(5)), now())
        .await;
    let outcome = sink
        .handle_at(&inbound(member_feed("m1", "2024-05-01T11:00:00Z", true), aged(5)), now())
        .await;

    assert!(matches!(outcome, Outcome::Succeeded(CacheWrite { applied: false, .. })));
    let rows = cache
        .query_page(MEMBER_ASSET_TYPE, "team@example.com", None, 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_bad_input_and_init_failure() {
    let cache = Arc::new(SqliteCacheStore::open_in_memory().unwrap());
    let outcome = sink(cache)
        .handle_at(&inbound(b"[]".to_vec(), aged(5)), now())
        .await;
    assert_eq!(outcome.verdict(), Verdict::DroppedMalformed);

    let broken = CacheSink::new(Err("disk full".to_string()), 600);
    let outcome = broken
        .handle_at(&inbound(member_feed("m1", "2024-05-01T11:00:00Z", false), aged(5)), now())
        .await;
    assert!(outcome.is_retryable());
}

#[tokio::test]
async fn test_deleted_group_recovers_sunk_members() {
    let temp = TempDir::new().unwrap();
    let cache = Arc::new(SqliteCacheStore::open(&temp.path().join("cache.sqlite")).unwrap());

    let sink = sink(cache.clone());
    for id in ["m1", "m2"] {
        sink.handle_at(&inbound(member_feed(id, "2024-05-01T10:00:00Z", false), aged(5)), now())
            .await;
    }

    let mut harness = Harness::new(ScriptedDirectory::new(), RecordingBus::new());
    harness.cache = cache;
    let fanout = MemberFanout::new(Ok(harness.clients()), settings());

    let outcome = fanout
        .handle_at(&inbound(group_event("g1", "team@example.com", true), aged(5)), now())
        .await;
    assert!(matches!(outcome, Outcome::Succeeded(tally) if tally == PublishTally::new(2, 0)));
    assert_eq!(harness.directory.page_calls(), 0);

    let published = harness.bus.feed_messages::<MemberResource>("gci-groupMembers");
    assert!(published.iter().all(|m| m.deleted));
    assert_eq!(published[1].asset.resource.member_email, "m2@example.com");
}
