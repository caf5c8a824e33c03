//! Canonical feed messages.
//!
//! Every message published downstream has the same envelope regardless of
//! which entity it describes: an asset (name, type, ancestry, resource), a
//! time window and a deletion flag. Consumers upsert or delete by
//! `asset.name` and order generations by `window.startTime`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Asset type of group membership messages
pub const MEMBER_ASSET_TYPE: &str = "www.googleapis.com/admin/directory/members";

/// Asset type of group messages
pub const GROUP_ASSET_TYPE: &str = "www.googleapis.com/admin/directory/groups";

/// Origin stamped on messages produced by the scheduled group traversal
pub const BATCH_LISTGROUPS_ORIGIN: &str = "batch-listgroups";

/// A canonical feed message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedMessage<R> {
    pub asset: Asset<R>,
    pub window: Window,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub origin: String,
}

/// Asset metadata plus the entity payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset<R> {
    /// Globally unique hierarchical name
    pub name: String,

    /// Schema tag of `resource`
    pub asset_type: String,

    /// Nearest ancestor first
    #[serde(default)]
    pub ancestors: Vec<String>,

    #[serde(default)]
    pub ancestry_path: String,

    pub resource: R,
}

/// Logical time window of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    /// Timestamp of the inbound event, shared by every message it produced
    pub start_time: DateTime<Utc>,
}

impl<R> FeedMessage<R> {
    /// Key that stays the same for every redelivery of one logical message
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.asset.name.as_bytes());
        hasher.update(self.window.start_time.to_rfc3339().as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

/// Resource payload of a membership message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResource {
    #[serde(default)]
    pub group_email: String,

    #[serde(default)]
    pub member_email: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub role: String,

    #[serde(default, rename = "type")]
    pub member_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn member_message() -> FeedMessage<MemberResource> {
        FeedMessage {
            asset: Asset {
                name: "//directories/C01/groups/g1/members/m1".to_string(),
                asset_type: MEMBER_ASSET_TYPE.to_string(),
                ancestors: vec!["groups/g1".to_string(), "directories/C01".to_string()],
                ancestry_path: "//directories/C01/groups/g1".to_string(),
                resource: MemberResource {
                    group_email: "team@example.com".to_string(),
                    member_email: "alice@example.com".to_string(),
                    id: "m1".to_string(),
                    kind: "admin#directory#member".to_string(),
                    role: "MEMBER".to_string(),
                    member_type: "USER".to_string(),
                },
            },
            window: Window {
                start_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            },
            deleted: false,
            origin: "real-time".to_string(),
        }
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(member_message()).unwrap();

        assert_eq!(json["asset"]["assetType"], MEMBER_ASSET_TYPE);
        assert_eq!(json["asset"]["ancestryPath"], "//directories/C01/groups/g1");
        assert_eq!(json["asset"]["resource"]["groupEmail"], "team@example.com");
        assert_eq!(json["asset"]["resource"]["type"], "USER");
        assert_eq!(json["window"]["startTime"], "2024-05-01T12:00:00Z");
        assert_eq!(json["deleted"], false);
    }

    #[test]
    fn test_idempotency_key_stable() {
        let first = member_message();
        let mut redelivered = member_message();
        redelivered.origin = "other".to_string();

        assert_eq!(first.idempotency_key(), redelivered.idempotency_key());
        assert_eq!(first.idempotency_key().len(), 16);

        redelivered.window.start_time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();
        assert_ne!(first.idempotency_key(), redelivered.idempotency_key());
    }
}
