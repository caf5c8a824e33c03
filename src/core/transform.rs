//! Child record to feed message mapping.
//!
//! Pure functions: no I/O and no failure modes. Names and timestamps are
//! derived only from the inbound event and the child's upstream identity so
//! a redelivered event regenerates exactly the same messages.

use chrono::{DateTime, Utc};

use crate::domain::{
    Asset, FeedMessage, Group, InboundMessage, MemberResource, Window, BATCH_LISTGROUPS_ORIGIN,
    GROUP_ASSET_TYPE, MEMBER_ASSET_TYPE,
};

use super::enumerator::ChildRecord;

/// Everything the transformer needs from one "group changed" event
///
/// Built once per invocation and borrowed by every record of that
/// invocation; never shared between invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub event_id: String,
    /// Bus-assigned timestamp of the inbound event
    pub timestamp: DateTime<Utc>,
    /// Canonical asset name of the parent group
    pub parent_name: String,
    pub parent_id: String,
    pub parent_email: String,
    /// Ancestors of the parent group, nearest first
    pub ancestors: Vec<String>,
    pub origin: String,
    pub is_deleted: bool,
}

impl EventContext {
    /// Context for the members of the group carried by `group`
    pub fn for_group(message: &InboundMessage, group: &FeedMessage<Group>) -> Self {
        Self {
            event_id: message.event_id.clone(),
            timestamp: message.timestamp,
            parent_name: group.asset.name.clone(),
            parent_id: group.asset.resource.id.clone(),
            parent_email: group.asset.resource.email.clone(),
            ancestors: group.asset.ancestors.clone(),
            origin: group.origin.clone(),
            is_deleted: group.deleted,
        }
    }

    /// Identity of the parent as it appears in its children's ancestry
    pub fn parent_identity(&self) -> String {
        format!("groups/{}", self.parent_id)
    }

    /// The parent first, then the parent's own ancestors unmodified
    pub fn child_ancestors(&self) -> Vec<String> {
        let mut ancestors = Vec::with_capacity(self.ancestors.len() + 1);
        ancestors.push(self.parent_identity());
        ancestors.extend(self.ancestors.iter().cloned());
        ancestors
    }

    /// Asset name of a member of the parent
    pub fn member_name(&self, member_id: &str) -> String {
        format!("{}/members/{}", self.parent_name, member_id)
    }

    /// Name of a child; cached records without an id keep their stored name
    fn child_name(&self, record: &ChildRecord) -> String {
        match record.stored_name() {
            Some(stored) if record.id().is_empty() && !stored.is_empty() => stored.to_string(),
            _ => self.member_name(record.id()),
        }
    }

    /// Map one child to its canonical message
    pub fn to_feed_message(&self, record: &ChildRecord) -> FeedMessage<MemberResource> {
        let resource = match record {
            ChildRecord::Live(member) => MemberResource {
                group_email: self.parent_email.clone(),
                member_email: member.email.clone(),
                id: member.id.clone(),
                kind: member.kind.clone(),
                role: member.role.clone(),
                member_type: member.member_type.clone(),
            },
            ChildRecord::Cached(cached) => cached.resource.clone(),
        };

        FeedMessage {
            asset: Asset {
                name: self.child_name(record),
                asset_type: MEMBER_ASSET_TYPE.to_string(),
                ancestors: self.child_ancestors(),
                ancestry_path: self.parent_name.clone(),
                resource,
            },
            window: Window {
                start_time: self.timestamp,
            },
            deleted: self.is_deleted || record.was_deleted(),
            origin: self.origin.clone(),
        }
    }
}

/// Map a listed group to its canonical message
///
/// Used by the scheduled traversal, hence the fixed batch origin.
pub fn group_feed_message(
    mut group: Group,
    customer_id: &str,
    timestamp: DateTime<Utc>,
) -> FeedMessage<Group> {
    let directory = format!("directories/{}", customer_id);
    // etag changes without any meaningful change to the group
    group.etag.clear();

    FeedMessage {
        asset: Asset {
            name: format!("//{}/groups/{}", directory, group.id),
            asset_type: GROUP_ASSET_TYPE.to_string(),
            ancestors: vec![directory.clone()],
            ancestry_path: directory,
            resource: group,
        },
        window: Window {
            start_time: timestamp,
        },
        deleted: false,
        origin: BATCH_LISTGROUPS_ORIGIN.to_string(),
    }
}
