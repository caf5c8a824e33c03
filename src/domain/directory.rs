//! Records returned by the upstream directory.

use serde::{Deserialize, Serialize};

/// A group member as listed by the directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub role: String,

    #[serde(default, rename = "type")]
    pub member_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// A directory group
///
/// Also the resource of group feed messages, which is why the inbound
/// "group changed" payload decodes into `FeedMessage<Group>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,

    #[serde(default)]
    pub email: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,

    #[serde(default)]
    pub admin_created: bool,

    /// The directory encodes this count as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_members_count: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_editable_aliases: Vec<String>,
}
