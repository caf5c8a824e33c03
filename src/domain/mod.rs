//! Domain types for dirfeed.
//!
//! This module contains the core data structures:
//! - Feed: canonical messages published downstream
//! - Directory: raw records listed from the upstream directory
//! - Inbound: messages delivered by the bus
//! - Tally: publish counters

pub mod directory;
pub mod feed;
pub mod inbound;
pub mod tally;

// Re-export commonly used types
pub use directory::{Group, Member};
pub use feed::{
    Asset, FeedMessage, MemberResource, Window, BATCH_LISTGROUPS_ORIGIN, GROUP_ASSET_TYPE,
    MEMBER_ASSET_TYPE,
};
pub use inbound::{EnvelopeError, InboundMessage};
pub use tally::PublishTally;
