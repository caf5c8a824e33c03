//! Per-invocation publish counters.

use serde::{Deserialize, Serialize};

/// Final counts of one invocation's publishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTally {
    pub messages_published: u64,
    pub messages_failed: u64,
}

impl PublishTally {
    pub fn new(messages_published: u64, messages_failed: u64) -> Self {
        Self {
            messages_published,
            messages_failed,
        }
    }

    /// Number of messages handed to the publisher
    pub fn total(&self) -> u64 {
        self.messages_published + self.messages_failed
    }
}
