//! dirfeed - Event-driven fan-out of directory group changes
//!
//! Turns one "group changed" notification into one feed message per member
//! of that group, published concurrently to a message bus, while a durable
//! side-index remembers members so that a deleted group's children can still
//! be reported after the live directory has forgotten them.
//!
//! # Architecture
//!
//! Every invocation is independent and runs the same pipeline:
//! - The retry gate drops stale events and retries cold-start failures
//! - The enumerator pages through the live directory, or the cache when the
//!   group was deleted
//! - Each record is mapped to a canonical feed message
//! - Messages are published concurrently and tallied; the invocation waits
//!   for all of them before reporting an `Outcome`
//!
//! # Modules
//!
//! - `adapters`: External systems (directory API, message bus, SQLite cache)
//! - `core`: Gate, enumeration, transform, fan-out and handlers
//! - `domain`: Wire types (feed messages, directory records, envelopes)
//! - `config`: YAML configuration with environment overrides
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Fan out the members of a changed group from a push envelope
//! dirfeed members --input envelope.json
//!
//! # Start a scheduled traversal of every group
//! echo -n "cron schedule" | dirfeed groups --raw
//!
//! # Mirror a feed message into the cache
//! dirfeed cache-sink --input envelope.json
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use core::{CacheSink, Clients, GroupListing, MemberFanout, Outcome, PipelineSettings};
pub use domain::{FeedMessage, InboundMessage, PublishTally};
