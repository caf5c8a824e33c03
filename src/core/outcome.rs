//! Result of one invocation.
//!
//! The invoking runtime only needs to know whether to redeliver. Permanent
//! drops and successes both acknowledge the message; only
//! `RetryableFailure` asks for redelivery.

use std::fmt;

use thiserror::Error;

use crate::adapters::{CacheError, DirectoryError};

use super::enumerator::EnumerationError;

/// Failures that warrant redelivery of the inbound message
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("Enumeration aborted: {0}")]
    Enumeration(#[from] EnumerationError),

    #[error("Directory call failed: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Cache write failed: {0}")]
    Cache(#[from] CacheError),
}

/// Why an inbound message was acknowledged without doing the work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Older than the retry horizon
    Stale {
        age_seconds: i64,
        retry_timeout_seconds: i64,
    },

    /// Payload could not be decoded
    Malformed(String),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale {
                age_seconds,
                retry_timeout_seconds,
            } => write!(
                f,
                "event is {}s old, retry horizon is {}s",
                age_seconds, retry_timeout_seconds
            ),
            Self::Malformed(reason) => write!(f, "malformed payload: {}", reason),
        }
    }
}

/// Outcome of one invocation
#[derive(Debug)]
pub enum Outcome<T> {
    Succeeded(T),

    DroppedPermanently(DropReason),

    /// `partial` holds whatever was achieved before the failure
    RetryableFailure {
        cause: PipelineError,
        partial: Option<T>,
    },
}

/// Log tag of an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Processed,
    DroppedStale,
    DroppedMalformed,
    RetryRequested,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::DroppedStale => "dropped-stale",
            Self::DroppedMalformed => "dropped-malformed",
            Self::RetryRequested => "retry-requested",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T> Outcome<T> {
    pub fn retryable(cause: impl Into<PipelineError>, partial: Option<T>) -> Self {
        Self::RetryableFailure {
            cause: cause.into(),
            partial,
        }
    }

    pub fn malformed(reason: impl fmt::Display) -> Self {
        Self::DroppedPermanently(DropReason::Malformed(reason.to_string()))
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            Self::Succeeded(_) => Verdict::Processed,
            Self::DroppedPermanently(DropReason::Stale { .. }) => Verdict::DroppedStale,
            Self::DroppedPermanently(DropReason::Malformed(_)) => Verdict::DroppedMalformed,
            Self::RetryableFailure { .. } => Verdict::RetryRequested,
        }
    }

    /// Whether the runtime should redeliver the inbound message
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RetryableFailure { .. })
    }

    /// The success value, or the partial one of a retryable failure
    pub fn summary(&self) -> Option<&T> {
        match self {
            Self::Succeeded(value) => Some(value),
            Self::RetryableFailure { partial, .. } => partial.as_ref(),
            Self::DroppedPermanently(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_tags() {
        let processed: Outcome<u32> = Outcome::Succeeded(3);
        assert_eq!(processed.verdict().as_str(), "processed");
        assert!(!processed.is_retryable());

        let stale: Outcome<u32> = Outcome::DroppedPermanently(DropReason::Stale {
            age_seconds: 700,
            retry_timeout_seconds: 600,
        });
        assert_eq!(stale.verdict(), Verdict::DroppedStale);
        assert!(stale.summary().is_none());

        let malformed: Outcome<u32> = Outcome::malformed("not json");
        assert_eq!(malformed.verdict().to_string(), "dropped-malformed");

        let retry: Outcome<u32> =
            Outcome::retryable(PipelineError::InitFailed("no bus".to_string()), Some(2));
        assert!(retry.is_retryable());
        assert_eq!(retry.summary(), Some(&2));
    }
}
