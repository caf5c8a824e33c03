//! Retry gate.
//!
//! Runs once at the top of every invocation, before any I/O, and decides
//! from event metadata alone whether the event is processed. Staleness wins
//! over everything else: a stale event is never retried, even when the
//! process failed to initialize.

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};

use super::outcome::{DropReason, Outcome, PipelineError};

/// Decision of the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Proceed,

    /// Too old to be useful; acknowledge without work
    DropSilently { age_seconds: i64 },

    /// Cannot run now; the runtime should redeliver later
    Fail(String),
}

impl Admission {
    /// Convert a rejection into the invocation outcome, `None` on `Proceed`
    pub fn rejection<T>(self, retry_timeout_seconds: i64) -> Option<Outcome<T>> {
        match self {
            Self::Proceed => None,
            Self::DropSilently { age_seconds } => Some(Outcome::DroppedPermanently(DropReason::Stale {
                age_seconds,
                retry_timeout_seconds,
            })),
            Self::Fail(reason) => Some(Outcome::retryable(PipelineError::InitFailed(reason), None)),
        }
    }
}

/// Decide whether an event is processed
///
/// `init_error` carries the cold-start failure, if any.
pub fn admit(
    event_timestamp: DateTime<Utc>,
    retry_timeout_seconds: i64,
    init_error: Option<&str>,
    now: DateTime<Utc>,
) -> Admission {
    let age = now - event_timestamp;
    if age > Duration::seconds(retry_timeout_seconds) {
        info!(
            age_seconds = age.num_seconds(),
            retry_timeout_seconds, "NORETRY event older than retry horizon"
        );
        return Admission::DropSilently {
            age_seconds: age.num_seconds(),
        };
    }

    if let Some(reason) = init_error {
        error!(%reason, "Initialization failed, requesting retry");
        return Admission::Fail(reason.to_string());
    }

    Admission::Proceed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_event_proceeds() {
        let ts = now() - Duration::seconds(30);
        assert_eq!(admit(ts, 600, None, now()), Admission::Proceed);
    }

    #[test]
    fn test_stale_event_dropped() {
        let ts = now() - Duration::seconds(700);
        assert_eq!(
            admit(ts, 600, None, now()),
            Admission::DropSilently { age_seconds: 700 }
        );
    }

    #[test]
    fn test_exactly_at_horizon_proceeds() {
        let ts = now() - Duration::seconds(600);
        assert_eq!(admit(ts, 600, None, now()), Admission::Proceed);
    }

    #[test]
    fn test_init_failure_requests_retry() {
        let ts = now() - Duration::seconds(5);
        assert_eq!(
            admit(ts, 600, Some("bus unavailable"), now()),
            Admission::Fail("bus unavailable".to_string())
        );
    }

    #[test]
    fn test_staleness_beats_init_failure() {
        let ts = now() - Duration::seconds(601);
        assert!(matches!(
            admit(ts, 600, Some("bus unavailable"), now()),
            Admission::DropSilently { .. }
        ));
    }

    #[test]
    fn test_rejection_outcomes() {
        let stale = Admission::DropSilently { age_seconds: 700 }.rejection::<()>(600);
        assert!(matches!(
            stale,
            Some(Outcome::DroppedPermanently(DropReason::Stale { age_seconds: 700, .. }))
        ));

        let failed = Admission::Fail("x".to_string()).rejection::<()>(600);
        assert!(failed.map(|o| o.is_retryable()).unwrap_or(false));

        assert!(Admission::Proceed.rejection::<()>(600).is_none());
    }
}
