//! Per-event validation rules. Failing a rule rejects only the event, never the batch.
use chrono::{DateTime, Duration, Utc};

use crate::event::RejectionReason;

/// Longest accepted duration: 6 hours, inclusive.
pub const MAX_DURATION_MS: i64 = 21_600_000;

/// How far ahead of the server clock an event may be stamped, inclusive.
pub fn future_tolerance() -> Duration {
    Duration::minutes(15)
}

pub fn validate_duration(duration_ms: i64) -> Result<(), RejectionReason> {
    if (0..=MAX_DURATION_MS).contains(&duration_ms) {
        Ok(())
    } else {
        Err(RejectionReason::InvalidDuration)
    }
}

pub fn validate_event_time(
    event_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), RejectionReason> {
    if event_time > now + future_tolerance() {
        Err(RejectionReason::FutureEventTime)
    } else {
        Ok(())
    }
}
