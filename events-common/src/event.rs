use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Marks an event whose defect count is unknown. Such events count towards event totals
/// but never towards defect sums or rates.
pub const UNKNOWN_DEFECT_COUNT: i32 = -1;

/// An event as submitted by a machine. Any `factoryId`, `lineId` or `receivedTime` in the
/// payload is ignored: those are always derived or assigned server side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub event_id: String,
    pub machine_id: String,
    pub event_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub defect_count: i32,
}

/// A stored event, keyed by `event_id`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MachineEvent {
    pub event_id: String,
    pub machine_id: String,
    pub line_id: String,
    pub factory_id: String,
    pub event_time: DateTime<Utc>,
    pub received_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub defect_count: i32,
}

impl MachineEvent {
    /// Build the record to persist for an accepted event. Instants are truncated to
    /// microseconds, the resolution the store keeps, so that a resubmission compares equal to
    /// what was written.
    pub fn from_raw(raw: RawEvent, placement: Placement, received_time: DateTime<Utc>) -> Self {
        Self {
            event_id: raw.event_id,
            machine_id: raw.machine_id,
            line_id: placement.line_id,
            factory_id: placement.factory_id,
            event_time: raw.event_time.trunc_subsecs(6),
            received_time: received_time.trunc_subsecs(6),
            duration_ms: raw.duration_ms,
            defect_count: raw.defect_count,
        }
    }

    /// Defect count as it contributes to sums: the unknown sentinel counts as zero.
    pub fn counted_defects(&self) -> i64 {
        if self.defect_count == UNKNOWN_DEFECT_COUNT {
            0
        } else {
            i64::from(self.defect_count)
        }
    }
}

/// Where a machine sits in the plant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub factory_id: String,
    pub line_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    InvalidDuration,
    FutureEventTime,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::InvalidDuration => "INVALID_DURATION",
            RejectionReason::FutureEventTime => "FUTURE_EVENT_TIME",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub event_id: String,
    pub reason: RejectionReason,
}

/// Summary of one `process` call. Rejections keep the input order.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BatchResult {
    pub accepted: usize,
    pub deduped: usize,
    pub updated: usize,
    pub rejected: usize,
    pub rejections: Vec<Rejection>,
}

impl BatchResult {
    pub fn reject(&mut self, event_id: String, reason: RejectionReason) {
        self.rejections.push(Rejection { event_id, reason });
        self.rejected += 1;
    }

    /// Number of events that were classified against stored state.
    pub fn reconciled(&self) -> usize {
        self.accepted + self.deduped + self.updated
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MachineStatus {
    Healthy,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStats {
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub events_count: i64,
    pub defects_count: i64,
    pub avg_defect_rate: f64,
    pub status: MachineStatus,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDefectLine {
    pub line_id: String,
    pub total_defects: i64,
    pub event_count: i64,
    pub defects_percent: f64,
}
