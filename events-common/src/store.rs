use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::MachineEvent;

/// Enumeration of errors for operations against an EventStore.
/// Errors can originate from sqlx and are wrapped by us to provide additional context.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("connection failed with: {error}")]
    ConnectionError { error: sqlx::Error },
    #[error("{command} query failed with: {error}")]
    QueryError {
        command: String,
        error: sqlx::Error,
    },
    #[error("store is unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Which events an aggregation looks at, besides the time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowFilter {
    Machine(String),
    Factory(String),
    Line(String),
}

impl WindowFilter {
    pub fn column(&self) -> &'static str {
        match self {
            WindowFilter::Machine(_) => "machine_id",
            WindowFilter::Factory(_) => "factory_id",
            WindowFilter::Line(_) => "line_id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            WindowFilter::Machine(value)
            | WindowFilter::Factory(value)
            | WindowFilter::Line(value) => value,
        }
    }

    pub fn matches(&self, event: &MachineEvent) -> bool {
        match self {
            WindowFilter::Machine(id) => &event.machine_id == id,
            WindowFilter::Factory(id) => &event.factory_id == id,
            WindowFilter::Line(id) => &event.line_id == id,
        }
    }
}

/// Field to group by in `aggregate_grouped_window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Line,
    Machine,
}

impl GroupField {
    pub fn column(&self) -> &'static str {
        match self {
            GroupField::Line => "line_id",
            GroupField::Machine => "machine_id",
        }
    }

    pub fn key<'a>(&self, event: &'a MachineEvent) -> &'a str {
        match self {
            GroupField::Line => &event.line_id,
            GroupField::Machine => &event.machine_id,
        }
    }
}

/// Count and defect sum over a window. The sum treats the unknown sentinel as zero, the
/// count includes it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct WindowAggregate {
    pub events_count: i64,
    pub defects_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GroupAggregate {
    pub group_key: String,
    pub total_defects: i64,
    pub event_count: i64,
}

/// Keyed storage for machine events.
///
/// All windows are half-open: `start <= event_time < end`.
#[async_trait]
pub trait EventStore {
    /// Fetch the stored records for `ids`. Unknown ids are simply absent from the result.
    async fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<MachineEvent>>;

    /// Insert or replace every record, keyed by `event_id`, atomically: either all records
    /// are written or none are. `events` must not contain the same id twice.
    async fn upsert_all(&self, events: &[MachineEvent]) -> StoreResult<u64>;

    async fn aggregate_window(
        &self,
        filter: &WindowFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<WindowAggregate>;

    /// Per-group aggregates, in no particular order.
    async fn aggregate_grouped_window(
        &self,
        filter: &WindowFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group: GroupField,
    ) -> StoreResult<Vec<GroupAggregate>>;

    /// Check that the store can serve requests.
    async fn ping(&self) -> StoreResult<()>;
}
