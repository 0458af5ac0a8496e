//! Read side: windowed statistics computed straight from the store on every query.
use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::event::{MachineStats, MachineStatus, TopDefectLine};
use crate::store::{EventStore, GroupAggregate, GroupField, StoreResult, WindowFilter};

pub const DEFAULT_TOP_LINES_LIMIT: usize = 10;

/// Defects per hour at or above which a machine is reported as `Warning`.
pub const WARNING_DEFECT_RATE: f64 = 2.0;

/// Round half up to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0 + 0.5).floor() / 100.0
}

fn window_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 3600.0
}

/// Highest total first, ties broken by line id ascending.
fn by_defects_desc(a: &GroupAggregate, b: &GroupAggregate) -> Ordering {
    b.total_defects
        .cmp(&a.total_defects)
        .then_with(|| a.group_key.cmp(&b.group_key))
}

#[derive(Clone)]
pub struct StatsEngine {
    store: Arc<dyn EventStore + Send + Sync>,
}

impl StatsEngine {
    pub fn new(store: Arc<dyn EventStore + Send + Sync>) -> Self {
        Self { store }
    }

    /// Event count, defect sum and hourly defect rate of a machine over `[start, end)`.
    #[instrument(skip(self))]
    pub async fn machine_stats(
        &self,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<MachineStats> {
        let aggregate = self
            .store
            .aggregate_window(&WindowFilter::Machine(machine_id.to_owned()), start, end)
            .await?;

        let hours = window_hours(start, end);
        let avg_defect_rate = if hours > 0.0 {
            round2(aggregate.defects_count as f64 / hours)
        } else {
            0.0
        };
        let status = if avg_defect_rate >= WARNING_DEFECT_RATE {
            MachineStatus::Warning
        } else {
            MachineStatus::Healthy
        };

        Ok(MachineStats {
            machine_id: machine_id.to_owned(),
            start,
            end,
            events_count: aggregate.events_count,
            defects_count: aggregate.defects_count,
            avg_defect_rate,
            status,
        })
    }

    /// The `limit` lines of a factory with the most defects over `[from, to)`.
    #[instrument(skip(self))]
    pub async fn top_defect_lines(
        &self,
        factory_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<TopDefectLine>> {
        let mut groups = self
            .store
            .aggregate_grouped_window(
                &WindowFilter::Factory(factory_id.to_owned()),
                from,
                to,
                GroupField::Line,
            )
            .await?;
        groups.sort_by(by_defects_desc);

        Ok(groups
            .into_iter()
            .take(limit)
            .map(|group| {
                let defects_percent = if group.event_count > 0 {
                    round2(group.total_defects as f64 * 100.0 / group.event_count as f64)
                } else {
                    0.0
                };
                TopDefectLine {
                    line_id: group.group_key,
                    total_defects: group.total_defects,
                    event_count: group.event_count,
                    defects_percent,
                }
            })
            .collect())
    }
}
