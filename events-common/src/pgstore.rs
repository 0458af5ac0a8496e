use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, instrument};

use crate::event::MachineEvent;
use crate::store::{
    EventStore, GroupAggregate, GroupField, StoreError, StoreResult, WindowAggregate, WindowFilter,
};

/// Sum of defect counts with the unknown sentinel counted as zero.
const COUNTED_DEFECTS: &str =
    "COALESCE(SUM(CASE WHEN defect_count <> -1 THEN defect_count ELSE 0 END), 0)::BIGINT";

/// An EventStore implemented on top of a PostgreSQL table.
///
/// Each `upsert_all` runs as one transaction holding a single `INSERT .. ON CONFLICT`
/// statement, so a batch is written entirely or not at all. Concurrent upserts of the same
/// id serialize on the row lock: the last one to commit wins and the row always holds one
/// complete submitted payload.
#[derive(Clone)]
pub struct PgEventStore {
    table: String,
    pool: PgPool,
}

impl PgEventStore {
    /// Connect to PostgreSQL and store events in `table`.
    pub async fn new(
        table: &str,
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        Ok(Self::new_from_pool(table, pool))
    }

    pub fn new_from_pool(table: &str, pool: PgPool) -> Self {
        Self {
            table: table.to_owned(),
            pool,
        }
    }
}

fn query_error(command: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |error| StoreError::QueryError {
        command: command.to_owned(),
        error,
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    #[instrument(skip_all, fields(ids = ids.len()))]
    async fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<MachineEvent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            r#"
SELECT
    event_id, machine_id, line_id, factory_id, event_time, received_time, duration_ms, defect_count
FROM
    "{0}"
WHERE
    event_id = ANY($1)
            "#,
            &self.table
        );

        let start = Instant::now();
        let events: Vec<MachineEvent> = sqlx::query_as(&query)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT"))?;
        metrics::histogram!("machine_events_store_seconds", "command" => "get_by_ids")
            .record(start.elapsed().as_secs_f64());

        Ok(events)
    }

    #[instrument(skip_all, fields(rows = events.len()))]
    async fn upsert_all(&self, events: &[MachineEvent]) -> StoreResult<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut event_ids = Vec::with_capacity(events.len());
        let mut machine_ids = Vec::with_capacity(events.len());
        let mut line_ids = Vec::with_capacity(events.len());
        let mut factory_ids = Vec::with_capacity(events.len());
        let mut event_times = Vec::with_capacity(events.len());
        let mut received_times = Vec::with_capacity(events.len());
        let mut durations = Vec::with_capacity(events.len());
        let mut defect_counts = Vec::with_capacity(events.len());
        for event in events {
            event_ids.push(event.event_id.clone());
            machine_ids.push(event.machine_id.clone());
            line_ids.push(event.line_id.clone());
            factory_ids.push(event.factory_id.clone());
            event_times.push(event.event_time);
            received_times.push(event.received_time);
            durations.push(event.duration_ms);
            defect_counts.push(event.defect_count);
        }

        let query = format!(
            r#"
INSERT INTO "{0}"
    (event_id, machine_id, line_id, factory_id, event_time, received_time, duration_ms, defect_count)
SELECT * FROM UNNEST(
    $1::text[], $2::text[], $3::text[], $4::text[],
    $5::timestamptz[], $6::timestamptz[], $7::bigint[], $8::integer[]
)
ON CONFLICT (event_id) DO UPDATE SET
    machine_id = EXCLUDED.machine_id,
    line_id = EXCLUDED.line_id,
    factory_id = EXCLUDED.factory_id,
    event_time = EXCLUDED.event_time,
    received_time = EXCLUDED.received_time,
    duration_ms = EXCLUDED.duration_ms,
    defect_count = EXCLUDED.defect_count
            "#,
            &self.table
        );

        let start = Instant::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|error| StoreError::ConnectionError { error })?;

        let result = sqlx::query(&query)
            .bind(&event_ids)
            .bind(&machine_ids)
            .bind(&line_ids)
            .bind(&factory_ids)
            .bind(&event_times)
            .bind(&received_times)
            .bind(&durations)
            .bind(&defect_counts)
            .execute(&mut *tx)
            .await;

        let rows = match result {
            Ok(result) => result.rows_affected(),
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    debug!("rollback after failed upsert also failed: {}", rollback_error);
                }
                return Err(StoreError::QueryError {
                    command: "INSERT".to_owned(),
                    error,
                });
            }
        };

        tx.commit().await.map_err(query_error("COMMIT"))?;
        metrics::histogram!("machine_events_store_seconds", "command" => "upsert_all")
            .record(start.elapsed().as_secs_f64());

        Ok(rows)
    }

    #[instrument(skip_all, fields(filter = filter.value()))]
    async fn aggregate_window(
        &self,
        filter: &WindowFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<WindowAggregate> {
        let query = format!(
            r#"
SELECT
    COUNT(*) AS events_count,
    {1} AS defects_count
FROM
    "{0}"
WHERE
    {2} = $1
    AND event_time >= $2
    AND event_time < $3
            "#,
            &self.table,
            COUNTED_DEFECTS,
            filter.column()
        );

        sqlx::query_as(&query)
            .bind(filter.value())
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    #[instrument(skip_all, fields(filter = filter.value(), group = group.column()))]
    async fn aggregate_grouped_window(
        &self,
        filter: &WindowFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group: GroupField,
    ) -> StoreResult<Vec<GroupAggregate>> {
        let query = format!(
            r#"
SELECT
    {3} AS group_key,
    {1} AS total_defects,
    COUNT(*) AS event_count
FROM
    "{0}"
WHERE
    {2} = $1
    AND event_time >= $2
    AND event_time < $3
GROUP BY
    {3}
            "#,
            &self.table,
            COUNTED_DEFECTS,
            filter.column(),
            group.column()
        );

        sqlx::query_as(&query)
            .bind(filter.value())
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("SELECT"))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(query_error("SELECT"))
    }
}
