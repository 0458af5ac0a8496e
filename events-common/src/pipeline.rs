use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use crate::enrichment::LineMapping;
use crate::event::{BatchResult, MachineEvent, RawEvent};
use crate::metrics::report_batch_outcome;
use crate::reconcile::{resolve, Reconciliation};
use crate::store::{EventStore, StoreResult};
use crate::time::TimeSource;
use crate::validation::{validate_duration, validate_event_time};

/// Records staged for the single upsert of a batch, keyed by event id in first-seen order.
#[derive(Default)]
struct WriteSet {
    events: Vec<MachineEvent>,
    positions: HashMap<String, usize>,
}

impl WriteSet {
    fn get(&self, event_id: &str) -> Option<&MachineEvent> {
        self.positions.get(event_id).map(|&i| &self.events[i])
    }

    /// Stage `event`, replacing an earlier staged record with the same id.
    fn stage(&mut self, event: MachineEvent) {
        match self.positions.get(&event.event_id) {
            Some(&i) => self.events[i] = event,
            None => {
                self.positions.insert(event.event_id.clone(), self.events.len());
                self.events.push(event);
            }
        }
    }

    fn into_events(self) -> Vec<MachineEvent> {
        self.events
    }
}

/// Validates, enriches and reconciles batches of raw events, then persists what changed.
///
/// A `process` call issues exactly one `get_by_ids` and at most one `upsert_all`, whatever
/// the batch size. Invalid events are rejected one by one; only a store failure fails the
/// whole call, and in that case nothing from the batch has been written.
#[derive(Clone)]
pub struct BatchProcessor {
    store: Arc<dyn EventStore + Send + Sync>,
    mapping: Arc<dyn LineMapping + Send + Sync>,
    timesource: Arc<dyn TimeSource + Send + Sync>,
}

impl BatchProcessor {
    pub fn new(
        store: Arc<dyn EventStore + Send + Sync>,
        mapping: Arc<dyn LineMapping + Send + Sync>,
        timesource: Arc<dyn TimeSource + Send + Sync>,
    ) -> Self {
        Self {
            store,
            mapping,
            timesource,
        }
    }

    #[instrument(skip_all, fields(batch_size = batch.len()))]
    pub async fn process(&self, batch: Vec<RawEvent>) -> StoreResult<BatchResult> {
        let now = self.timesource.now();

        let ids: Vec<String> = {
            let mut seen = HashSet::with_capacity(batch.len());
            batch
                .iter()
                .filter(|event| seen.insert(event.event_id.as_str()))
                .map(|event| event.event_id.clone())
                .collect()
        };

        let existing: HashMap<String, MachineEvent> = self
            .store
            .get_by_ids(&ids)
            .await?
            .into_iter()
            .map(|event| (event.event_id.clone(), event))
            .collect();

        let (summary, writes) = self.classify(batch, &existing, now);
        let writes = writes.into_events();

        if !writes.is_empty() {
            self.store.upsert_all(&writes).await?;
        }

        tracing::debug!(
            accepted = summary.accepted,
            deduped = summary.deduped,
            updated = summary.updated,
            rejected = summary.rejected,
            "processed batch"
        );
        report_batch_outcome(&summary);

        Ok(summary)
    }

    /// Pure part of `process`: decide the outcome of every event against `existing`.
    fn classify(
        &self,
        batch: Vec<RawEvent>,
        existing: &HashMap<String, MachineEvent>,
        now: DateTime<Utc>,
    ) -> (BatchResult, WriteSet) {
        let mut summary = BatchResult::default();
        let mut writes = WriteSet::default();

        for raw in batch {
            if let Err(reason) = validate_duration(raw.duration_ms) {
                summary.reject(raw.event_id, reason);
                continue;
            }

            let placement = self.mapping.enrich(&raw.machine_id);

            if let Err(reason) = validate_event_time(raw.event_time, now) {
                summary.reject(raw.event_id, reason);
                continue;
            }

            let event = MachineEvent::from_raw(raw, placement, now);

            // Repeats within a batch compare against what the batch already staged.
            let current = writes
                .get(&event.event_id)
                .or_else(|| existing.get(&event.event_id));

            match resolve(current, &event) {
                Reconciliation::New => {
                    summary.accepted += 1;
                    writes.stage(event);
                }
                Reconciliation::Identical => summary.deduped += 1,
                Reconciliation::Diverged => {
                    summary.updated += 1;
                    writes.stage(event);
                }
            }
        }

        (summary, writes)
    }
}
