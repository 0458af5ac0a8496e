use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::event::MachineEvent;
use crate::store::{
    EventStore, GroupAggregate, GroupField, StoreError, StoreResult, WindowAggregate, WindowFilter,
};

/// EventStore kept in process memory, for local runs and tests.
///
/// `upsert_all` holds the write lock for the whole batch, so concurrent batches are applied
/// one after the other and every record always matches one submitted payload.
#[derive(Default)]
pub struct MemoryEventStore {
    events: RwLock<HashMap<String, MachineEvent>>,
    unavailable: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only `upsert_all` fail, reads keep working.
    pub fn set_fail_writes(&self, fail_writes: bool) {
        self.fail_writes.store(fail_writes, Ordering::SeqCst);
    }

    /// Number of `get_by_ids` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `upsert_all` calls applied so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn get(&self, event_id: &str) -> Option<MachineEvent> {
        self.events
            .read()
            .ok()
            .and_then(|events| events.get(event_id).cloned())
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_owned()))
        } else {
            Ok(())
        }
    }

    fn in_window<'a>(
        events: &'a HashMap<String, MachineEvent>,
        filter: &'a WindowFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a MachineEvent> {
        events.values().filter(move |event| {
            filter.matches(event) && event.event_time >= start && event.event_time < end
        })
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("poisoned memory store lock".to_owned())
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn get_by_ids(&self, ids: &[String]) -> StoreResult<Vec<MachineEvent>> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::SeqCst);

        let events = self.events.read().map_err(poisoned)?;
        Ok(ids.iter().filter_map(|id| events.get(id).cloned()).collect())
    }

    async fn upsert_all(&self, batch: &[MachineEvent]) -> StoreResult<u64> {
        self.check_available()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store rejected the write".to_owned(),
            ));
        }

        let mut events = self.events.write().map_err(poisoned)?;
        for event in batch {
            events.insert(event.event_id.clone(), event.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        debug!(rows = batch.len(), "upserted events in memory");
        Ok(batch.len() as u64)
    }

    async fn aggregate_window(
        &self,
        filter: &WindowFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<WindowAggregate> {
        self.check_available()?;

        let events = self.events.read().map_err(poisoned)?;
        Ok(Self::in_window(&events, filter, start, end).fold(
            WindowAggregate::default(),
            |mut aggregate, event| {
                aggregate.events_count += 1;
                aggregate.defects_count += event.counted_defects();
                aggregate
            },
        ))
    }

    async fn aggregate_grouped_window(
        &self,
        filter: &WindowFilter,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group: GroupField,
    ) -> StoreResult<Vec<GroupAggregate>> {
        self.check_available()?;

        let events = self.events.read().map_err(poisoned)?;
        let mut groups: BTreeMap<&str, WindowAggregate> = BTreeMap::new();
        for event in Self::in_window(&events, filter, start, end) {
            let aggregate = groups.entry(group.key(event)).or_default();
            aggregate.events_count += 1;
            aggregate.defects_count += event.counted_defects();
        }

        Ok(groups
            .into_iter()
            .map(|(key, aggregate)| GroupAggregate {
                group_key: key.to_owned(),
                total_defects: aggregate.defects_count,
                event_count: aggregate.events_count,
            })
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}
