use crate::event::MachineEvent;

/// How an incoming event relates to what is already stored under its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    New,
    Identical,
    Diverged,
}

/// Classify `incoming` against the stored record with the same id, if any.
///
/// Only the client-supplied payload is compared. `line_id` and `factory_id` derive from
/// `machine_id`, and `received_time` is assigned on every write, so none of them take part.
pub fn resolve(existing: Option<&MachineEvent>, incoming: &MachineEvent) -> Reconciliation {
    match existing {
        None => Reconciliation::New,
        Some(existing) if same_payload(existing, incoming) => Reconciliation::Identical,
        Some(_) => Reconciliation::Diverged,
    }
}

fn same_payload(existing: &MachineEvent, incoming: &MachineEvent) -> bool {
    existing.machine_id == incoming.machine_id
        && existing.duration_ms == incoming.duration_ms
        && existing.defect_count == incoming.defect_count
        && existing.event_time == incoming.event_time
}
