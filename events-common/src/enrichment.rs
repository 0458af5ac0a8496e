//! Machine to line/factory placement.
//!
//! The mapping is a stand-in business rule, so the batch processor only sees the
//! `LineMapping` trait. Swap the implementation to change placement without touching
//! validation or persistence.
use crate::event::Placement;

pub trait LineMapping {
    fn enrich(&self, machine_id: &str) -> Placement;
}

impl<F> LineMapping for F
where
    F: Fn(&str) -> Placement,
{
    fn enrich(&self, machine_id: &str) -> Placement {
        self(machine_id)
    }
}

/// Single factory, two lines split on a machine id boundary. Machine ids compare as plain
/// strings, so `M-2` sorts after `M-010`.
#[derive(Debug, Clone)]
pub struct BoundaryLineMapping {
    pub factory_id: String,
    /// Highest machine id (inclusive) that belongs to `lower_line_id`.
    pub boundary_machine_id: String,
    pub lower_line_id: String,
    pub upper_line_id: String,
}

impl Default for BoundaryLineMapping {
    fn default() -> Self {
        Self {
            factory_id: "F01".to_owned(),
            boundary_machine_id: "M-010".to_owned(),
            lower_line_id: "LINE-01".to_owned(),
            upper_line_id: "LINE-02".to_owned(),
        }
    }
}

impl LineMapping for BoundaryLineMapping {
    fn enrich(&self, machine_id: &str) -> Placement {
        let line_id = if machine_id <= self.boundary_machine_id.as_str() {
            &self.lower_line_id
        } else {
            &self.upper_line_id
        };

        Placement {
            factory_id: self.factory_id.clone(),
            line_id: line_id.clone(),
        }
    }
}
