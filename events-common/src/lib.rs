pub mod aggregation;
pub mod enrichment;
pub mod event;
pub mod memory;
pub mod metrics;
pub mod pgstore;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod time;
pub mod validation;
