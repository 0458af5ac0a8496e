mod app;
mod ingest;
mod stats;

pub use app::{add_routes, AppState};
