use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, extract::State, routing, Router};
use events_common::aggregation::StatsEngine;
use events_common::pipeline::BatchProcessor;
use events_common::store::EventStore;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use super::{ingest, stats};
use crate::api::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub processor: BatchProcessor,
    pub stats: StatsEngine,
    pub store: Arc<dyn EventStore + Send + Sync>,
}

pub fn add_routes(
    router: Router,
    state: AppState,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    router
        .route("/", routing::get(index))
        .route("/_liveness", routing::get(index))
        .route(
            "/_readiness",
            routing::get(readiness).with_state(state.clone()),
        )
        .route(
            "/events/batch",
            routing::post(ingest::post_batch)
                .with_state(state.clone())
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
                .layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/events/stats",
            routing::get(stats::get_machine_stats).with_state(state.clone()),
        )
        .route(
            "/events/stats/top-defect-lines",
            routing::get(stats::get_top_defect_lines).with_state(state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(
            events_common::metrics::track_metrics,
        ))
}

pub async fn index() -> &'static str {
    "machine events api"
}

/// Ready once the event store answers.
pub async fn readiness(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.store.ping().await?;
    Ok("ready")
}
