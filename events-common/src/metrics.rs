use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
    routing::get, Router,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::event::BatchResult;

/// Add a `/metrics` route rendering everything recorded by the global Prometheus recorder.
/// Installing the recorder can only happen once per process, so tests leave this out.
pub fn setup_metrics_routes(router: Router) -> Result<Router, BuildError> {
    let recorder_handle = setup_metrics_recorder()?;

    Ok(router.route(
        "/metrics",
        get(move || std::future::ready(recorder_handle.render())),
    ))
}

pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(EXPONENTIAL_SECONDS)?
        .install_recorder()
}

/// Middleware to record some common HTTP metrics
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };

    let method = req.method().clone();

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];

    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    response
}

/// Count the outcome of every event of a processed batch.
pub fn report_batch_outcome(summary: &BatchResult) {
    let outcomes = [
        ("accepted", summary.accepted),
        ("deduped", summary.deduped),
        ("updated", summary.updated),
    ];
    for (outcome, count) in outcomes {
        metrics::counter!("machine_events_processed_total", "outcome" => outcome)
            .increment(count as u64);
    }
    for rejection in &summary.rejections {
        metrics::counter!(
            "machine_events_processed_total",
            "outcome" => "rejected",
            "reason" => rejection.reason.as_str()
        )
        .increment(1);
    }

    metrics::histogram!("machine_events_batch_size").record(
        (summary.reconciled() + summary.rejected) as f64,
    );
}
