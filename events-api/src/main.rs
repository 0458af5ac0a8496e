use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use eyre::Result;
use tokio::signal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use events_api::config::Config;
use events_api::handlers::{self, AppState};
use events_common::aggregation::StatsEngine;
use events_common::enrichment::BoundaryLineMapping;
use events_common::memory::MemoryEventStore;
use events_common::metrics::setup_metrics_routes;
use events_common::pgstore::PgEventStore;
use events_common::pipeline::BatchProcessor;
use events_common::store::EventStore;
use events_common::time::SystemTime;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("Shutdown status change: TERMINATING");
}

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown())
        .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::init_from_env()?;

    let store: Arc<dyn EventStore + Send + Sync> = if config.in_memory_store {
        tracing::warn!("using the in-memory event store, events are lost on restart");
        Arc::new(MemoryEventStore::new())
    } else {
        Arc::new(
            PgEventStore::new(
                &config.table_name,
                &config.database_url,
                config.max_pg_connections,
                config.pg_acquire_timeout(),
            )
            .await?,
        )
    };

    let processor = BatchProcessor::new(
        store.clone(),
        Arc::new(BoundaryLineMapping::from(config.line_mapping.clone())),
        Arc::new(SystemTime {}),
    );
    let state = AppState {
        processor,
        stats: StatsEngine::new(store.clone()),
        store,
    };

    let app = handlers::add_routes(
        Router::new(),
        state,
        config.max_body_size,
        config.concurrency_limit,
    );
    let app = if config.export_prometheus {
        setup_metrics_routes(app)?
    } else {
        app
    };

    let bind = config.bind();
    tracing::info!("machine events api listening on {}", bind);

    listen(app, bind).await
}
