//! Trellis Subscription API
//!
//! HTTP front end of the subscription lifecycle engine. Creating a
//! subscription persists it as `PENDING` and enqueues a creation event; the
//! activation worker (standalone, or embedded with `EMBEDDED_WORKER=true`)
//! later moves it into its trial period.
//!
//! ## REST Endpoints
//!
//! All endpoints expect the authenticated caller in `X-User-Id`.
//!
//! - `POST /subscriptions` - Create a subscription
//! - `GET /subscriptions/{id}` - Get one of the caller's subscriptions
//! - `DELETE /subscriptions/{id}` - Cancel one of the caller's subscriptions
//!
//! ## Health Endpoints
//!
//! - `GET /health` - Liveness probe
//! - `GET /ready` - Readiness probe
//! - `GET /metrics` - Prometheus metrics

mod config;
mod error;
mod extractors;
mod handlers;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use trellis_db::Repositories;
use trellis_lifecycle::metrics::OPERATION_DURATION_SECONDS;
use trellis_lifecycle::{ActivationWorker, LogNotifier, PgEventQueue};

use crate::config::Config;
use crate::state::{AppState, PgLifecycleService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("subscription_api=debug".parse()?)
                .add_directive("trellis_lifecycle=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Trellis Subscription API");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        http_port = config.http_port,
        embedded_worker = config.embedded_worker,
        "Configuration loaded"
    );

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        Some(setup_metrics()?)
    } else {
        None
    };

    // Create database pool and bring the schema up to date
    let pool = trellis_db::create_pool(&config.database_url).await?;
    trellis_db::run_migrations(&pool).await?;
    tracing::info!("Database pool created");

    let repos = Repositories::new(pool.clone());
    let queue = PgEventQueue::new(pool.clone());

    let lifecycle = PgLifecycleService::new(
        config.lifecycle.clone(),
        Arc::new(repos.subscriptions.clone()),
        Arc::new(repos.users),
        Arc::new(queue.clone()),
    );

    // Embedded worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = config.embedded_worker.then(|| {
        let worker = ActivationWorker::new(
            config.worker.clone(),
            Arc::new(repos.subscriptions),
            Arc::new(LogNotifier),
        );
        let consumer = queue
            .consumer(config.lifecycle.channel.clone())
            .with_poll_interval(config.worker_poll_interval)
            .with_visibility_timeout(config.worker_visibility_timeout)
            .with_requeue_delay(config.worker.requeue_delay);
        tokio::spawn(async move { worker.run(consumer, shutdown_rx).await })
    });

    let state = AppState::new(lifecycle, pool, config.request_timeout);
    let app = routes::build_router(state, metrics_handle);

    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let served = run_http_server(app, http_addr).await;

    // Stop the worker after the last in-flight request has finished
    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        if let Err(e) = handle.await {
            tracing::error!(error = ?e, "Embedded worker task failed");
        }
    }

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_http_server(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn setup_metrics() -> anyhow::Result<PrometheusHandle> {
    // Most operations are a single row read or write
    let latency_buckets = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.2, 0.5, 1.0, 2.5];

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(OPERATION_DURATION_SECONDS.to_string()),
            latency_buckets,
        )?
        .install_recorder()?;

    trellis_lifecycle::metrics::describe();

    Ok(handle)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
