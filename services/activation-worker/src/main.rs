//! Trellis Activation Worker
//!
//! Consumes subscription creation events from the durable PostgreSQL queue
//! and moves `PENDING` subscriptions into their trial period. Several
//! instances may run side by side; each event is leased to one of them.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use trellis_db::Repositories;
use trellis_lifecycle::{ActivationWorker, LogNotifier, PgEventQueue};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("activation_worker=debug".parse()?)
                .add_directive("trellis_lifecycle=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Trellis Activation Worker");

    let config = Config::from_env()?;
    tracing::info!(
        channel = %config.channel,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        ack_mode = ?config.worker.ack_mode,
        "Configuration loaded"
    );

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
        trellis_lifecycle::metrics::describe();
        tracing::info!(port, "Metrics endpoint listening");
    }

    let pool = trellis_db::create_pool(&config.database_url).await?;
    trellis_db::run_migrations(&pool).await?;
    tracing::info!("Database pool created");

    let repos = Repositories::new(pool.clone());
    let consumer = PgEventQueue::new(pool)
        .consumer(config.channel.clone())
        .with_poll_interval(config.poll_interval)
        .with_visibility_timeout(config.visibility_timeout)
        .with_requeue_delay(config.worker.requeue_delay);

    let worker = ActivationWorker::new(
        config.worker.clone(),
        Arc::new(repos.subscriptions),
        Arc::new(LogNotifier),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { worker.run(consumer, shutdown_rx).await });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    handle.await?;

    tracing::info!("Shutdown complete");
    Ok(())
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

    tracing::info!("Shutdown signal received, draining current event");
}
