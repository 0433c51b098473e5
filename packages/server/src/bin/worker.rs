//! Standalone job worker.
//!
//! Runs the deployment and domain-verification workers without the HTTP
//! API. Start as many as needed; they compete for jobs through the shared
//! queue store, so `DATABASE_URL` should be set.

use anyhow::{Context, Result};
use server_core::domains::job_handlers;
use server_core::kernel::build_server_deps;
use server_core::kernel::jobs::spawn_workers;
use server_core::Config;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    if config.database_url.is_none() {
        tracing::warn!("DATABASE_URL not set; this worker only sees its own in-memory queue");
    }
    let concurrency = config.worker_concurrency;

    let deps = build_server_deps(config).await?;
    let shutdown = CancellationToken::new();
    let workers = spawn_workers(deps.jobs.clone(), job_handlers(&deps), concurrency, shutdown.clone());
    tracing::info!(workers = workers.len(), provider = deps.hosting.name(), "Worker process started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested; finishing running jobs");
    shutdown.cancel();

    for worker in workers {
        match worker.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Worker exited with error"),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            Ok(Ok(())) => {}
        }
    }

    tracing::info!("Worker process stopped");
    Ok(())
}
