// Main entry point for the publishing API server

use anyhow::{Context, Result};
use server_core::domains::job_handlers;
use server_core::kernel::build_server_deps;
use server_core::kernel::jobs::spawn_workers;
use server_core::{server::build_app, Config};
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
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting site publishing API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(env = ?config.app_env, "Configuration loaded");

    let port = config.port;
    let run_workers = config.run_workers;
    let concurrency = config.worker_concurrency;

    let deps = build_server_deps(config).await?;
    tracing::info!(provider = deps.hosting.name(), "Dependencies ready");

    // In-process workers (disable with RUN_WORKERS=false and run the worker binary)
    let shutdown = CancellationToken::new();
    let workers = if run_workers {
        spawn_workers(deps.jobs.clone(), job_handlers(&deps), concurrency, shutdown.clone())
    } else {
        Vec::new()
    };
    tracing::info!(workers = workers.len(), "Job workers started");

    let app = build_app(deps);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            server_shutdown.cancel();
        })
        .await
        .context("Server error")?;

    shutdown.cancel();
    for worker in workers {
        match worker.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Worker exited with error"),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            Ok(Ok(())) => {}
        }
    }

    Ok(())
}
