//! Server dependencies for activities (using traits for testability)
//!
//! This module provides the central dependency container used by the
//! publishing and domain activities, the job handlers and the HTTP routes.
//! All external services use trait abstractions to enable testing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::Config;
use crate::kernel::dns::HickoryDnsResolver;
use crate::kernel::hosting::build_hosting_provider;
use crate::kernel::jobs::{JobQueue, MemoryJobQueue, PostgresJobQueue};
use crate::kernel::memory_store::MemoryStore;
use crate::kernel::postgres_store::PostgresStore;
use crate::kernel::probe::HttpProber;
use crate::kernel::{
    BaseDeploymentStore, BaseDnsResolver, BaseDomainStore, BaseEndpointProber,
    BaseHostingProvider, BaseWebsiteStore,
};

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to activities (using traits for testability)
#[derive(Clone)]
pub struct ServerDeps {
    pub config: Arc<Config>,
    pub websites: Arc<dyn BaseWebsiteStore>,
    pub deployments: Arc<dyn BaseDeploymentStore>,
    pub domains: Arc<dyn BaseDomainStore>,
    pub hosting: Arc<dyn BaseHostingProvider>,
    pub dns: Arc<dyn BaseDnsResolver>,
    pub prober: Arc<dyn BaseEndpointProber>,
    pub jobs: Arc<dyn JobQueue>,
}

impl ServerDeps {
    /// Create new ServerDeps with the given dependencies
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        websites: Arc<dyn BaseWebsiteStore>,
        deployments: Arc<dyn BaseDeploymentStore>,
        domains: Arc<dyn BaseDomainStore>,
        hosting: Arc<dyn BaseHostingProvider>,
        dns: Arc<dyn BaseDnsResolver>,
        prober: Arc<dyn BaseEndpointProber>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            websites,
            deployments,
            domains,
            hosting,
            dns,
            prober,
            jobs,
        }
    }
}

/// Build production dependencies from configuration.
///
/// With `DATABASE_URL` set, records and jobs live in PostgreSQL (migrations
/// are applied); without it everything is in memory and lost on exit.
pub async fn build_server_deps(config: Config) -> Result<ServerDeps> {
    let hosting = build_hosting_provider(&config.hosting, config.app_env)?;
    let dns: Arc<dyn BaseDnsResolver> =
        Arc::new(HickoryDnsResolver::new(config.domains.probe_timeout));
    let prober: Arc<dyn BaseEndpointProber> =
        Arc::new(HttpProber::new(config.domains.probe_timeout));

    if config.hosting.webhook_secret.is_none() {
        warn!("HOSTING_WEBHOOK_SECRET not set; webhook signatures will not be checked");
    }

    let (websites, deployments, domains, jobs): (
        Arc<dyn BaseWebsiteStore>,
        Arc<dyn BaseDeploymentStore>,
        Arc<dyn BaseDomainStore>,
        Arc<dyn JobQueue>,
    ) = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
                .context("Failed to connect to database")?;

            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;

            let store = Arc::new(PostgresStore::new(pool.clone()));
            (
                store.clone(),
                store.clone(),
                store,
                Arc::new(PostgresJobQueue::new(pool)),
            )
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory stores");
            let store = Arc::new(MemoryStore::new());
            (
                store.clone(),
                store.clone(),
                store,
                Arc::new(MemoryJobQueue::new()),
            )
        }
    };

    Ok(ServerDeps::new(
        Arc::new(config),
        websites,
        deployments,
        domains,
        hosting,
        dns,
        prober,
        jobs,
    ))
}
