//! PostgreSQL record store. Queries live on the models; this adapter adds
//! the transactions and maps constraint violations to domain errors.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::common::{DeploymentId, DomainError, DomainId, PublishError, WebsiteId};
use crate::domains::custom_domains::models::Domain;
use crate::domains::deployments::models::Deployment;
use crate::domains::website::models::Website;
use crate::kernel::{BaseDeploymentStore, BaseDomainStore, BaseWebsiteStore};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .is_some_and(|e| e.is_unique_violation())
}

#[async_trait]
impl BaseWebsiteStore for PostgresStore {
    async fn find_website(&self, id: WebsiteId) -> Result<Option<Website>> {
        Website::find_by_id(id, &self.pool).await
    }

    async fn insert_website(&self, website: Website) -> Result<Website> {
        website.insert(&self.pool).await
    }

    async fn record_deploy_success(
        &self,
        id: WebsiteId,
        deployment_id: DeploymentId,
        public_url: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        Website::mark_deployed(id, deployment_id, public_url, at, &self.pool).await
    }
}

#[async_trait]
impl BaseDeploymentStore for PostgresStore {
    async fn create_deployment(&self, deployment: Deployment) -> Result<Deployment> {
        let website_id = deployment.website_id;
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent publishes of the same website.
        if !Website::lock_for_update(website_id, &mut *tx).await? {
            return Err(PublishError::WebsiteNotFound(website_id).into());
        }

        if let Some(active) = Deployment::find_active_for_update(website_id, &mut *tx).await? {
            return Err(PublishError::Conflict {
                website_id,
                active_deployment_id: active.id,
            }
            .into());
        }

        let inserted = match deployment.insert(&mut *tx).await {
            Ok(inserted) => inserted,
            Err(e) => {
                let unique = e
                    .downcast_ref::<sqlx::Error>()
                    .is_some_and(is_unique_violation);
                if !unique {
                    return Err(e);
                }
                drop(tx);
                let active = Deployment::find_active(website_id, &self.pool)
                    .await?
                    .map(|d| d.id)
                    .unwrap_or(deployment.id);
                return Err(PublishError::Conflict {
                    website_id,
                    active_deployment_id: active,
                }
                .into());
            }
        };

        Website::mark_publish_requested(website_id, inserted.created_at, &mut *tx).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn find_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>> {
        Deployment::find_by_id(id, &self.pool).await
    }

    async fn find_deployments_by_website(&self, website_id: WebsiteId) -> Result<Vec<Deployment>> {
        Deployment::find_by_website(website_id, &self.pool).await
    }

    async fn find_active_deployment(&self, website_id: WebsiteId) -> Result<Option<Deployment>> {
        Deployment::find_active(website_id, &self.pool).await
    }

    async fn find_queued_deployments(&self) -> Result<Vec<Deployment>> {
        Deployment::find_queued(&self.pool).await
    }

    async fn update_active_deployment(&self, deployment: &Deployment) -> Result<bool> {
        deployment.update_if_active(&self.pool).await
    }
}

#[async_trait]
impl BaseDomainStore for PostgresStore {
    async fn create_domain(&self, domain: Domain) -> Result<Domain> {
        match domain.insert(&self.pool).await {
            Ok(inserted) => Ok(inserted),
            Err(e) if is_unique_violation(&e) => Err(DomainError::AlreadyExists(domain.name).into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_domain(&self, id: DomainId) -> Result<Option<Domain>> {
        Domain::find_by_id(id, &self.pool).await
    }

    async fn find_domain_by_name(&self, name: &str) -> Result<Option<Domain>> {
        Domain::find_by_name(name, &self.pool).await
    }

    async fn find_domains_by_website(&self, website_id: WebsiteId) -> Result<Vec<Domain>> {
        Domain::find_by_website(website_id, &self.pool).await
    }

    async fn update_domain(&self, domain: &Domain) -> Result<Domain> {
        domain.update(&self.pool).await
    }

    async fn delete_domain(&self, id: DomainId) -> Result<bool> {
        Domain::delete_non_primary(id, &self.pool).await
    }

    async fn swap_primary_domain(
        &self,
        website_id: WebsiteId,
        domain_id: DomainId,
    ) -> Result<bool> {
        Domain::swap_primary(website_id, domain_id, &self.pool).await
    }
}
