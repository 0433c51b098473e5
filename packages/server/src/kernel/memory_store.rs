//! In-memory record store for tests and database-less local runs.
//!
//! One mutex guards all three record sets, so every multi-record operation
//! (deployment admission, primary swap) is atomic the same way a database
//! transaction would be.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::common::{DeploymentId, DomainError, DomainId, PublishError, WebsiteId};
use crate::domains::custom_domains::models::Domain;
use crate::domains::deployments::models::{Deployment, DeploymentStatus};
use crate::domains::website::models::Website;
use crate::kernel::{BaseDeploymentStore, BaseDomainStore, BaseWebsiteStore};

#[derive(Default)]
struct State {
    websites: HashMap<WebsiteId, Website>,
    deployments: HashMap<DeploymentId, Deployment>,
    domains: HashMap<DomainId, Domain>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_primary_swap: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Make the next primary swap fail between its unset and set steps.
    pub fn fail_next_primary_swap(&self) {
        self.fail_primary_swap.store(true, Ordering::SeqCst);
    }

    /// Write a domain as-is, primary flag included (fixtures).
    pub fn put_domain(&self, domain: Domain) -> Result<()> {
        self.lock()?.domains.insert(domain.id, domain);
        Ok(())
    }

    pub fn deployment_count(&self) -> usize {
        self.lock().map(|s| s.deployments.len()).unwrap_or(0)
    }
}

#[async_trait]
impl BaseWebsiteStore for MemoryStore {
    async fn find_website(&self, id: WebsiteId) -> Result<Option<Website>> {
        Ok(self.lock()?.websites.get(&id).cloned())
    }

    async fn insert_website(&self, website: Website) -> Result<Website> {
        self.lock()?.websites.insert(website.id, website.clone());
        Ok(website)
    }

    async fn record_deploy_success(
        &self,
        id: WebsiteId,
        deployment_id: DeploymentId,
        public_url: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.lock()?;
        let website = state
            .websites
            .get_mut(&id)
            .ok_or(PublishError::WebsiteNotFound(id))?;
        website.public_url = Some(public_url.to_string());
        website.last_deployed_at = Some(at);
        website.last_successful_deployment_id = Some(deployment_id);
        website.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl BaseDeploymentStore for MemoryStore {
    async fn create_deployment(&self, deployment: Deployment) -> Result<Deployment> {
        let mut state = self.lock()?;

        if !state.websites.contains_key(&deployment.website_id) {
            return Err(PublishError::WebsiteNotFound(deployment.website_id).into());
        }
        if let Some(active) = state
            .deployments
            .values()
            .find(|d| d.website_id == deployment.website_id && d.status.is_active())
        {
            return Err(PublishError::Conflict {
                website_id: deployment.website_id,
                active_deployment_id: active.id,
            }
            .into());
        }

        if let Some(website) = state.websites.get_mut(&deployment.website_id) {
            website.last_publish_requested_at = Some(deployment.created_at);
            website.updated_at = Utc::now();
        }
        state.deployments.insert(deployment.id, deployment.clone());
        Ok(deployment)
    }

    async fn find_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>> {
        Ok(self.lock()?.deployments.get(&id).cloned())
    }

    async fn find_deployments_by_website(&self, website_id: WebsiteId) -> Result<Vec<Deployment>> {
        let state = self.lock()?;
        let mut deployments: Vec<Deployment> = state
            .deployments
            .values()
            .filter(|d| d.website_id == website_id)
            .cloned()
            .collect();
        deployments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(deployments)
    }

    async fn find_active_deployment(&self, website_id: WebsiteId) -> Result<Option<Deployment>> {
        let state = self.lock()?;
        Ok(state
            .deployments
            .values()
            .find(|d| d.website_id == website_id && d.status.is_active())
            .cloned())
    }

    async fn find_queued_deployments(&self) -> Result<Vec<Deployment>> {
        let state = self.lock()?;
        let mut queued: Vec<Deployment> = state
            .deployments
            .values()
            .filter(|d| d.status == DeploymentStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(queued)
    }

    async fn update_active_deployment(&self, deployment: &Deployment) -> Result<bool> {
        let mut state = self.lock()?;
        let stored = state
            .deployments
            .get_mut(&deployment.id)
            .ok_or(PublishError::DeploymentNotFound(deployment.id))?;
        if stored.is_terminal() {
            return Ok(false);
        }
        *stored = deployment.clone();
        Ok(true)
    }
}

#[async_trait]
impl BaseDomainStore for MemoryStore {
    async fn create_domain(&self, domain: Domain) -> Result<Domain> {
        let mut state = self.lock()?;
        if state
            .domains
            .values()
            .any(|d| d.name.eq_ignore_ascii_case(&domain.name))
        {
            return Err(DomainError::AlreadyExists(domain.name).into());
        }
        state.domains.insert(domain.id, domain.clone());
        Ok(domain)
    }

    async fn find_domain(&self, id: DomainId) -> Result<Option<Domain>> {
        Ok(self.lock()?.domains.get(&id).cloned())
    }

    async fn find_domain_by_name(&self, name: &str) -> Result<Option<Domain>> {
        let state = self.lock()?;
        Ok(state
            .domains
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn find_domains_by_website(&self, website_id: WebsiteId) -> Result<Vec<Domain>> {
        let state = self.lock()?;
        let mut domains: Vec<Domain> = state
            .domains
            .values()
            .filter(|d| d.website_id == website_id)
            .cloned()
            .collect();
        domains.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(domains)
    }

    async fn update_domain(&self, domain: &Domain) -> Result<Domain> {
        let mut state = self.lock()?;
        let stored = state
            .domains
            .get_mut(&domain.id)
            .ok_or(DomainError::NotFound(domain.id))?;
        let is_primary = stored.is_primary && domain.is_live();
        *stored = Domain {
            is_primary,
            updated_at: Utc::now(),
            ..domain.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_domain(&self, id: DomainId) -> Result<bool> {
        let mut state = self.lock()?;
        match state.domains.get(&id) {
            Some(domain) if !domain.is_primary => {
                state.domains.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn swap_primary_domain(
        &self,
        website_id: WebsiteId,
        domain_id: DomainId,
    ) -> Result<bool> {
        let mut state = self.lock()?;

        // Work on a copy; only a fully successful swap is written back.
        let mut working: Vec<Domain> = state
            .domains
            .values()
            .filter(|d| d.website_id == website_id)
            .cloned()
            .collect();

        for domain in working.iter_mut() {
            domain.is_primary = false;
        }

        if self.fail_primary_swap.swap(false, Ordering::SeqCst) {
            bail!("simulated failure between primary unset and set");
        }

        let Some(target) = working
            .iter_mut()
            .find(|d| d.id == domain_id && d.is_live())
        else {
            return Ok(false);
        };
        target.is_primary = true;

        let now = Utc::now();
        for mut domain in working {
            domain.updated_at = now;
            state.domains.insert(domain.id, domain);
        }
        Ok(true)
    }
}
