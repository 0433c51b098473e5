// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Publishing and domain logic are activity functions that use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseDeploymentStore, BaseDnsResolver)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hosting_client::{HostingError, VerificationRecord};

use crate::common::{DeploymentId, DomainId, WebsiteId};
use crate::domains::custom_domains::models::{DnsRecordType, Domain};
use crate::domains::deployments::models::Deployment;
use crate::domains::website::models::Website;
use crate::kernel::dns::DnsLookupError;
use crate::kernel::hosting::{DeployBundle, ProviderDeployment};
use crate::kernel::probe::{ProbeError, ProbeResponse};

// =============================================================================
// Repository Traits (Infrastructure - record persistence)
// =============================================================================

#[async_trait]
pub trait BaseWebsiteStore: Send + Sync {
    async fn find_website(&self, id: WebsiteId) -> Result<Option<Website>>;

    async fn insert_website(&self, website: Website) -> Result<Website>;

    /// Point the website at a successful deployment.
    async fn record_deploy_success(
        &self,
        id: WebsiteId,
        deployment_id: DeploymentId,
        public_url: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
pub trait BaseDeploymentStore: Send + Sync {
    /// Insert a queued deployment and stamp the website's
    /// `last_publish_requested_at`, atomically.
    ///
    /// Fails with `PublishError::Conflict` when the website already has a
    /// queued or in-progress deployment; nothing is written in that case.
    async fn create_deployment(&self, deployment: Deployment) -> Result<Deployment>;

    async fn find_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>>;

    /// Newest first.
    async fn find_deployments_by_website(&self, website_id: WebsiteId) -> Result<Vec<Deployment>>;

    async fn find_active_deployment(&self, website_id: WebsiteId) -> Result<Option<Deployment>>;

    /// All queued deployments, oldest first.
    async fn find_queued_deployments(&self) -> Result<Vec<Deployment>>;

    /// Persist the deployment only if the stored record is still queued or
    /// in progress. Returns whether anything was written; a finished
    /// deployment is never overwritten.
    async fn update_active_deployment(&self, deployment: &Deployment) -> Result<bool>;
}

#[async_trait]
pub trait BaseDomainStore: Send + Sync {
    /// Fails with `DomainError::AlreadyExists` when the name is taken by any
    /// website (case-insensitive).
    async fn create_domain(&self, domain: Domain) -> Result<Domain>;

    async fn find_domain(&self, id: DomainId) -> Result<Option<Domain>>;

    async fn find_domain_by_name(&self, name: &str) -> Result<Option<Domain>>;

    async fn find_domains_by_website(&self, website_id: WebsiteId) -> Result<Vec<Domain>>;

    /// Persist status, verification and record fields. Never sets
    /// `is_primary`; clears it in the same write when the domain is no
    /// longer active and verified.
    async fn update_domain(&self, domain: &Domain) -> Result<Domain>;

    /// Delete a non-primary domain. Returns false when the domain is
    /// primary or missing.
    async fn delete_domain(&self, id: DomainId) -> Result<bool>;

    /// Clear the website's primary flag and set it on `domain_id` in one
    /// transaction. Returns false, with nothing changed, when the target is
    /// not an active verified domain of that website.
    async fn swap_primary_domain(&self, website_id: WebsiteId, domain_id: DomainId)
        -> Result<bool>;
}

// =============================================================================
// Hosting Provider Trait (Infrastructure - static file hosting)
// =============================================================================

#[async_trait]
pub trait BaseHostingProvider: Send + Sync {
    /// Upload a rendered file set. Returns a normalized `https://` URL.
    async fn deploy(&self, bundle: &DeployBundle) -> Result<ProviderDeployment, HostingError>;

    /// Attach a custom domain on the provider side. Returns any extra
    /// verification records the provider asks for.
    async fn register_domain(&self, name: &str) -> Result<Vec<VerificationRecord>, HostingError>;

    fn name(&self) -> &'static str;
}

// =============================================================================
// Network Probe Traits (Infrastructure - DNS and HTTP reachability)
// =============================================================================

#[async_trait]
pub trait BaseDnsResolver: Send + Sync {
    /// Resolve live records. Values are rendered as text: IPs for A/AAAA,
    /// hostnames for CNAME, unquoted strings for TXT, `<pref> <host>` for MX.
    async fn lookup(
        &self,
        record_type: DnsRecordType,
        name: &str,
    ) -> Result<Vec<String>, DnsLookupError>;
}

#[async_trait]
pub trait BaseEndpointProber: Send + Sync {
    /// GET `url`, following redirects.
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError>;
}
