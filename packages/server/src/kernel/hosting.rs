//! Hosting provider strategies.
//!
//! The provider is chosen once, when dependencies are built:
//!
//! - [`LiveHostingProvider`] calls the real API through `hosting_client`
//! - [`SimulatedHostingProvider`] never leaves the process and returns
//!   `https://<slug>-<8 hex>.<host>` URLs
//! - [`FallbackHostingProvider`] tries live first and degrades to simulated
//!   (non-production only)

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use hosting_client::{
    normalize_url, DeployFile, DeployMeta, DeployRequest, HostingClient, HostingError,
    VerificationRecord,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::{DeploymentId, WebsiteId};
use crate::config::{AppEnv, HostingConfig, ProviderMode};
use crate::kernel::BaseHostingProvider;

/// Packaged build output ready for upload.
#[derive(Debug, Clone)]
pub struct DeployBundle {
    pub deployment_id: DeploymentId,
    pub website_id: WebsiteId,
    /// Provider project/deployment name; the website slug.
    pub name: String,
    pub files: Vec<DeployFile>,
    /// Custom domain to alias the deployment to.
    pub alias: Option<String>,
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDeployment {
    /// Normalized `https://` URL.
    pub url: String,
    pub provider_deployment_id: Option<String>,
    /// True when no real provider was involved; the URL is not reachable.
    pub simulated: bool,
}

// =============================================================================
// Live
// =============================================================================

pub struct LiveHostingProvider {
    client: HostingClient,
}

impl LiveHostingProvider {
    pub fn new(client: HostingClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &HostingConfig, token: &str) -> Result<Self> {
        let mut client = HostingClient::with_timeout(token, config.request_timeout)?;
        if let Some(url) = &config.api_url {
            client = client.with_base_url(url);
        }
        if let Some(project) = &config.project_id {
            client = client.with_project(project);
        }
        if let Some(team) = &config.team_id {
            client = client.with_team(team);
        }
        Ok(Self::new(client))
    }
}

#[async_trait]
impl BaseHostingProvider for LiveHostingProvider {
    async fn deploy(&self, bundle: &DeployBundle) -> Result<ProviderDeployment, HostingError> {
        let request = DeployRequest {
            name: bundle.name.clone(),
            files: bundle.files.clone(),
            project_id: self.client.project_id().map(str::to_string),
            target: "production".to_string(),
            meta: DeployMeta {
                deployment_id: bundle.deployment_id.to_string(),
                website_id: bundle.website_id.to_string(),
                source: "site-builder".to_string(),
                created_at: Utc::now().to_rfc3339(),
            },
            alias: bundle.alias.as_ref().map(|a| vec![a.clone()]),
        };

        let response = self.client.deploy(&request).await?;
        Ok(ProviderDeployment {
            url: normalize_url(&response.url),
            provider_deployment_id: Some(response.id),
            simulated: false,
        })
    }

    async fn register_domain(&self, name: &str) -> Result<Vec<VerificationRecord>, HostingError> {
        let response = self.client.add_domain(name).await?;
        Ok(response.verification)
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

// =============================================================================
// Simulated
// =============================================================================

pub struct SimulatedHostingProvider {
    host: String,
}

impl SimulatedHostingProvider {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    fn url_for(&self, slug: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("https://{}-{}.{}", slug, &suffix[..8], self.host)
    }
}

#[async_trait]
impl BaseHostingProvider for SimulatedHostingProvider {
    async fn deploy(&self, bundle: &DeployBundle) -> Result<ProviderDeployment, HostingError> {
        let url = self.url_for(&bundle.name);
        info!(
            deployment_id = %bundle.deployment_id,
            files = bundle.files.len(),
            url = %url,
            "Simulated deployment"
        );
        Ok(ProviderDeployment {
            url,
            provider_deployment_id: None,
            simulated: true,
        })
    }

    async fn register_domain(&self, _name: &str) -> Result<Vec<VerificationRecord>, HostingError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

// =============================================================================
// Fallback
// =============================================================================

pub struct FallbackHostingProvider {
    live: LiveHostingProvider,
    simulated: SimulatedHostingProvider,
}

impl FallbackHostingProvider {
    pub fn new(live: LiveHostingProvider, simulated: SimulatedHostingProvider) -> Self {
        Self { live, simulated }
    }
}

#[async_trait]
impl BaseHostingProvider for FallbackHostingProvider {
    async fn deploy(&self, bundle: &DeployBundle) -> Result<ProviderDeployment, HostingError> {
        match self.live.deploy(bundle).await {
            Ok(deployment) => Ok(deployment),
            Err(e) => {
                warn!(
                    deployment_id = %bundle.deployment_id,
                    error = %e,
                    "Live deploy failed, falling back to simulated deployment"
                );
                self.simulated.deploy(bundle).await
            }
        }
    }

    async fn register_domain(&self, name: &str) -> Result<Vec<VerificationRecord>, HostingError> {
        match self.live.register_domain(name).await {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(domain = %name, error = %e, "Live domain registration failed, skipping");
                Ok(Vec::new())
            }
        }
    }

    fn name(&self) -> &'static str {
        "live+simulated-fallback"
    }
}

/// Pick the provider strategy for this process.
pub fn build_hosting_provider(
    config: &HostingConfig,
    app_env: AppEnv,
) -> Result<Arc<dyn BaseHostingProvider>> {
    let simulated = || SimulatedHostingProvider::new(config.simulated_host.clone());

    let token = match (config.mode, config.api_token.as_deref()) {
        (ProviderMode::Simulated, _) | (ProviderMode::Auto, None) => {
            info!(host = %config.simulated_host, "Using simulated hosting provider");
            return Ok(Arc::new(simulated()));
        }
        (ProviderMode::Live, None) => {
            bail!("HOSTING_PROVIDER_MODE=live requires HOSTING_API_TOKEN")
        }
        (_, Some(token)) => token,
    };

    let live = LiveHostingProvider::from_config(config, token)?;
    if config.fallback_to_simulated {
        if app_env.is_production() {
            warn!("HOSTING_FALLBACK_TO_SIMULATED is ignored in production");
        } else {
            info!("Using live hosting provider with simulated fallback");
            return Ok(Arc::new(FallbackHostingProvider::new(live, simulated())));
        }
    }

    info!("Using live hosting provider");
    Ok(Arc::new(live))
}
