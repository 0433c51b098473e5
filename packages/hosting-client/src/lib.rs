//! Pure static-hosting provider REST API client.
//!
//! A minimal client for a Vercel-style hosting API: file-set deployments,
//! project domain registration and deployment webhooks. Transient failures
//! (5xx, 429, dropped connections) are retried with exponential backoff.
//!
//! # Example
//!
//! ```rust,ignore
//! use hosting_client::{HostingClient, RetryPolicy};
//!
//! let client = HostingClient::new("token")?
//!     .with_project("prj_123")
//!     .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(1)));
//!
//! let deployment = client.deploy(&request).await?;
//! println!("live at {}", hosting_client::normalize_url(&deployment.url));
//! ```

pub mod error;
pub mod retry;
pub mod types;
pub mod webhook;

pub use error::{HostingError, Result};
pub use retry::{with_retry, RetryPolicy, Retryable};
pub use types::{
    AddDomainRequest, DeployFile, DeployMeta, DeployRequest, DeploymentResponse, DomainResponse,
    ProviderState, VerificationRecord, WebhookMeta, WebhookPayload,
};

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use types::ApiErrorEnvelope;

const BASE_URL: &str = "https://api.vercel.com";

/// Hosting provider API client.
#[derive(Clone)]
pub struct HostingClient {
    http_client: Client,
    token: String,
    base_url: String,
    team_id: Option<String>,
    project_id: Option<String>,
    retry_policy: RetryPolicy,
}

impl HostingClient {
    /// Create a client with the default 30s per-request timeout.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_timeout(token, Duration::from_secs(30))
    }

    /// Fails with [`HostingError::Config`] when the HTTP client cannot be
    /// built, rather than falling back to one without a timeout.
    pub fn with_timeout(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HostingError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            token: token.into(),
            base_url: BASE_URL.to_string(),
            team_id: None,
            project_id: None,
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Point the client at a different API host (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    fn url(&self, path: &str) -> String {
        match &self.team_id {
            Some(team) => format!("{}{}?teamId={}", self.base_url, path, team),
            None => format!("{}{}", self.base_url, path),
        }
    }

    /// Submit a file-set deployment.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeploymentResponse> {
        if self.token.is_empty() {
            return Err(HostingError::Config("hosting API token is empty".into()));
        }

        let url = self.url("/v13/deployments");
        tracing::info!(
            name = %request.name,
            files = request.files.len(),
            deployment_id = %request.meta.deployment_id,
            "Submitting deployment to hosting provider"
        );

        with_retry(&self.retry_policy, |attempt| {
            let url = url.clone();
            async move {
                tracing::debug!(attempt, "POST {}", url);
                let resp = self
                    .http_client
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(request)
                    .send()
                    .await?;
                parse_response(resp).await
            }
        })
        .await
    }

    /// Register a domain on the configured project.
    pub async fn add_domain(&self, name: &str) -> Result<DomainResponse> {
        let project = self
            .project_id
            .as_deref()
            .ok_or_else(|| HostingError::Config("hosting project id is not set".into()))?;
        let url = self.url(&format!("/v10/projects/{}/domains", project));
        let body = AddDomainRequest {
            name: name.to_string(),
        };

        with_retry(&self.retry_policy, |_| {
            let url = url.clone();
            let body = body.clone();
            async move {
                let resp = self
                    .http_client
                    .post(&url)
                    .bearer_auth(&self.token)
                    .json(&body)
                    .send()
                    .await?;
                parse_response(resp).await
            }
        })
        .await
    }

    /// Fetch a deployment by provider id.
    pub async fn get_deployment(&self, id: &str) -> Result<DeploymentResponse> {
        let url = self.url(&format!("/v13/deployments/{}", id));
        with_retry(&self.retry_policy, |_| {
            let url = url.clone();
            async move {
                let resp = self
                    .http_client
                    .get(&url)
                    .bearer_auth(&self.token)
                    .send()
                    .await?;
                parse_response(resp).await
            }
        })
        .await
    }
}

async fn parse_response<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
            .map(|e| match e.error.code {
                Some(code) => format!("{}: {}", code, e.error.message),
                None => e.error.message,
            })
            .unwrap_or(body);
        return Err(HostingError::Api {
            status: status.as_u16(),
            message,
        });
    }
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| HostingError::Parse(e.to_string()))
}

/// Normalize a provider URL (bare host or `http://`) to `https://`.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let host = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    format!("https://{}", host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("my-site.vercel.app"), "https://my-site.vercel.app");
        assert_eq!(normalize_url("http://my-site.vercel.app/"), "https://my-site.vercel.app");
        assert_eq!(normalize_url("https://my-site.vercel.app"), "https://my-site.vercel.app");
    }

    #[test]
    fn test_team_id_is_appended() {
        let client = HostingClient::new("t")
            .unwrap()
            .with_base_url("http://localhost:9999/")
            .with_team("team_1");
        assert_eq!(
            client.url("/v13/deployments"),
            "http://localhost:9999/v13/deployments?teamId=team_1"
        );
    }

    #[tokio::test]
    async fn test_add_domain_requires_project() {
        let client = HostingClient::new("t").unwrap();
        let err = client.add_domain("example.com").await.unwrap_err();
        assert!(matches!(err, HostingError::Config(_)));
    }
}
