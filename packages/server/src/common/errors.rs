use serde::Serialize;
use thiserror::Error;

use super::{DeploymentId, DomainId, WebsiteId};

/// Failures of the publishing pipeline.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Another deployment for the website is queued or in progress
    #[error("A deployment is already in progress for website {website_id} (deployment {active_deployment_id})")]
    Conflict {
        website_id: WebsiteId,
        active_deployment_id: DeploymentId,
    },

    #[error("Website not found: {0}")]
    WebsiteNotFound(WebsiteId),

    #[error("Deployment not found: {0}")]
    DeploymentNotFound(DeploymentId),

    /// Content model could not be parsed into pages and elements
    #[error("Render error: {0}")]
    Render(String),

    /// Pre-deploy structural checks failed
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Provider error: {0}")]
    Provider(#[from] hosting_client::HostingError),

    #[error("Only successful deployments can be rolled back to (deployment {0})")]
    NotRollbackable(DeploymentId),
}

/// Failures of custom domain management.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Domain {0} is already registered")]
    AlreadyExists(String),

    #[error("Invalid domain name: {0}")]
    InvalidName(String),

    #[error("Domain not found: {0}")]
    NotFound(DomainId),

    #[error("Cannot remove the primary domain. Set another domain as primary first.")]
    PrimaryRemoval,
}

/// Individual check failures collected during domain verification.
///
/// DNS and HTTP failures block activation; SSL failures are only logged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationError {
    #[error("DNS {record_type} record for {name}: {message}")]
    Dns {
        record_type: String,
        name: String,
        message: String,
    },

    #[error("HTTP check for {domain}: {message}")]
    Http { domain: String, message: String },

    #[error("SSL certificate error for {domain}: {message}")]
    SslCertificate { domain: String, message: String },

    #[error("SSL connection error for {domain}: {message}")]
    SslConnection { domain: String, message: String },
}

/// Queue operations rejected by the queue itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Unknown queue: {0}")]
    UnknownQueue(String),

    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    #[error("Job {0} is active and cannot be modified")]
    JobActive(uuid::Uuid),

    /// Only finished jobs may be purged
    #[error("Only completed or failed jobs can be cleaned, not {0} jobs")]
    InvalidCleanState(String),
}
