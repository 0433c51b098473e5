//! Custom domain CRUD and primary-domain selection.

use anyhow::Result;
use tracing::{debug, info};

use crate::common::{DomainError, DomainId, PublishError, UserId, WebsiteId};
use crate::domains::custom_domains::models::Domain;
use crate::domains::custom_domains::verifier::expected_records;
use crate::kernel::jobs::{EnqueueResult, JobPayload, PRIORITY_NORMAL};
use crate::kernel::ServerDeps;

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Lowercase, strip scheme, path, port and trailing dot, then validate.
pub fn normalize_domain_name(input: &str) -> Result<String, DomainError> {
    let mut name = input.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = name.strip_prefix(scheme) {
            name = rest.to_string();
        }
    }
    if let Some(end) = name.find(['/', '?', '#']) {
        name.truncate(end);
    }
    if let Some(end) = name.find(':') {
        name.truncate(end);
    }
    let name = name.trim_end_matches('.').to_string();

    let invalid = |reason: &str| DomainError::InvalidName(format!("{} ({})", input.trim(), reason));

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("longer than 253 characters"));
    }
    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("needs at least two labels"));
    }
    for label in labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(invalid("labels must be 1-63 characters"));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid("labels may only contain a-z, 0-9 and '-'"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("labels cannot start or end with '-'"));
        }
    }
    Ok(name)
}

/// Attach a domain to a website, seed its expected DNS records and queue
/// its first verification.
pub async fn add_domain(
    website_id: WebsiteId,
    user_id: UserId,
    name: &str,
    deps: &ServerDeps,
) -> Result<Domain> {
    let name = normalize_domain_name(name)?;

    if deps.websites.find_website(website_id).await?.is_none() {
        return Err(PublishError::WebsiteNotFound(website_id).into());
    }
    if deps.domains.find_domain_by_name(&name).await?.is_some() {
        return Err(DomainError::AlreadyExists(name).into());
    }

    let id = DomainId::new();
    let domain = Domain::builder()
        .id(id)
        .name(name.clone())
        .website_id(website_id)
        .user_id(user_id)
        .dns_records(expected_records(&name, id, &deps.config.domains))
        .build();
    let domain = deps.domains.create_domain(domain).await?;
    info!(domain_id = %domain.id, domain = %domain.name, website_id = %website_id, "Domain added");

    enqueue_verification(&domain, deps).await?;
    Ok(domain)
}

pub async fn list_domains(website_id: WebsiteId, deps: &ServerDeps) -> Result<Vec<Domain>> {
    deps.domains.find_domains_by_website(website_id).await
}

pub async fn get_domain(domain_id: DomainId, deps: &ServerDeps) -> Result<Domain> {
    deps.domains
        .find_domain(domain_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(domain_id).into())
}

/// Delete a domain and its pending verification job. The primary domain
/// cannot be removed.
pub async fn remove_domain(domain_id: DomainId, deps: &ServerDeps) -> Result<()> {
    let domain = get_domain(domain_id, deps).await?;
    if domain.is_primary {
        return Err(DomainError::PrimaryRemoval.into());
    }
    // False here means it was promoted in the meantime.
    if !deps.domains.delete_domain(domain_id).await? {
        return Err(DomainError::PrimaryRemoval.into());
    }

    let removed_job = deps.jobs.remove(domain_id.into_uuid()).await?;
    info!(domain_id = %domain_id, domain = %domain.name, removed_job, "Domain removed");
    Ok(())
}

/// Make `domain_id` the website's only primary domain. Returns false, with
/// nothing changed, when the domain is not an active verified domain of the
/// website.
pub async fn set_primary_domain(
    website_id: WebsiteId,
    domain_id: DomainId,
    deps: &ServerDeps,
) -> Result<bool> {
    let swapped = deps.domains.swap_primary_domain(website_id, domain_id).await?;
    if swapped {
        info!(website_id = %website_id, domain_id = %domain_id, "Primary domain set");
    } else {
        debug!(website_id = %website_id, domain_id = %domain_id, "Domain cannot be primary");
    }
    Ok(swapped)
}

/// Queue a verification run for an existing domain.
pub async fn request_verification(domain_id: DomainId, deps: &ServerDeps) -> Result<EnqueueResult> {
    let domain = get_domain(domain_id, deps).await?;
    enqueue_verification(&domain, deps).await
}

async fn enqueue_verification(domain: &Domain, deps: &ServerDeps) -> Result<EnqueueResult> {
    let payload = JobPayload::DomainVerification {
        domain_id: domain.id,
        website_id: domain.website_id,
    };
    let result = deps.jobs.enqueue(payload, PRIORITY_NORMAL).await?;
    debug!(domain_id = %domain.id, created = result.is_created(), "Verification queued");
    Ok(result)
}
