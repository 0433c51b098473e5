//! Domain verification and auto-promotion.

use anyhow::Result;
use chrono::Utc;
use hosting_client::VerificationRecord;
use tracing::{info, warn};

use crate::common::{DomainError, DomainId};
use crate::domains::custom_domains::models::{
    DnsRecord, DomainStatus, Domain, SslStatus, VerificationStatus,
};
use crate::domains::custom_domains::verifier::check_domain;
use crate::kernel::ServerDeps;

/// Run DNS, HTTP and SSL checks and persist the outcome.
///
/// A verified domain becomes active, is registered with the hosting
/// provider and, when its website has no primary domain yet, becomes
/// primary. A failed check is recorded on the domain; it is not an error.
/// A primary domain that fails loses the flag in the same write, leaving
/// the website without a primary until a domain is promoted again.
pub async fn verify_domain(domain_id: DomainId, deps: &ServerDeps) -> Result<Domain> {
    let mut domain = deps
        .domains
        .find_domain(domain_id)
        .await?
        .ok_or(DomainError::NotFound(domain_id))?;

    // A live domain keeps serving as-is while it is re-checked
    let mut domain = if domain.is_live() {
        domain
    } else {
        domain.verification_status = VerificationStatus::InProgress;
        deps.domains.update_domain(&domain).await?
    };

    let config = &deps.config.domains;
    let outcome = check_domain(
        &domain,
        deps.dns.as_ref(),
        deps.prober.as_ref(),
        &config.proof_header,
        !deps.config.app_env.is_production(),
    )
    .await;

    domain.ssl_status = if outcome.ssl.valid {
        SslStatus::Active
    } else {
        SslStatus::Pending
    };

    if !outcome.verified() {
        let errors = outcome.errors();
        warn!(domain_id = %domain_id, domain = %domain.name, errors = ?errors, "Domain verification failed");
        domain.status = DomainStatus::Error;
        domain.verification_status = VerificationStatus::Failed;
        domain.verification_errors = Some(errors.join("; "));
        let was_primary = domain.is_primary;
        let domain = deps.domains.update_domain(&domain).await?;
        if was_primary {
            warn!(domain_id = %domain_id, website_id = %domain.website_id, "Primary domain failed verification and was demoted");
        }
        return Ok(domain);
    }

    domain.status = DomainStatus::Active;
    domain.verification_status = VerificationStatus::Verified;
    domain.verification_errors = None;
    domain.last_verified_at = Some(Utc::now());

    match deps.hosting.register_domain(&domain.name).await {
        Ok(records) => merge_provider_records(&mut domain.dns_records, &records),
        Err(e) => {
            warn!(domain_id = %domain_id, error = %e, "Provider domain registration failed");
        }
    }

    let domain = deps.domains.update_domain(&domain).await?;
    info!(domain_id = %domain_id, domain = %domain.name, ssl = ?domain.ssl_status, "Domain verified");

    promote_if_first(&domain, deps).await
}

/// Add provider-requested records that are not already listed.
fn merge_provider_records(existing: &mut Vec<DnsRecord>, records: &[VerificationRecord]) {
    for record in records {
        let Ok(record_type) = record.record_type.parse() else {
            warn!(record_type = %record.record_type, "Skipping unsupported provider record");
            continue;
        };
        // The provider checks these itself; they never gate our verification.
        let candidate = DnsRecord::informational(
            record_type,
            &record.domain,
            &record.value,
            record
                .reason
                .clone()
                .unwrap_or_else(|| "Requested by the hosting provider".to_string()),
        );
        if !existing.iter().any(|r| r.same_target(&candidate)) {
            existing.push(candidate);
        }
    }
}

async fn promote_if_first(domain: &Domain, deps: &ServerDeps) -> Result<Domain> {
    let siblings = deps.domains.find_domains_by_website(domain.website_id).await?;
    if siblings.iter().any(|d| d.is_primary) {
        return Ok(domain.clone());
    }

    if deps
        .domains
        .swap_primary_domain(domain.website_id, domain.id)
        .await?
    {
        info!(domain_id = %domain.id, website_id = %domain.website_id, "Domain promoted to primary");
    }
    deps.domains
        .find_domain(domain.id)
        .await?
        .ok_or_else(|| DomainError::NotFound(domain.id).into())
}
