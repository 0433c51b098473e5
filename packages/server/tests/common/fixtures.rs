//! Test fixtures for creating test data.
//!
//! These fixtures go through the store traits, the same way the activities
//! read and write records.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use server_core::common::{DeploymentId, UserId, WebsiteId};
use server_core::domains::custom_domains::{Domain, DomainStatus, VerificationStatus};
use server_core::domains::website::Website;
use server_core::kernel::{
    BaseDomainStore, BaseWebsiteStore, MockDnsResolver, MockProber, ServerDeps,
};
use server_core::Config;

/// A two-page site with a link from the home page to the about page.
pub fn sample_content() -> Value {
    json!({
        "pages": [
            {
                "title": "Home",
                "slug": "home",
                "isHome": true,
                "elements": [
                    {"type": "hero", "content": {
                        "headline": "Fresh bread daily",
                        "subheadline": "Since 1987",
                        "ctaText": "Visit us",
                        "ctaLink": "about.html"
                    }},
                    {"type": "text", "content": {"heading": "Our story", "body": "Flour, water, salt."}}
                ]
            },
            {
                "title": "About",
                "slug": "about",
                "elements": [
                    {"type": "contact", "content": {"email": "hello@bakery.test"}}
                ]
            }
        ]
    })
}

pub fn sample_settings() -> Value {
    json!({
        "colors": {"primary": "#8b4513"},
        "fonts": {"heading": "Georgia"}
    })
}

/// Insert a website with [`sample_content`].
pub async fn create_test_website(deps: &ServerDeps, name: &str) -> Website {
    create_website_with_content(deps, name, sample_content()).await
}

pub async fn create_website_with_content(deps: &ServerDeps, name: &str, content: Value) -> Website {
    let website = Website::builder()
        .user_id(UserId::new())
        .name(name)
        .slug(server_core::common::utils::slugify(name))
        .content(content)
        .settings(sample_settings())
        .build();
    deps.websites
        .insert_website(website)
        .await
        .expect("Failed to create website")
}

/// Live DNS, HTTP and HTTPS answers for a correctly configured domain.
pub fn configure_live_domain(
    dns: &MockDnsResolver,
    prober: &MockProber,
    domain: &Domain,
    config: &Config,
) {
    for record in domain.dns_records.iter().filter(|r| r.required) {
        dns.set_record(record.record_type, &record.name, &record.value);
    }
    prober.respond(
        &format!("http://{}/", domain.name),
        200,
        &[(config.domains.proof_header.as_str(), "iad1::abc")],
        "<!DOCTYPE html><html></html>",
    );
    prober.respond(&format!("https://{}/", domain.name), 200, &[], "");
}

/// Make a domain active and verified without running the checks.
pub async fn mark_verified(deps: &ServerDeps, domain: &Domain) -> Domain {
    let mut domain = domain.clone();
    domain.status = DomainStatus::Active;
    domain.verification_status = VerificationStatus::Verified;
    deps.domains
        .update_domain(&domain)
        .await
        .expect("Failed to update domain")
}

/// Website store whose reads fail, for retry and exhaustion paths.
pub struct UnavailableWebsiteStore;

#[async_trait]
impl BaseWebsiteStore for UnavailableWebsiteStore {
    async fn find_website(&self, _id: WebsiteId) -> Result<Option<Website>> {
        anyhow::bail!("website store unavailable")
    }

    async fn insert_website(&self, _website: Website) -> Result<Website> {
        anyhow::bail!("website store unavailable")
    }

    async fn record_deploy_success(
        &self,
        _id: WebsiteId,
        _deployment_id: DeploymentId,
        _public_url: &str,
        _at: DateTime<Utc>,
    ) -> Result<()> {
        anyhow::bail!("website store unavailable")
    }
}
