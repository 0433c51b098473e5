//! Domain verification queue handler.
//!
//! A failed verification fails the job so the queue retries it with backoff,
//! which rides out DNS propagation. Every completed attempt's outcome is
//! already on the domain; exhaustion only settles a run that never finished.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use super::activities::verify_domain;
use super::models::{DomainStatus, VerificationStatus};
use crate::kernel::jobs::{Job, JobHandler, JobPayload, QueueName};
use crate::kernel::ServerDeps;

pub struct DomainVerificationJobHandler {
    deps: ServerDeps,
}

impl DomainVerificationJobHandler {
    pub fn new(deps: ServerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for DomainVerificationJobHandler {
    fn queue(&self) -> QueueName {
        QueueName::DomainVerification
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let JobPayload::DomainVerification { domain_id, .. } = &job.payload else {
            bail!("unexpected payload on domain verification queue: {:?}", job.payload);
        };

        let domain = verify_domain(*domain_id, &self.deps).await?;
        if domain.verification_status != VerificationStatus::Verified {
            bail!(
                "verification of {} failed: {}",
                domain.name,
                domain.verification_errors.unwrap_or_default()
            );
        }
        Ok(())
    }

    async fn on_exhausted(&self, job: &Job, error: &str) -> Result<()> {
        let JobPayload::DomainVerification { domain_id, .. } = &job.payload else {
            return Ok(());
        };
        info!(domain_id = %domain_id, attempts = job.attempts, error = %error, "Domain verification gave up");

        let Some(mut domain) = self.deps.domains.find_domain(*domain_id).await? else {
            return Ok(());
        };
        if domain.verification_status == VerificationStatus::InProgress {
            warn!(domain_id = %domain_id, "Settling interrupted verification as failed");
            domain.status = DomainStatus::Error;
            domain.verification_status = VerificationStatus::Failed;
            domain.verification_errors = Some(error.to_string());
            self.deps.domains.update_domain(&domain).await?;
        }
        Ok(())
    }
}
