//! Deployment queue handler.

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::warn;

use super::activities::{mark_terminal, process_deployment, TerminalDetails};
use super::models::DeploymentStatus;
use crate::kernel::jobs::{Job, JobHandler, JobPayload, QueueName};
use crate::kernel::ServerDeps;

pub struct DeploymentJobHandler {
    deps: ServerDeps,
}

impl DeploymentJobHandler {
    pub fn new(deps: ServerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for DeploymentJobHandler {
    fn queue(&self) -> QueueName {
        QueueName::Deployment
    }

    async fn handle(&self, job: &Job) -> Result<()> {
        let JobPayload::Deployment { deployment_id } = &job.payload else {
            bail!("unexpected payload on deployment queue: {:?}", job.payload);
        };
        process_deployment(*deployment_id, &self.deps).await?;
        Ok(())
    }

    async fn on_exhausted(&self, job: &Job, error: &str) -> Result<()> {
        let JobPayload::Deployment { deployment_id } = &job.payload else {
            return Ok(());
        };
        warn!(deployment_id = %deployment_id, attempts = job.attempts, "Deployment job exhausted; marking failed");
        let message = format!("Deployment job failed after {} attempts: {}", job.max_attempts, error);
        mark_terminal(
            *deployment_id,
            DeploymentStatus::Failed,
            TerminalDetails::failed(message),
            &self.deps,
        )
        .await?;
        Ok(())
    }
}
