use std::time::Duration;

use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::common::{DeploymentId, DomainError, DomainId, PublishError};
use crate::kernel::jobs::{JobPayload, JobState, QueueCounts, QueueName};
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanRequest {
    pub grace_ms: u64,
    pub state: JobState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedJobs {
    pub queue: QueueName,
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetriedJob {
    pub queue: QueueName,
    pub job_id: Uuid,
}

/// GET /admin/queues/:queue
pub async fn queue_counts_handler(
    Extension(state): Extension<AppState>,
    Path(queue): Path<String>,
) -> ApiResult<Json<QueueCounts>> {
    let queue: QueueName = queue.parse()?;
    Ok(Json(state.deps.jobs.counts(queue).await?))
}

/// POST /admin/queues/:queue/pause
pub async fn pause_queue_handler(
    Extension(state): Extension<AppState>,
    Path(queue): Path<String>,
) -> ApiResult<Json<QueueCounts>> {
    let queue: QueueName = queue.parse()?;
    state.deps.jobs.pause(queue).await?;
    info!(queue = %queue, "Queue paused");
    Ok(Json(state.deps.jobs.counts(queue).await?))
}

/// POST /admin/queues/:queue/resume
pub async fn resume_queue_handler(
    Extension(state): Extension<AppState>,
    Path(queue): Path<String>,
) -> ApiResult<Json<QueueCounts>> {
    let queue: QueueName = queue.parse()?;
    state.deps.jobs.resume(queue).await?;
    info!(queue = %queue, "Queue resumed");
    Ok(Json(state.deps.jobs.counts(queue).await?))
}

/// POST /admin/queues/:queue/promote
pub async fn promote_queue_handler(
    Extension(state): Extension<AppState>,
    Path(queue): Path<String>,
) -> ApiResult<Json<AffectedJobs>> {
    let queue: QueueName = queue.parse()?;
    let count = state.deps.jobs.promote(queue).await?;
    info!(queue = %queue, count, "Delayed jobs promoted");
    Ok(Json(AffectedJobs { queue, count }))
}

/// POST /admin/queues/:queue/clean
pub async fn clean_queue_handler(
    Extension(state): Extension<AppState>,
    Path(queue): Path<String>,
    Json(request): Json<CleanRequest>,
) -> ApiResult<Json<AffectedJobs>> {
    let queue: QueueName = queue.parse()?;
    let count = state
        .deps
        .jobs
        .clean(queue, Duration::from_millis(request.grace_ms), request.state)
        .await?;
    info!(queue = %queue, state = ?request.state, count, "Queue cleaned");
    Ok(Json(AffectedJobs { queue, count }))
}

/// POST /admin/queues/:queue/jobs/:id/retry
///
/// The id is the deployment or domain id the job works on.
pub async fn retry_job_handler(
    Extension(state): Extension<AppState>,
    Path((queue, id)): Path<(String, Uuid)>,
) -> ApiResult<Json<RetriedJob>> {
    let queue: QueueName = queue.parse()?;
    let deps = &state.deps;

    let payload = match queue {
        QueueName::Deployment => {
            let deployment_id = DeploymentId::from_uuid(id);
            deps.deployments
                .find_deployment(deployment_id)
                .await?
                .ok_or(PublishError::DeploymentNotFound(deployment_id))?;
            JobPayload::Deployment { deployment_id }
        }
        QueueName::DomainVerification => {
            let domain_id = DomainId::from_uuid(id);
            let domain = deps
                .domains
                .find_domain(domain_id)
                .await?
                .ok_or(DomainError::NotFound(domain_id))?;
            JobPayload::DomainVerification {
                domain_id,
                website_id: domain.website_id,
            }
        }
    };

    let job_id = deps.jobs.force_retry(payload).await?;
    info!(queue = %queue, job_id = %job_id, "Job force-retried");
    Ok(Json(RetriedJob { queue, job_id }))
}
