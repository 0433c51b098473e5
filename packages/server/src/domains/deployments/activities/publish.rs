//! Deployment orchestration.
//!
//! ```text
//! publish / rollback ──► queued ──► (worker) process_deployment ──► in_progress
//!                                                                    │
//!                        render ─► validate ─► package ─► upload ────┤
//!                                                                    ├─► success
//!                                                                    └─► failed
//! ```
//!
//! Every terminal transition goes through [`mark_terminal`], whichever path
//! triggers it (pipeline, exhausted job retries or a provider webhook).

use std::fs;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::package::package_build;
use super::validate::{validate_build, verify_published_url};
use crate::common::utils::slugify;
use crate::common::{DeploymentId, PublishError, UserId, WebsiteId};
use crate::domains::deployments::models::{Deployment, DeploymentStatus};
use crate::domains::website::models::Website;
use crate::domains::website::render::{render_site, RenderContext};
use crate::kernel::jobs::{EnqueueResult, JobPayload, JobState, PRIORITY_NORMAL};
use crate::kernel::{DeployBundle, ProviderDeployment, ServerDeps};

/// Extra data recorded with a terminal transition.
#[derive(Debug, Clone, Default)]
pub struct TerminalDetails {
    pub error_message: Option<String>,
    /// Appended to the build log as given; use [`Deployment::stamp`].
    pub log_lines: Vec<String>,
    pub deployment_url: Option<String>,
    pub provider_deployment_id: Option<String>,
}

impl TerminalDetails {
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            log_lines: vec![Deployment::stamp(format!("Deployment failed: {}", message))],
            error_message: Some(message),
            ..Default::default()
        }
    }
}

/// Counts returned by [`drain_queued`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Held by a worker at the time of the drain
    pub skipped: usize,
}

/// Snapshot the website's current content into a queued deployment and
/// enqueue it.
///
/// Fails with [`PublishError::Conflict`] when the website already has a
/// deployment queued or in progress.
pub async fn publish(
    website_id: WebsiteId,
    user_id: UserId,
    commit_message: Option<String>,
    deps: &ServerDeps,
) -> Result<Deployment> {
    let website = deps
        .websites
        .find_website(website_id)
        .await?
        .ok_or(PublishError::WebsiteNotFound(website_id))?;

    let now = Utc::now();
    let version = Deployment::version_for(now);
    let commit_message = commit_message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("Deploy {}", version));

    let deployment = Deployment::builder()
        .website_id(website_id)
        .user_id(user_id)
        .version(version)
        .commit_message(Some(commit_message))
        .content_snapshot(website.content)
        .settings_snapshot(website.settings)
        .created_at(now)
        .build();

    create_and_enqueue(deployment, deps).await
}

/// Re-publish the content of an earlier successful deployment as a new one.
pub async fn rollback(
    deployment_id: DeploymentId,
    user_id: UserId,
    deps: &ServerDeps,
) -> Result<Deployment> {
    let target = deps
        .deployments
        .find_deployment(deployment_id)
        .await?
        .ok_or(PublishError::DeploymentNotFound(deployment_id))?;

    if target.status != DeploymentStatus::Success {
        return Err(PublishError::NotRollbackable(deployment_id).into());
    }

    let now = Utc::now();
    let deployment = Deployment::builder()
        .website_id(target.website_id)
        .user_id(user_id)
        .version(Deployment::version_for(now))
        .commit_message(Some(format!("Rollback to {}", target.version)))
        .content_snapshot(target.content_snapshot)
        .settings_snapshot(target.settings_snapshot)
        .rollback_of(Some(target.id))
        .created_at(now)
        .build();

    info!(deployment_id = %deployment.id, rollback_of = %deployment_id, "Creating rollback deployment");
    create_and_enqueue(deployment, deps).await
}

async fn create_and_enqueue(deployment: Deployment, deps: &ServerDeps) -> Result<Deployment> {
    let deployment = deps.deployments.create_deployment(deployment).await?;
    info!(
        deployment_id = %deployment.id,
        website_id = %deployment.website_id,
        version = %deployment.version,
        "Deployment queued"
    );

    let payload = JobPayload::Deployment {
        deployment_id: deployment.id,
    };
    match deps.jobs.enqueue(payload, PRIORITY_NORMAL).await {
        Ok(EnqueueResult::Created(_)) => {}
        Ok(EnqueueResult::Duplicate(job_id)) => {
            debug!(job_id = %job_id, "Deployment job already queued");
        }
        Err(e) => {
            // Without a job nothing would ever pick the deployment up.
            let message = format!("Failed to enqueue deployment: {:#}", e);
            mark_terminal(deployment.id, DeploymentStatus::Failed, TerminalDetails::failed(&message), deps)
                .await?;
            return Err(e.context(message));
        }
    }

    Ok(deployment)
}

/// Run the publish pipeline for one deployment.
///
/// Idempotent: a terminal deployment is returned untouched. Pipeline
/// failures end in `failed` and are not returned as errors; an error means
/// the deployment could not be processed at all and is worth retrying.
pub async fn process_deployment(deployment_id: DeploymentId, deps: &ServerDeps) -> Result<Deployment> {
    let mut deployment = deps
        .deployments
        .find_deployment(deployment_id)
        .await?
        .ok_or(PublishError::DeploymentNotFound(deployment_id))?;

    if deployment.is_terminal() {
        info!(deployment_id = %deployment_id, status = %deployment.status, "Deployment already finished");
        return Ok(deployment);
    }

    let Some(website) = deps.websites.find_website(deployment.website_id).await? else {
        let error = PublishError::WebsiteNotFound(deployment.website_id);
        mark_terminal(deployment_id, DeploymentStatus::Failed, TerminalDetails::failed(error.to_string()), deps)
            .await?;
        return reload(deployment_id, deps).await;
    };

    if deployment.status == DeploymentStatus::InProgress {
        deployment.log("Resuming interrupted build");
    }
    deployment.status = DeploymentStatus::InProgress;
    deployment.started_at = Some(Utc::now());
    deployment.log(format!("Build started for {} ({})", website.name, deployment.version));
    if !deps.deployments.update_active_deployment(&deployment).await? {
        info!(deployment_id = %deployment_id, "Deployment finished before the build started");
        return reload(deployment_id, deps).await;
    }
    info!(deployment_id = %deployment_id, website_id = %website.id, "Deployment in progress");

    let mut logs = Vec::new();
    match run_pipeline(&deployment, &website, &mut logs, deps).await {
        Ok(published) => finish_success(&deployment, published, logs, deps).await?,
        Err(e) => {
            let message = format!("{:#}", e);
            error!(deployment_id = %deployment_id, error = %message, "Deployment failed");
            logs.push(Deployment::stamp(format!("Deployment failed: {}", message)));
            let details = TerminalDetails {
                error_message: Some(message),
                log_lines: logs,
                ..Default::default()
            };
            mark_terminal(deployment_id, DeploymentStatus::Failed, details, deps).await?;
        }
    }

    reload(deployment_id, deps).await
}

/// Render, validate, package and upload. The build directory is removed
/// when this returns, whatever the outcome.
async fn run_pipeline(
    deployment: &Deployment,
    website: &Website,
    logs: &mut Vec<String>,
    deps: &ServerDeps,
) -> Result<ProviderDeployment> {
    let build_root = &deps.config.build_root;
    fs::create_dir_all(build_root)
        .with_context(|| format!("Failed to create build root {}", build_root.display()))?;
    let build_dir = tempfile::Builder::new()
        .prefix(&format!("deploy-{}-", deployment.id))
        .tempdir_in(build_root)
        .context("Failed to create build directory")?;

    let alias = primary_domain(website.id, deps).await?;
    let ctx = RenderContext {
        site_name: website.name.clone(),
        base_url: alias
            .as_ref()
            .map(|domain| format!("https://{}", domain))
            .or_else(|| website.public_url.clone()),
    };

    let summary = render_site(
        &deployment.content_snapshot,
        &deployment.settings_snapshot,
        &ctx,
        build_dir.path(),
    )?;
    logs.push(Deployment::stamp(format!(
        "Rendered {} pages ({} files)",
        summary.pages.len(),
        summary.files.len()
    )));

    let report = validate_build(build_dir.path())?;
    if !report.valid {
        for e in &report.errors {
            logs.push(Deployment::stamp(format!("Validation error: {}", e)));
        }
        return Err(PublishError::Validation(report.errors).into());
    }
    logs.push(Deployment::stamp("Validation passed"));

    let files = package_build(build_dir.path())?;
    let name = if website.slug.trim().is_empty() {
        slugify(&website.name)
    } else {
        website.slug.clone()
    };
    let bundle = DeployBundle {
        deployment_id: deployment.id,
        website_id: website.id,
        name,
        files,
        alias,
    };
    logs.push(Deployment::stamp(format!(
        "Uploading {} files via {} provider",
        bundle.files.len(),
        deps.hosting.name()
    )));

    let published = deps
        .hosting
        .deploy(&bundle)
        .await
        .map_err(PublishError::from)?;
    logs.push(Deployment::stamp(format!("Deployed to {}", published.url)));

    Ok(published)
}

async fn finish_success(
    deployment: &Deployment,
    published: ProviderDeployment,
    logs: Vec<String>,
    deps: &ServerDeps,
) -> Result<()> {
    let details = TerminalDetails {
        log_lines: logs,
        deployment_url: Some(published.url.clone()),
        provider_deployment_id: published.provider_deployment_id.clone(),
        ..Default::default()
    };
    if !mark_terminal(deployment.id, DeploymentStatus::Success, details, deps).await? {
        warn!(deployment_id = %deployment.id, "Deployment was finished elsewhere; keeping that outcome");
        return Ok(());
    }

    if published.simulated {
        debug!(deployment_id = %deployment.id, "Skipping post-deploy check for simulated deployment");
        return Ok(());
    }

    let report = verify_published_url(&published.url, deps.prober.as_ref()).await;
    if report.valid {
        debug!(deployment_id = %deployment.id, url = %published.url, "Post-deploy check passed");
    }
    Ok(())
}

/// Move a deployment to a terminal state. The only code path that does so.
///
/// Returns false, without writing, when the deployment is missing or already
/// terminal, so every fault path may call it. A successful transition also
/// points the website at the deployment.
pub async fn mark_terminal(
    deployment_id: DeploymentId,
    status: DeploymentStatus,
    details: TerminalDetails,
    deps: &ServerDeps,
) -> Result<bool> {
    let Some(mut deployment) = deps.deployments.find_deployment(deployment_id).await? else {
        warn!(deployment_id = %deployment_id, "Cannot finish unknown deployment");
        return Ok(false);
    };

    let now = Utc::now();
    if !deployment.finish(status, details.error_message, &details.log_lines, now) {
        debug!(deployment_id = %deployment_id, current = %deployment.status, requested = %status, "Terminal transition skipped");
        return Ok(false);
    }
    if details.deployment_url.is_some() {
        deployment.deployment_url = details.deployment_url;
    }
    if details.provider_deployment_id.is_some() {
        deployment.provider_deployment_id = details.provider_deployment_id;
    }

    if !deps.deployments.update_active_deployment(&deployment).await? {
        return Ok(false);
    }
    info!(deployment_id = %deployment_id, status = %status, "Deployment finished");

    if status == DeploymentStatus::Success {
        if let Some(url) = &deployment.deployment_url {
            deps.websites
                .record_deploy_success(deployment.website_id, deployment.id, url, now)
                .await
                .context("Failed to record deployment on website")?;
        }
    }
    Ok(true)
}

/// Process every queued deployment, oldest first, one at a time.
///
/// Each deployment's pending job is removed before it is processed, so no
/// worker can pick up the same build. Deployments whose job a worker has
/// already claimed are left to that worker.
pub async fn drain_queued(deps: &ServerDeps) -> Result<DrainSummary> {
    let queued = deps.deployments.find_queued_deployments().await?;
    info!(count = queued.len(), "Draining queued deployments");

    let mut summary = DrainSummary::default();
    for deployment in queued {
        if !take_pending_job(deployment.id, deps).await? {
            debug!(deployment_id = %deployment.id, "Deployment is held by a worker; skipping");
            summary.skipped += 1;
            continue;
        }
        summary.processed += 1;
        match process_deployment(deployment.id, deps).await {
            Ok(d) if d.status == DeploymentStatus::Success => summary.succeeded += 1,
            Ok(_) => summary.failed += 1,
            Err(e) => {
                warn!(deployment_id = %deployment.id, error = %e, "Failed to process queued deployment");
                summary.failed += 1;
            }
        }
    }

    info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        "Drain complete"
    );
    Ok(summary)
}

/// Remove the deployment's waiting job. False when a worker holds it.
async fn take_pending_job(deployment_id: DeploymentId, deps: &ServerDeps) -> Result<bool> {
    let job_id = deployment_id.into_uuid();
    if deps.jobs.remove(job_id).await? {
        return Ok(true);
    }
    // No pending job: only an active one means someone else is building it
    let held = deps
        .jobs
        .get(job_id)
        .await?
        .is_some_and(|job| job.state == JobState::Active);
    Ok(!held)
}

/// Deployment history of a website, newest first.
pub async fn list_deployments(website_id: WebsiteId, deps: &ServerDeps) -> Result<Vec<Deployment>> {
    deps.deployments.find_deployments_by_website(website_id).await
}

pub async fn get_deployment(deployment_id: DeploymentId, deps: &ServerDeps) -> Result<Deployment> {
    reload(deployment_id, deps).await
}

async fn reload(deployment_id: DeploymentId, deps: &ServerDeps) -> Result<Deployment> {
    deps.deployments
        .find_deployment(deployment_id)
        .await?
        .ok_or_else(|| PublishError::DeploymentNotFound(deployment_id).into())
}

async fn primary_domain(website_id: WebsiteId, deps: &ServerDeps) -> Result<Option<String>> {
    let domains = deps.domains.find_domains_by_website(website_id).await?;
    Ok(domains.into_iter().find(|d| d.is_primary).map(|d| d.name))
}
