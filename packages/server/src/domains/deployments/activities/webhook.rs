//! Provider deployment webhooks.

use anyhow::Result;
use chrono::Utc;
use hosting_client::{normalize_url, ProviderState, WebhookPayload};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::publish::{mark_terminal, TerminalDetails};
use crate::common::DeploymentId;
use crate::domains::deployments::models::{Deployment, DeploymentStatus};
use crate::kernel::ServerDeps;

/// Local status for a provider state.
pub fn map_provider_state(state: ProviderState) -> DeploymentStatus {
    match state {
        ProviderState::Ready => DeploymentStatus::Success,
        ProviderState::Error => DeploymentStatus::Failed,
        ProviderState::Canceled => DeploymentStatus::Canceled,
        ProviderState::Building => DeploymentStatus::InProgress,
        ProviderState::Queued | ProviderState::Initializing => DeploymentStatus::Queued,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        deployment_id: DeploymentId,
        status: DeploymentStatus,
    },
    Ignored {
        reason: String,
    },
}

impl WebhookOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        debug!(reason = %reason, "Webhook ignored");
        WebhookOutcome::Ignored { reason }
    }
}

/// Apply a provider status report to the local deployment it names.
///
/// Events without a deployment id, for unknown deployments, or for
/// deployments that already reached a terminal state change nothing.
/// Non-terminal reports only move a deployment forward: a build the
/// provider still calls queued is never pulled back out of `in_progress`.
pub async fn apply_provider_event(
    payload: &WebhookPayload,
    deps: &ServerDeps,
) -> Result<WebhookOutcome> {
    let Some(raw_id) = payload.meta.deployment_id.as_deref() else {
        return Ok(WebhookOutcome::ignored("no deployment id in metadata"));
    };
    let Ok(deployment_id) = DeploymentId::parse(raw_id) else {
        warn!(deployment_id = %raw_id, "Webhook carries a malformed deployment id");
        return Ok(WebhookOutcome::ignored("malformed deployment id"));
    };
    let Some(mut deployment) = deps.deployments.find_deployment(deployment_id).await? else {
        return Ok(WebhookOutcome::ignored("unknown deployment"));
    };
    if deployment.is_terminal() {
        return Ok(WebhookOutcome::ignored(format!(
            "deployment already {}",
            deployment.status
        )));
    }

    let status = map_provider_state(payload.state);
    let note = Deployment::stamp(format!("Provider reported {:?} ({})", payload.state, payload.id));
    info!(deployment_id = %deployment_id, provider_state = ?payload.state, status = %status, "Provider webhook");

    if status.is_terminal() {
        let details = TerminalDetails {
            error_message: (status == DeploymentStatus::Failed)
                .then(|| format!("Provider reported an error for {}", payload.id)),
            log_lines: vec![note],
            deployment_url: payload
                .url
                .as_deref()
                .filter(|_| status == DeploymentStatus::Success)
                .map(normalize_url),
            provider_deployment_id: Some(payload.id.clone()),
        };
        if !mark_terminal(deployment_id, status, details, deps).await? {
            return Ok(WebhookOutcome::ignored("deployment finished concurrently"));
        }
    } else {
        if status == DeploymentStatus::Queued && deployment.status == DeploymentStatus::InProgress {
            return Ok(WebhookOutcome::ignored("deployment already in progress"));
        }
        deployment.status = status;
        if status == DeploymentStatus::InProgress && deployment.started_at.is_none() {
            deployment.started_at = Some(Utc::now());
        }
        deployment.provider_deployment_id = Some(payload.id.clone());
        deployment.build_logs.push(note);
        if !deps.deployments.update_active_deployment(&deployment).await? {
            return Ok(WebhookOutcome::ignored("deployment finished concurrently"));
        }
    }

    Ok(WebhookOutcome::Applied {
        deployment_id,
        status,
    })
}
