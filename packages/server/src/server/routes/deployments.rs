use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::common::{DeploymentId, UserId, WebsiteId};
use crate::domains::deployments::activities::{self, DrainSummary};
use crate::domains::deployments::Deployment;
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub user_id: UserId,
    #[serde(default)]
    pub commit_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackRequest {
    pub user_id: UserId,
}

/// POST /websites/:id/deployments
pub async fn publish_handler(
    Extension(state): Extension<AppState>,
    Path(website_id): Path<WebsiteId>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    let deployment =
        activities::publish(website_id, request.user_id, request.commit_message, &state.deps)
            .await?;
    Ok((StatusCode::ACCEPTED, Json(deployment)))
}

/// GET /websites/:id/deployments
pub async fn list_deployments_handler(
    Extension(state): Extension<AppState>,
    Path(website_id): Path<WebsiteId>,
) -> ApiResult<Json<Vec<Deployment>>> {
    Ok(Json(activities::list_deployments(website_id, &state.deps).await?))
}

/// GET /deployments/:id
pub async fn get_deployment_handler(
    Extension(state): Extension<AppState>,
    Path(deployment_id): Path<DeploymentId>,
) -> ApiResult<Json<Deployment>> {
    Ok(Json(activities::get_deployment(deployment_id, &state.deps).await?))
}

/// POST /deployments/:id/rollback
pub async fn rollback_handler(
    Extension(state): Extension<AppState>,
    Path(deployment_id): Path<DeploymentId>,
    Json(request): Json<RollbackRequest>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    let deployment = activities::rollback(deployment_id, request.user_id, &state.deps).await?;
    Ok((StatusCode::ACCEPTED, Json(deployment)))
}

/// POST /admin/deployments/drain
pub async fn drain_handler(Extension(state): Extension<AppState>) -> ApiResult<Json<DrainSummary>> {
    Ok(Json(activities::drain_queued(&state.deps).await?))
}
