use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::common::{DomainId, UserId, WebsiteId};
use crate::domains::custom_domains::activities;
use crate::domains::custom_domains::Domain;
use crate::server::app::AppState;
use crate::server::error::ApiResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDomainRequest {
    pub name: String,
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPrimaryRequest {
    pub domain_id: DomainId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationQueued {
    pub job_id: Uuid,
    pub created: bool,
}

/// POST /websites/:id/domains
pub async fn add_domain_handler(
    Extension(state): Extension<AppState>,
    Path(website_id): Path<WebsiteId>,
    Json(request): Json<AddDomainRequest>,
) -> ApiResult<(StatusCode, Json<Domain>)> {
    let domain =
        activities::add_domain(website_id, request.user_id, &request.name, &state.deps).await?;
    Ok((StatusCode::CREATED, Json(domain)))
}

/// GET /websites/:id/domains
pub async fn list_domains_handler(
    Extension(state): Extension<AppState>,
    Path(website_id): Path<WebsiteId>,
) -> ApiResult<Json<Vec<Domain>>> {
    Ok(Json(activities::list_domains(website_id, &state.deps).await?))
}

/// DELETE /domains/:id
pub async fn remove_domain_handler(
    Extension(state): Extension<AppState>,
    Path(domain_id): Path<DomainId>,
) -> ApiResult<StatusCode> {
    activities::remove_domain(domain_id, &state.deps).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /domains/:id/verify
pub async fn verify_domain_handler(
    Extension(state): Extension<AppState>,
    Path(domain_id): Path<DomainId>,
) -> ApiResult<(StatusCode, Json<VerificationQueued>)> {
    let result = activities::request_verification(domain_id, &state.deps).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(VerificationQueued {
            job_id: result.job_id(),
            created: result.is_created(),
        }),
    ))
}

/// POST /websites/:id/primary-domain
pub async fn set_primary_domain_handler(
    Extension(state): Extension<AppState>,
    Path(website_id): Path<WebsiteId>,
    Json(request): Json<SetPrimaryRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let updated =
        activities::set_primary_domain(website_id, request.domain_id, &state.deps).await?;
    if updated {
        Ok((StatusCode::OK, Json(json!({ "updated": true }))))
    } else {
        Ok((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "updated": false,
                "error": "Domain must be an active, verified domain of this website"
            })),
        ))
    }
}
