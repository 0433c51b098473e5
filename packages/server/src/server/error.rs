//! Mapping of activity errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::common::{DomainError, PublishError, QueueError};

/// Wraps any activity error; typed errors pick the status code.
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if let Some(e) = self.0.downcast_ref::<PublishError>() {
            return match e {
                PublishError::Conflict { .. } | PublishError::NotRollbackable(_) => {
                    StatusCode::CONFLICT
                }
                PublishError::WebsiteNotFound(_) | PublishError::DeploymentNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                PublishError::Render(_) | PublishError::Validation(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PublishError::Provider(_) => StatusCode::BAD_GATEWAY,
            };
        }
        if let Some(e) = self.0.downcast_ref::<DomainError>() {
            return match e {
                DomainError::AlreadyExists(_) | DomainError::PrimaryRemoval => StatusCode::CONFLICT,
                DomainError::InvalidName(_) => StatusCode::BAD_REQUEST,
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            };
        }
        if let Some(e) = self.0.downcast_ref::<QueueError>() {
            return match e {
                QueueError::UnknownQueue(_) | QueueError::JobNotFound(_) => StatusCode::NOT_FOUND,
                QueueError::JobActive(_) => StatusCode::CONFLICT,
                QueueError::InvalidCleanState(_) => StatusCode::BAD_REQUEST,
            };
        }
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %format!("{:#}", self.0), "Request failed");
        }

        let mut body = json!({ "error": self.0.to_string() });
        if let Some(PublishError::Conflict {
            active_deployment_id,
            ..
        }) = self.0.downcast_ref::<PublishError>()
        {
            body["activeDeploymentId"] = json!(active_deployment_id);
        }
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            body["error"] = json!("Internal server error");
        }

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{DeploymentId, WebsiteId};

    #[test]
    fn test_typed_errors_pick_status() {
        let conflict = ApiError::from(PublishError::Conflict {
            website_id: WebsiteId::new(),
            active_deployment_id: DeploymentId::new(),
        });
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let primary = ApiError::from(DomainError::PrimaryRemoval);
        assert_eq!(primary.status(), StatusCode::CONFLICT);

        let unknown = ApiError::from(QueueError::UnknownQueue("emails".into()));
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let other = ApiError::from(anyhow::anyhow!("boom"));
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_context_keeps_typed_error() {
        let err = anyhow::Error::from(DomainError::InvalidName("x".into())).context("adding domain");
        assert_eq!(ApiError::from(err).status(), StatusCode::BAD_REQUEST);
    }
}
