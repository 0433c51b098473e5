use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::kernel::jobs::{QueueCounts, QueueName};
use crate::server::app::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    status: String,
    provider: String,
    queues: Vec<QueueCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Reads the counts of every queue, which exercises the backing store.
/// Returns 200 OK when that works, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let mut queues = Vec::new();
    let mut error = None;

    for queue in QueueName::ALL {
        match tokio::time::timeout(
            std::time::Duration::from_secs(5),
            state.deps.jobs.counts(queue),
        )
        .await
        {
            Ok(Ok(counts)) => queues.push(counts),
            Ok(Err(e)) => {
                error = Some(format!("Queue store failed: {}", e));
                break;
            }
            Err(_) => {
                error = Some("Queue store timeout (>5s)".to_string());
                break;
            }
        }
    }

    let status_code = if error.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if error.is_none() { "healthy" } else { "unhealthy" }.to_string(),
            provider: state.deps.hosting.name().to_string(),
            queues,
            error,
        }),
    )
}
