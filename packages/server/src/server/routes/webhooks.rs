use axum::{body::Bytes, extract::Extension, http::HeaderMap, Json};
use hosting_client::webhook::{parse_payload, verify_signature, SIGNATURE_HEADER};
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::domains::deployments::activities::apply_provider_event;
use crate::server::app::AppState;

/// POST /webhooks/hosting
///
/// Always answers 200 so the provider does not redeliver; the outcome is in
/// the body and the logs.
pub async fn hosting_webhook_handler(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    if let Some(secret) = &state.deps.config.hosting.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            warn!("Rejected webhook with invalid signature");
            return Json(json!({ "received": false, "reason": "invalid signature" }));
        }
    }

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Unparseable webhook body");
            return Json(json!({ "received": false, "reason": "invalid payload" }));
        }
    };

    match apply_provider_event(&payload, &state.deps).await {
        Ok(outcome) => Json(json!({ "received": true, "result": outcome })),
        Err(e) => {
            error!(error = %format!("{:#}", e), provider_id = %payload.id, "Webhook processing failed");
            Json(json!({ "received": true, "reason": "processing failed" }))
        }
    }
}
