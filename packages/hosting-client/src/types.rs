use serde::{Deserialize, Serialize};

/// One file of a deployment upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployFile {
    /// Path relative to the site root, forward slashes.
    pub file: String,
    /// SHA-256 hex digest of the raw bytes.
    pub sha: String,
    pub size: u64,
    /// Base64 encoded file contents.
    pub content: String,
}

/// Metadata echoed back by the provider in webhooks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeployMeta {
    pub deployment_id: String,
    pub website_id: String,
    pub source: String,
    pub created_at: String,
}

/// Body of `POST /v13/deployments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub name: String,
    pub files: Vec<DeployFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub target: String,
    pub meta: DeployMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<Vec<String>>,
}

/// Provider's answer to a deployment request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeploymentResponse {
    pub id: String,
    /// Bare host or full URL, depending on provider version.
    pub url: String,
    #[serde(default, alias = "readyState")]
    pub state: Option<ProviderState>,
}

/// Deployment lifecycle states reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderState {
    Queued,
    Initializing,
    Building,
    Ready,
    Error,
    Canceled,
}

/// DNS record the provider wants to see before it serves a domain.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct VerificationRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub domain: String,
    pub value: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Body of `POST /v10/projects/{project}/domains`.
#[derive(Debug, Clone, Serialize)]
pub struct AddDomainRequest {
    pub name: String,
}

/// Provider's view of a project domain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomainResponse {
    pub name: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub verification: Vec<VerificationRecord>,
}

/// Deployment webhook payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookPayload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    pub state: ProviderState,
    #[serde(default)]
    pub meta: WebhookMeta,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMeta {
    #[serde(default)]
    pub deployment_id: Option<String>,
}

/// Error envelope returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_without_meta_parses() {
        let payload: WebhookPayload =
            serde_json::from_str(r#"{"id":"dpl_1","state":"READY"}"#).unwrap();
        assert_eq!(payload.state, ProviderState::Ready);
        assert!(payload.meta.deployment_id.is_none());
    }

    #[test]
    fn test_deploy_request_wire_shape() {
        let request = DeployRequest {
            name: "my-site".into(),
            files: vec![DeployFile {
                file: "index.html".into(),
                sha: "abc".into(),
                size: 3,
                content: "PGgxPg==".into(),
            }],
            project_id: None,
            target: "production".into(),
            meta: DeployMeta {
                deployment_id: "d1".into(),
                website_id: "w1".into(),
                source: "site-builder".into(),
                created_at: "2024-01-01T00:00:00Z".into(),
            },
            alias: Some(vec!["example.com".into()]),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["meta"]["deploymentId"], "d1");
        assert_eq!(json["files"][0]["file"], "index.html");
        assert_eq!(json["alias"][0], "example.com");
        assert!(json.get("projectId").is_none());
    }
}
