//! Deployment calls against a throwaway local provider.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use hosting_client::{DeployFile, DeployMeta, DeployRequest, HostingClient, HostingError, RetryPolicy};
use serde_json::json;

#[derive(Default)]
struct Provider {
    calls: Mutex<Vec<Instant>>,
    failures_before_success: usize,
    failure_status: u16,
}

async fn deploy_handler(State(provider): State<Arc<Provider>>) -> Response {
    let call_number = {
        let mut calls = provider.calls.lock().unwrap();
        calls.push(Instant::now());
        calls.len()
    };

    if call_number <= provider.failures_before_success {
        let status = StatusCode::from_u16(provider.failure_status).unwrap();
        return (status, Json(json!({"error": {"message": "try later"}}))).into_response();
    }

    Json(json!({"id": "dpl_123", "url": "my-site-abc.vercel.app", "readyState": "READY"}))
        .into_response()
}

async fn spawn_provider(failures_before_success: usize, failure_status: u16) -> (String, Arc<Provider>) {
    let provider = Arc::new(Provider {
        calls: Mutex::new(Vec::new()),
        failures_before_success,
        failure_status,
    });
    let app = Router::new()
        .route("/v13/deployments", post(deploy_handler))
        .with_state(provider.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), provider)
}

fn request() -> DeployRequest {
    DeployRequest {
        name: "my-site".into(),
        files: vec![DeployFile {
            file: "index.html".into(),
            sha: "0".repeat(64),
            size: 15,
            content: "PCFET0NUWVBFIGh0bWw+".into(),
        }],
        project_id: None,
        target: "production".into(),
        meta: DeployMeta {
            deployment_id: "d-1".into(),
            website_id: "w-1".into(),
            source: "site-builder".into(),
            created_at: "2024-01-01T00:00:00Z".into(),
        },
        alias: None,
    }
}

#[tokio::test]
async fn succeeds_after_two_server_errors_with_doubling_gaps() {
    let (base_url, provider) = spawn_provider(2, 503).await;
    let client = HostingClient::new("token")
        .unwrap()
        .with_base_url(base_url)
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(60)));

    let response = client.deploy(&request()).await.expect("deploy should succeed");
    assert_eq!(response.id, "dpl_123");

    let calls = provider.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3, "two retries after the first call");

    let first_gap = calls[1] - calls[0];
    let second_gap = calls[2] - calls[1];
    assert!(first_gap >= Duration::from_millis(60), "first gap {:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(120), "second gap {:?}", second_gap);
    assert!(second_gap > first_gap);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let (base_url, provider) = spawn_provider(5, 400).await;
    let client = HostingClient::new("token")
        .unwrap()
        .with_base_url(base_url)
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)));

    let err = client.deploy(&request()).await.unwrap_err();

    assert!(matches!(err, HostingError::Api { status: 400, .. }));
    assert_eq!(provider.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn rate_limits_exhaust_the_attempt_ceiling() {
    let (base_url, provider) = spawn_provider(10, 429).await;
    let client = HostingClient::new("token")
        .unwrap()
        .with_base_url(base_url)
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(5)));

    let err = client.deploy(&request()).await.unwrap_err();

    assert_eq!(err.status(), Some(429));
    assert_eq!(provider.calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn request_timeout_is_enforced() {
    let app = Router::new().route(
        "/v13/deployments",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = HostingClient::with_timeout("token", Duration::from_millis(100))
        .unwrap()
        .with_base_url(format!("http://{}", addr))
        .with_retry_policy(RetryPolicy::none());

    let started = Instant::now();
    let err = client.deploy(&request()).await.unwrap_err();

    assert!(matches!(err, HostingError::Connection(_)), "{:?}", err);
    assert!(started.elapsed() < Duration::from_secs(2));
}
