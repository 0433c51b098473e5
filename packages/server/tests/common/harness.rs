//! Test harness for integration testing.
//!
//! Every test gets its own in-memory stores, job queue and mocked network
//! services, plus a scratch build root that is removed with the harness.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use test_context::AsyncTestContext;
use tower::ServiceExt;

use server_core::domains::custom_domains::DomainVerificationJobHandler;
use server_core::domains::deployments::DeploymentJobHandler;
use server_core::kernel::jobs::{JobHandler, JobWorker, JobWorkerConfig};
use server_core::kernel::{ServerDeps, TestDependencies};
use server_core::server::build_app;
use server_core::Config;

fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test harness holding the mocks and the `ServerDeps` built from them.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &mut TestHarness) {
///     let website = create_test_website(&ctx.deps, "Acme").await;
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    pub mocks: TestDependencies,
    pub deps: ServerDeps,
    build_dir: TempDir,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().expect("Failed to create test harness")
    }

    async fn teardown(self) {
        // Build root is removed on drop
    }
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        Self::with_mocks(TestDependencies::new())
    }

    /// Build a harness around prepared mocks. The build root is always
    /// replaced with a fresh scratch directory.
    pub fn with_mocks(mocks: TestDependencies) -> Result<Self> {
        init_tracing();

        let build_root = tempfile::tempdir().context("Failed to create build root")?;
        let mut config: Config = mocks.config.clone();
        config.build_root = build_root.path().to_path_buf();
        let mocks = mocks.with_config(config);
        let deps = mocks.into_server_deps();

        Ok(Self {
            mocks,
            deps,
            build_dir: build_root,
        })
    }

    pub fn build_root(&self) -> &Path {
        self.build_dir.path()
    }

    fn worker(&self, handler: Arc<dyn JobHandler>) -> JobWorker {
        JobWorker::with_config(
            self.deps.jobs.clone(),
            handler,
            JobWorkerConfig::with_worker_id("test-worker"),
        )
    }

    /// Run deployment jobs until none is claimable. Returns how many ran.
    pub async fn run_deployment_jobs(&self) -> usize {
        let worker = self.worker(Arc::new(DeploymentJobHandler::new(self.deps.clone())));
        run_until_idle(&worker).await
    }

    /// Run domain verification jobs until none is claimable.
    pub async fn run_verification_jobs(&self) -> usize {
        let worker = self.worker(Arc::new(DomainVerificationJobHandler::new(self.deps.clone())));
        run_until_idle(&worker).await
    }

    /// The HTTP application over this harness's dependencies.
    pub fn app(&self) -> Router {
        build_app(self.deps.clone())
    }

    /// Send one request through the router; returns status and JSON body
    /// (`Value::Null` for an empty body).
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .app()
            .oneshot(request)
            .await
            .expect("Router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Response body is not JSON")
        };
        (status, json)
    }
}

async fn run_until_idle(worker: &JobWorker) -> usize {
    let mut ran = 0;
    while worker.run_once().await.expect("Failed to claim job") {
        ran += 1;
    }
    ran
}
