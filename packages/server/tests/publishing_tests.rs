//! Integration tests for the publishing pipeline.
//!
//! Covers admission, the worker-driven build (render, validate, package,
//! upload), terminal transitions, rollback and queue exhaustion.

mod common;

use std::sync::Arc;

use serde_json::json;
use server_core::common::{PublishError, UserId};
use server_core::domains::deployments::activities::{
    drain_queued, get_deployment, list_deployments, process_deployment, publish, rollback,
    validate_build,
};
use server_core::domains::deployments::DeploymentStatus;
use server_core::domains::website::{render_site, RenderContext};
use server_core::kernel::jobs::{JobQueue, JobState, QueueName};
use server_core::kernel::{BaseWebsiteStore, MockHostingProvider, SimulatedHostingProvider};
use test_context::test_context;

use crate::common::{
    create_test_website, create_website_with_content, TestHarness, UnavailableWebsiteStore,
};

// =============================================================================
// Successful publish
// =============================================================================

#[tokio::test]
async fn simulated_publish_succeeds_and_updates_public_url() {
    let mut ctx = TestHarness::new().expect("harness");
    ctx.deps.hosting = Arc::new(SimulatedHostingProvider::new("sites.localhost"));
    let website = create_test_website(&ctx.deps, "Corner Bakery").await;

    let queued = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .expect("publish");
    assert_eq!(queued.status, DeploymentStatus::Queued);

    assert_eq!(ctx.run_deployment_jobs().await, 1);

    let deployment = get_deployment(queued.id, &ctx.deps).await.expect("deployment");
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert!(deployment.completed_at.is_some());
    assert!(deployment.build_time_ms.is_some());

    // https://<slug>-<8 hex>.sites.localhost
    let url = deployment.deployment_url.clone().expect("url");
    let host = url.strip_prefix("https://").expect("https url");
    let label = host
        .strip_suffix(".sites.localhost")
        .expect("simulated host");
    let suffix = label
        .strip_prefix("corner-bakery-")
        .expect("slug prefix");
    assert_eq!(suffix.len(), 8);
    assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));

    let website = ctx
        .deps
        .websites
        .find_website(website.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(website.public_url.as_deref(), Some(url.as_str()));
    assert_eq!(website.last_successful_deployment_id, Some(deployment.id));
    assert!(website.last_deployed_at.is_some());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn publish_uploads_rendered_site(ctx: &TestHarness) {
    let website = create_test_website(&ctx.deps, "Corner Bakery").await;
    let queued = publish(website.id, website.user_id, Some("First cut".into()), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(queued.commit_message.as_deref(), Some("First cut"));

    ctx.run_deployment_jobs().await;

    let deploys = ctx.mocks.hosting.deploys();
    assert_eq!(deploys.len(), 1);
    let bundle = &deploys[0];
    assert_eq!(bundle.name, "corner-bakery");
    assert_eq!(bundle.deployment_id, queued.id);
    assert_eq!(bundle.alias, None);

    let paths: Vec<&str> = bundle.files.iter().map(|f| f.file.as_str()).collect();
    for expected in ["index.html", "about.html", "styles.css", "robots.txt"] {
        assert!(paths.contains(&expected), "missing {} in {:?}", expected, paths);
    }
    // No public URL or primary domain yet, so no sitemap
    assert!(!paths.contains(&"sitemap.xml"));

    let deployment = get_deployment(queued.id, &ctx.deps).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Success);
    assert_eq!(
        deployment.deployment_url.as_deref(),
        Some(MockHostingProvider::url_for("corner-bakery").as_str())
    );
    assert_eq!(
        deployment.provider_deployment_id,
        Some(format!("dpl_{}", queued.id))
    );
    assert!(deployment
        .build_logs
        .iter()
        .any(|line| line.contains("Validation passed")));

    // Live (non-simulated) deploys get a post-deploy probe; its failure is only logged
    assert!(ctx
        .mocks
        .prober
        .was_probed(&MockHostingProvider::url_for("corner-bakery")));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn default_commit_message_uses_version(ctx: &TestHarness) {
    let website = create_test_website(&ctx.deps, "Acme").await;

    let deployment = publish(website.id, website.user_id, Some("   ".into()), &ctx.deps)
        .await
        .unwrap();

    assert_eq!(
        deployment.commit_message,
        Some(format!("Deploy {}", deployment.version))
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn build_directories_are_removed(ctx: &TestHarness) {
    let website = create_test_website(&ctx.deps, "Acme").await;
    publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();

    ctx.run_deployment_jobs().await;

    let leftovers = std::fs::read_dir(ctx.build_root()).unwrap().count();
    assert_eq!(leftovers, 0);
}

// =============================================================================
// Admission
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn second_publish_while_active_is_rejected(ctx: &TestHarness) {
    let website = create_test_website(&ctx.deps, "Acme").await;
    let first = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();

    let err = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap_err();

    match err.downcast_ref::<PublishError>() {
        Some(PublishError::Conflict {
            active_deployment_id,
            ..
        }) => assert_eq!(*active_deployment_id, first.id),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert_eq!(ctx.mocks.store.deployment_count(), 1);
    assert_eq!(ctx.mocks.queue.jobs().len(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn publish_allowed_again_after_finish(ctx: &TestHarness) {
    let website = create_test_website(&ctx.deps, "Acme").await;
    let first = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();
    ctx.run_deployment_jobs().await;

    let second = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();

    let history = list_deployments(website.id, &ctx.deps).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn publish_unknown_website_is_not_found(ctx: &TestHarness) {
    let missing = server_core::common::WebsiteId::new();

    let err = publish(missing, UserId::new(), None, &ctx.deps)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PublishError>(),
        Some(PublishError::WebsiteNotFound(_))
    ));
    assert_eq!(ctx.mocks.store.deployment_count(), 0);
}

// =============================================================================
// Failures
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn provider_failure_marks_deployment_failed(ctx: &TestHarness) {
    ctx.mocks.hosting.fail_deploys(503, "upstream unavailable");
    let website = create_test_website(&ctx.deps, "Acme").await;
    let queued = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();

    ctx.run_deployment_jobs().await;

    let deployment = get_deployment(queued.id, &ctx.deps).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    let error = deployment.error_message.expect("error message");
    assert!(error.contains("upstream unavailable"), "{}", error);
    assert!(deployment
        .build_logs
        .iter()
        .any(|line| line.contains("Deployment failed")));

    // A pipeline failure is a finished job, not a retry
    let counts = ctx.deps.jobs.counts(QueueName::Deployment).await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.delayed, 0);

    let website = ctx
        .deps
        .websites
        .find_website(website.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(website.public_url, None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn broken_link_fails_validation_before_upload(ctx: &TestHarness) {
    let content = json!({"pages": [{"title": "Home", "isHome": true, "elements": [
        {"type": "custom", "content": {"html": "<a href=\"pricing.html\">Pricing</a>"}}
    ]}]});
    let website = create_website_with_content(&ctx.deps, "Acme", content).await;
    let queued = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();

    ctx.run_deployment_jobs().await;

    let deployment = get_deployment(queued.id, &ctx.deps).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    let error = deployment.error_message.unwrap();
    assert!(
        error.contains("Broken link in index.html: pricing.html"),
        "{}",
        error
    );
    assert!(ctx.mocks.hosting.deploys().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn content_without_pages_fails_render(ctx: &TestHarness) {
    let website = create_website_with_content(&ctx.deps, "Acme", json!({"pages": []})).await;
    let queued = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();

    ctx.run_deployment_jobs().await;

    let deployment = get_deployment(queued.id, &ctx.deps).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert!(deployment.error_message.unwrap().contains("Render error"));
}

#[tokio::test]
async fn unreachable_store_retries_then_marks_failed() {
    let mut ctx = TestHarness::new().expect("harness");
    let website = create_test_website(&ctx.deps, "Acme").await;
    let queued = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();

    ctx.deps.websites = Arc::new(UnavailableWebsiteStore);
    let job_id = queued.id.into_uuid();

    // Deployment queue allows three attempts
    for attempt in 1..=3 {
        assert_eq!(ctx.run_deployment_jobs().await, 1, "attempt {}", attempt);
        let job = ctx.mocks.queue.jobs().into_iter().find(|j| j.id == job_id).unwrap();
        assert_eq!(job.attempts, attempt);
        if attempt < 3 {
            assert_eq!(job.state, JobState::Delayed);
            let deployment = get_deployment(queued.id, &ctx.deps).await.unwrap();
            assert!(!deployment.is_terminal());
            ctx.mocks.queue.make_due(job_id).unwrap();
        } else {
            assert_eq!(job.state, JobState::Failed);
        }
    }

    let deployment = get_deployment(queued.id, &ctx.deps).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    let error = deployment.error_message.unwrap();
    assert!(error.starts_with("Deployment job failed after 3 attempts"), "{}", error);
    assert!(error.contains("website store unavailable"), "{}", error);
}

// =============================================================================
// Idempotence, rollback, drain
// =============================================================================

#[test_context(TestHarness)]
#[tokio::test]
async fn processing_finished_deployment_changes_nothing(ctx: &TestHarness) {
    let website = create_test_website(&ctx.deps, "Acme").await;
    let queued = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();
    ctx.run_deployment_jobs().await;
    let finished = get_deployment(queued.id, &ctx.deps).await.unwrap();

    let again = process_deployment(queued.id, &ctx.deps).await.unwrap();

    assert_eq!(again.status, DeploymentStatus::Success);
    assert_eq!(again.completed_at, finished.completed_at);
    assert_eq!(again.build_logs, finished.build_logs);
    assert_eq!(ctx.mocks.hosting.deploys().len(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn rollback_republishes_earlier_snapshot(ctx: &TestHarness) {
    let website = create_test_website(&ctx.deps, "Acme").await;
    let original = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();
    ctx.run_deployment_jobs().await;
    let original = get_deployment(original.id, &ctx.deps).await.unwrap();

    // The site changes after the first publish
    let mut edited = ctx
        .deps
        .websites
        .find_website(website.id)
        .await
        .unwrap()
        .unwrap();
    edited.content = json!({"pages": [{"title": "Home", "isHome": true}]});
    ctx.deps.websites.insert_website(edited).await.unwrap();

    let restored = rollback(original.id, website.user_id, &ctx.deps)
        .await
        .unwrap();
    assert_eq!(restored.rollback_of, Some(original.id));
    assert_eq!(
        restored.commit_message,
        Some(format!("Rollback to {}", original.version))
    );
    assert_eq!(restored.content_snapshot, original.content_snapshot);

    ctx.run_deployment_jobs().await;

    let restored = get_deployment(restored.id, &ctx.deps).await.unwrap();
    assert_eq!(restored.status, DeploymentStatus::Success);
    let website = ctx
        .deps
        .websites
        .find_website(website.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(website.last_successful_deployment_id, Some(restored.id));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn rollback_requires_successful_target(ctx: &TestHarness) {
    ctx.mocks.hosting.fail_deploys(500, "boom");
    let website = create_test_website(&ctx.deps, "Acme").await;
    let failed = publish(website.id, website.user_id, None, &ctx.deps)
        .await
        .unwrap();
    ctx.run_deployment_jobs().await;

    let err = rollback(failed.id, website.user_id, &ctx.deps)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PublishError>(),
        Some(PublishError::NotRollbackable(id)) if *id == failed.id
    ));
    assert_eq!(ctx.mocks.store.deployment_count(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn drain_processes_queued_and_removes_jobs(ctx: &TestHarness) {
    let first = create_test_website(&ctx.deps, "First").await;
    let second = create_test_website(&ctx.deps, "Second").await;
    publish(first.id, first.user_id, None, &ctx.deps).await.unwrap();
    publish(second.id, second.user_id, None, &ctx.deps).await.unwrap();

    let summary = drain_queued(&ctx.deps).await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert!(ctx.mocks.queue.jobs().is_empty());
    assert_eq!(ctx.run_deployment_jobs().await, 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn drain_leaves_claimed_deployments_to_their_worker(ctx: &TestHarness) {
    let first = create_test_website(&ctx.deps, "First").await;
    let second = create_test_website(&ctx.deps, "Second").await;
    let a = publish(first.id, first.user_id, None, &ctx.deps).await.unwrap();
    let b = publish(second.id, second.user_id, None, &ctx.deps).await.unwrap();

    let claimed = ctx
        .mocks
        .queue
        .claim(QueueName::Deployment, "other-worker")
        .await
        .unwrap()
        .expect("claimable job");
    let (held, free) = if claimed.id == a.id.into_uuid() { (a, b) } else { (b, a) };

    let summary = drain_queued(&ctx.deps).await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 1);
    let deploys = ctx.mocks.hosting.deploys();
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].deployment_id, free.id);
    let untouched = get_deployment(held.id, &ctx.deps).await.unwrap();
    assert_eq!(untouched.status, DeploymentStatus::Queued);
}

// =============================================================================
// Render and validate
// =============================================================================

#[test]
fn rendered_site_passes_validation_until_stylesheet_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RenderContext {
        site_name: "Acme".to_string(),
        base_url: Some("https://acme.example.com".to_string()),
    };

    render_site(
        &common::sample_content(),
        &common::sample_settings(),
        &ctx,
        dir.path(),
    )
    .unwrap();

    let report = validate_build(dir.path()).unwrap();
    assert!(report.valid, "{:?}", report.errors);
    assert!(dir.path().join("sitemap.xml").exists());

    std::fs::remove_file(dir.path().join("styles.css")).unwrap();
    let report = validate_build(dir.path()).unwrap();
    assert!(!report.valid);
    assert!(report
        .errors
        .contains(&"Missing required file: styles.css".to_string()));
}
