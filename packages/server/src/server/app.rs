//! Application setup and server configuration.

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::ServerDeps;
use crate::server::routes::{
    add_domain_handler, clean_queue_handler, drain_handler, get_deployment_handler,
    health_handler, hosting_webhook_handler, list_deployments_handler, list_domains_handler,
    pause_queue_handler, promote_queue_handler, publish_handler, queue_counts_handler,
    remove_domain_handler, resume_queue_handler, retry_job_handler, rollback_handler,
    set_primary_domain_handler, verify_domain_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: ServerDeps,
}

/// Build the Axum application router
pub fn build_app(deps: ServerDeps) -> Router {
    let app_state = AppState { deps };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Publishing
        .route(
            "/websites/:id/deployments",
            post(publish_handler).get(list_deployments_handler),
        )
        .route("/deployments/:id", get(get_deployment_handler))
        .route("/deployments/:id/rollback", post(rollback_handler))
        // Custom domains
        .route(
            "/websites/:id/domains",
            post(add_domain_handler).get(list_domains_handler),
        )
        .route("/websites/:id/primary-domain", post(set_primary_domain_handler))
        .route("/domains/:id", delete(remove_domain_handler))
        .route("/domains/:id/verify", post(verify_domain_handler))
        // Provider callbacks
        .route("/webhooks/hosting", post(hosting_webhook_handler))
        // Operator surface
        .route("/admin/deployments/drain", post(drain_handler))
        .route("/admin/queues/:queue", get(queue_counts_handler))
        .route("/admin/queues/:queue/pause", post(pause_queue_handler))
        .route("/admin/queues/:queue/resume", post(resume_queue_handler))
        .route("/admin/queues/:queue/promote", post(promote_queue_handler))
        .route("/admin/queues/:queue/clean", post(clean_queue_handler))
        .route("/admin/queues/:queue/jobs/:id/retry", post(retry_job_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
