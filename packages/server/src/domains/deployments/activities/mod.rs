//! Deployment activities - the publishing pipeline and its entry points

pub mod package;
pub mod publish;
pub mod validate;
pub mod webhook;

pub use package::package_build;
pub use publish::{
    drain_queued, get_deployment, list_deployments, mark_terminal, process_deployment, publish,
    rollback, DrainSummary, TerminalDetails,
};
pub use validate::{validate_build, verify_published_url, ValidationReport};
pub use webhook::{apply_provider_event, map_provider_state, WebhookOutcome};
