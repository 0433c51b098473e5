// Business domains
pub mod custom_domains;
pub mod deployments;
pub mod website;

use std::sync::Arc;

use crate::kernel::jobs::JobHandler;
use crate::kernel::ServerDeps;

/// One handler per queue, for the workers.
pub fn job_handlers(deps: &ServerDeps) -> Vec<Arc<dyn JobHandler>> {
    vec![
        Arc::new(deployments::DeploymentJobHandler::new(deps.clone())),
        Arc::new(custom_domains::DomainVerificationJobHandler::new(deps.clone())),
    ]
}
