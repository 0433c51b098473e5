//! Deployments domain - publishing websites to the hosting provider

pub mod activities;
pub mod jobs;
pub mod models;

pub use jobs::DeploymentJobHandler;
pub use models::{Deployment, DeploymentStatus};
