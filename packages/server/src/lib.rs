// Site Publishing Core
//
// This crate renders user-built websites to static files, publishes them to a
// static hosting provider and manages the custom domains they are served on.
// Long-running work (deployments, domain verification) runs on durable job
// queues processed by workers.
//
// Business logic lives per-domain in domains/*/activities/

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
