// Common types shared across the kernel and domain layers

pub mod entity_ids;
pub mod errors;
pub mod id;
pub mod utils;

pub use entity_ids::{DeploymentId, DomainId, UserId, WebsiteId};
pub use errors::{DomainError, PublishError, QueueError, VerificationError};
pub use id::Id;
