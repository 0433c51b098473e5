// HTTP routes
pub mod deployments;
pub mod domains;
pub mod health;
pub mod queues;
pub mod webhooks;

pub use deployments::*;
pub use domains::*;
pub use health::*;
pub use queues::*;
pub use webhooks::*;
