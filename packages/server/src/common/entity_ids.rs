//! Typed ID definitions for the publishing entities.

pub use super::id::Id;

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for Website records (owned by the content service).
pub struct Website;

/// Marker type for Deployment records.
pub struct Deployment;

/// Marker type for custom Domain records.
pub struct Domain;

/// Marker type for platform users.
pub struct User;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

pub type WebsiteId = Id<Website>;

pub type DeploymentId = Id<Deployment>;

pub type DomainId = Id<Domain>;

pub type UserId = Id<User>;
