pub mod content_hash;
pub mod slug;

pub use content_hash::*;
pub use slug::*;
