pub mod content;
pub mod website;

pub use content::*;
pub use website::*;
