//! Website domain - the content records publishing reads, and the renderer

pub mod models;
pub mod render;

pub use models::{Block, SiteContent, SiteSettings, Website};
pub use render::{render_site, RenderContext, RenderSummary};
