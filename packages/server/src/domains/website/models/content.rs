//! Website content and settings models.
//!
//! The content service stores these as free-form JSON. Parsing happens here:
//! pages and elements are strongly typed, and each element's `type` tag is
//! resolved into a [`Block`] variant. Tags the renderer does not know become
//! [`Block::Unknown`] instead of an error, so a typo shows up as a visible
//! placeholder on the page.

use serde::{Deserialize, Serialize};

use crate::common::PublishError;

/// Parsed content model: ordered pages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteContent {
    #[serde(default)]
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub is_home: bool,
    #[serde(default)]
    pub elements: Vec<Element>,
}

/// Element as stored: a type tag plus an untyped content object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HeroBlock {
    pub headline: String,
    pub subheadline: Option<String>,
    pub cta_text: Option<String>,
    pub cta_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextBlock {
    pub heading: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeatureItem {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeaturesBlock {
    pub title: Option<String>,
    pub items: Vec<FeatureItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageBlock {
    pub src: String,
    pub alt: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CtaBlock {
    pub headline: String,
    pub button_text: String,
    pub button_link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContactBlock {
    pub heading: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CustomBlock {
    pub html: String,
}

/// One renderable element. Every variant has exactly one HTML template.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Hero(HeroBlock),
    Text(TextBlock),
    Features(FeaturesBlock),
    Image(ImageBlock),
    Cta(CtaBlock),
    Contact(ContactBlock),
    /// Raw HTML, injected verbatim.
    Custom(CustomBlock),
    /// Unrecognized type tag.
    Unknown(String),
}

impl Element {
    /// Resolve the type tag and parse the content for that variant.
    pub fn block(&self) -> Result<Block, PublishError> {
        fn parse<T: serde::de::DeserializeOwned + Default>(
            kind: &str,
            content: &serde_json::Value,
        ) -> Result<T, PublishError> {
            if content.is_null() {
                return Ok(T::default());
            }
            serde_json::from_value(content.clone())
                .map_err(|e| PublishError::Render(format!("invalid {} element: {}", kind, e)))
        }

        let kind = self.kind.as_str();
        let block = match kind {
            "hero" => Block::Hero(parse(kind, &self.content)?),
            "text" => Block::Text(parse(kind, &self.content)?),
            "features" => Block::Features(parse(kind, &self.content)?),
            "image" => Block::Image(parse(kind, &self.content)?),
            "cta" => Block::Cta(parse(kind, &self.content)?),
            "contact" => Block::Contact(parse(kind, &self.content)?),
            "custom" => Block::Custom(parse(kind, &self.content)?),
            other => Block::Unknown(other.to_string()),
        };
        Ok(block)
    }
}

impl SiteContent {
    /// Parse the stored JSON content model.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PublishError> {
        serde_json::from_value(value.clone())
            .map_err(|e| PublishError::Render(format!("content is not a valid site model: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSettings {
    pub primary: String,
    pub secondary: String,
    pub background: String,
    pub text: String,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            primary: "#2563eb".to_string(),
            secondary: "#1e293b".to_string(),
            background: "#ffffff".to_string(),
            text: "#111827".to_string(),
        }
    }
}

const SYSTEM_FONT_STACK: &str =
    "-apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Helvetica, Arial, sans-serif";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSettings {
    pub heading: String,
    pub body: String,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            heading: SYSTEM_FONT_STACK.to_string(),
            body: SYSTEM_FONT_STACK.to_string(),
        }
    }
}

/// Visual settings; every field falls back to a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub colors: ColorSettings,
    pub fonts: FontSettings,
}

impl SiteSettings {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, PublishError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|e| PublishError::Render(format!("settings are not valid: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_and_unknown_blocks() {
        let hero = Element {
            kind: "hero".into(),
            content: json!({"headline": "Welcome"}),
        };
        let typo = Element {
            kind: "heor".into(),
            content: json!({"headline": "Welcome"}),
        };

        assert!(matches!(hero.block().unwrap(), Block::Hero(h) if h.headline == "Welcome"));
        assert_eq!(typo.block().unwrap(), Block::Unknown("heor".into()));
    }

    #[test]
    fn test_malformed_element_content_is_render_error() {
        let element = Element {
            kind: "text".into(),
            content: json!({"body": 42}),
        };
        assert!(matches!(element.block(), Err(PublishError::Render(_))));
    }

    #[test]
    fn test_content_must_be_an_object_with_pages() {
        assert!(SiteContent::from_json(&json!("just a string")).is_err());
        let content = SiteContent::from_json(&json!({"pages": [{"isHome": true}]})).unwrap();
        assert!(content.pages[0].is_home);
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings = SiteSettings::from_json(&json!({"colors": {"primary": "#ff0000"}})).unwrap();
        assert_eq!(settings.colors.primary, "#ff0000");
        assert_eq!(settings.colors.background, "#ffffff");
        assert_eq!(settings.fonts, FontSettings::default());
    }
}
