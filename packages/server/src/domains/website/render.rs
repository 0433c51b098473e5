//! Static site renderer.
//!
//! Turns a content/settings snapshot into a build directory:
//!
//! ```text
//! <build dir>/
//!     index.html        home page
//!     <slug>.html       every other page
//!     styles.css        generated from color/font settings
//!     robots.txt
//!     sitemap.xml       only when a public base URL is known
//!     assets/
//! ```
//!
//! Rendering is synchronous CPU + local file work; callers run it between
//! network calls without extra scheduling.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Datelike, Utc};
use tracing::debug;

use super::models::{
    Block, ContactBlock, CtaBlock, FeaturesBlock, HeroBlock, ImageBlock, Page, SiteContent,
    SiteSettings, TextBlock,
};
use crate::common::utils::slugify;
use crate::common::PublishError;

pub const STYLESHEET: &str = "styles.css";
pub const INDEX_PAGE: &str = "index.html";
pub const ROBOTS: &str = "robots.txt";
pub const SITEMAP: &str = "sitemap.xml";
pub const ASSETS_DIR: &str = "assets";

/// Site-level values the templates need beyond the content model.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub site_name: String,
    /// Public URL of the live site, when one is known. Enables `sitemap.xml`.
    pub base_url: Option<String>,
}

/// What a render produced, relative to the build directory.
#[derive(Debug, Clone, Default)]
pub struct RenderSummary {
    pub pages: Vec<String>,
    pub files: Vec<String>,
}

/// A page with its resolved output file name.
struct PlannedPage<'a> {
    page: &'a Page,
    file_name: String,
    title: String,
}

/// Render `content` + `settings` into `out_dir`.
///
/// Fails with [`PublishError::Render`] when the models do not parse or
/// contain no pages.
pub fn render_site(
    content: &serde_json::Value,
    settings: &serde_json::Value,
    ctx: &RenderContext,
    out_dir: &Path,
) -> Result<RenderSummary> {
    let content = SiteContent::from_json(content)?;
    let settings = SiteSettings::from_json(settings)?;

    if content.pages.is_empty() {
        return Err(PublishError::Render("site has no pages".to_string()).into());
    }

    let planned = plan_pages(&content.pages);
    let nav = render_nav(&planned);
    let mut summary = RenderSummary::default();

    fs::create_dir_all(out_dir.join(ASSETS_DIR))
        .with_context(|| format!("creating {}", out_dir.display()))?;

    for planned_page in &planned {
        let html = render_page(planned_page, &nav, ctx)?;
        write_file(out_dir, &planned_page.file_name, &html)?;
        summary.pages.push(planned_page.file_name.clone());
        summary.files.push(planned_page.file_name.clone());
    }

    write_file(out_dir, STYLESHEET, &render_stylesheet(&settings))?;
    summary.files.push(STYLESHEET.to_string());

    let mut robots = String::from("User-agent: *\nAllow: /\n");
    if let Some(base) = ctx.base_url.as_deref().map(|b| b.trim_end_matches('/')) {
        let _ = write!(robots, "\nSitemap: {}/{}\n", base, SITEMAP);
        write_file(out_dir, SITEMAP, &render_sitemap(base, &summary.pages))?;
        summary.files.push(SITEMAP.to_string());
    }
    write_file(out_dir, ROBOTS, &robots)?;
    summary.files.push(ROBOTS.to_string());

    debug!(pages = summary.pages.len(), dir = %out_dir.display(), "Rendered site");
    Ok(summary)
}

fn write_file(out_dir: &Path, name: &str, contents: &str) -> Result<()> {
    let path = out_dir.join(name);
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))
}

/// Pick the home page and give every page a unique file name.
fn plan_pages(pages: &[Page]) -> Vec<PlannedPage<'_>> {
    let home_index = pages.iter().position(|p| p.is_home).unwrap_or(0);
    let mut used: HashSet<String> = HashSet::from([INDEX_PAGE.to_string()]);
    let mut planned = Vec::with_capacity(pages.len());

    for (i, page) in pages.iter().enumerate() {
        let title = if page.title.trim().is_empty() {
            if i == home_index {
                "Home".to_string()
            } else {
                format!("Page {}", i + 1)
            }
        } else {
            page.title.trim().to_string()
        };

        let file_name = if i == home_index {
            INDEX_PAGE.to_string()
        } else {
            let mut base = slugify(&page.slug);
            if base.is_empty() {
                base = slugify(&title);
            }
            if base.is_empty() || base == "index" {
                base = format!("page-{}", i + 1);
            }
            let mut candidate = format!("{}.html", base);
            let mut n = 2;
            while used.contains(&candidate) {
                candidate = format!("{}-{}.html", base, n);
                n += 1;
            }
            candidate
        };
        used.insert(file_name.clone());

        planned.push(PlannedPage {
            page,
            file_name,
            title,
        });
    }

    // home first in navigation
    planned.sort_by_key(|p| p.file_name != INDEX_PAGE);
    planned
}

fn render_nav(pages: &[PlannedPage<'_>]) -> String {
    let mut nav = String::from("<nav class=\"site-nav\">");
    for p in pages {
        let _ = write!(
            nav,
            "<a href=\"{}\">{}</a>",
            escape_html(&p.file_name),
            escape_html(&p.title)
        );
    }
    nav.push_str("</nav>");
    nav
}

fn render_page(planned: &PlannedPage<'_>, nav: &str, ctx: &RenderContext) -> Result<String> {
    let mut body = String::new();
    for element in &planned.page.elements {
        body.push_str(&render_block(&element.block()?));
        body.push('\n');
    }

    Ok(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} | {site}</title>
<link rel="stylesheet" href="{stylesheet}">
</head>
<body>
<header class="site-header"><span class="site-name">{site}</span>{nav}</header>
<main>
{body}</main>
<footer class="site-footer"><p>&copy; {year} {site}</p></footer>
</body>
</html>
"#,
        title = escape_html(&planned.title),
        site = escape_html(&ctx.site_name),
        stylesheet = STYLESHEET,
        nav = nav,
        body = body,
        year = Utc::now().year(),
    ))
}

/// One template per block variant.
fn render_block(block: &Block) -> String {
    match block {
        Block::Hero(hero) => render_hero(hero),
        Block::Text(text) => render_text(text),
        Block::Features(features) => render_features(features),
        Block::Image(image) => render_image(image),
        Block::Cta(cta) => render_cta(cta),
        Block::Contact(contact) => render_contact(contact),
        // Trusted input: custom HTML is injected without sanitization.
        Block::Custom(custom) => format!("<div class=\"custom-block\">{}</div>", custom.html),
        Block::Unknown(kind) => format!(
            "<!-- unknown element type: {kind} -->\n<div class=\"element-placeholder\" data-element-type=\"{kind}\">Unsupported element</div>",
            kind = escape_html(kind)
        ),
    }
}

fn render_hero(hero: &HeroBlock) -> String {
    let mut html = format!(
        "<section class=\"hero\"><h1>{}</h1>",
        escape_html(&hero.headline)
    );
    if let Some(sub) = &hero.subheadline {
        let _ = write!(html, "<p class=\"subheadline\">{}</p>", escape_html(sub));
    }
    if let (Some(text), Some(link)) = (&hero.cta_text, &hero.cta_link) {
        let _ = write!(
            html,
            "<a class=\"button\" href=\"{}\">{}</a>",
            escape_html(link),
            escape_html(text)
        );
    }
    html.push_str("</section>");
    html
}

fn render_text(text: &TextBlock) -> String {
    let mut html = String::from("<section class=\"text\">");
    if let Some(heading) = &text.heading {
        let _ = write!(html, "<h2>{}</h2>", escape_html(heading));
    }
    for paragraph in text.body.split("\n\n").filter(|p| !p.trim().is_empty()) {
        let _ = write!(html, "<p>{}</p>", escape_html(paragraph.trim()));
    }
    html.push_str("</section>");
    html
}

fn render_features(features: &FeaturesBlock) -> String {
    let mut html = String::from("<section class=\"features\">");
    if let Some(title) = &features.title {
        let _ = write!(html, "<h2>{}</h2>", escape_html(title));
    }
    html.push_str("<div class=\"feature-grid\">");
    for item in &features.items {
        let _ = write!(
            html,
            "<div class=\"feature\"><h3>{}</h3><p>{}</p></div>",
            escape_html(&item.title),
            escape_html(&item.description)
        );
    }
    html.push_str("</div></section>");
    html
}

fn render_image(image: &ImageBlock) -> String {
    let mut html = format!(
        "<figure class=\"image\"><img src=\"{}\" alt=\"{}\">",
        escape_html(&image.src),
        escape_html(&image.alt)
    );
    if let Some(caption) = &image.caption {
        let _ = write!(html, "<figcaption>{}</figcaption>", escape_html(caption));
    }
    html.push_str("</figure>");
    html
}

fn render_cta(cta: &CtaBlock) -> String {
    format!(
        "<section class=\"cta\"><h2>{}</h2><a class=\"button\" href=\"{}\">{}</a></section>",
        escape_html(&cta.headline),
        escape_html(&cta.button_link),
        escape_html(&cta.button_text)
    )
}

fn render_contact(contact: &ContactBlock) -> String {
    let mut html = String::from("<section class=\"contact\" id=\"contact\">");
    let _ = write!(
        html,
        "<h2>{}</h2><ul>",
        escape_html(contact.heading.as_deref().unwrap_or("Contact"))
    );
    if let Some(email) = &contact.email {
        let _ = write!(
            html,
            "<li><a href=\"mailto:{e}\">{e}</a></li>",
            e = escape_html(email)
        );
    }
    if let Some(phone) = &contact.phone {
        let _ = write!(
            html,
            "<li><a href=\"tel:{p}\">{p}</a></li>",
            p = escape_html(phone)
        );
    }
    if let Some(address) = &contact.address {
        let _ = write!(html, "<li>{}</li>", escape_html(address));
    }
    html.push_str("</ul></section>");
    html
}

fn render_sitemap(base: &str, pages: &[String]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for page in pages {
        let loc = if page == INDEX_PAGE {
            format!("{}/", base)
        } else {
            format!("{}/{}", base, page)
        };
        let _ = writeln!(xml, "  <url><loc>{}</loc></url>", escape_html(&loc));
    }
    xml.push_str("</urlset>\n");
    xml
}

fn render_stylesheet(settings: &SiteSettings) -> String {
    let c = &settings.colors;
    let f = &settings.fonts;
    format!(
        r#":root {{
  --color-primary: {primary};
  --color-secondary: {secondary};
  --color-background: {background};
  --color-text: {text};
  --font-heading: {heading};
  --font-body: {body};
}}

* {{ box-sizing: border-box; }}
body {{ margin: 0; font-family: var(--font-body); color: var(--color-text); background: var(--color-background); line-height: 1.6; }}
h1, h2, h3 {{ font-family: var(--font-heading); color: var(--color-secondary); }}
a {{ color: var(--color-primary); }}
main {{ max-width: 1080px; margin: 0 auto; padding: 2rem 1rem; }}
.site-header {{ display: flex; justify-content: space-between; align-items: center; padding: 1rem 2rem; background: var(--color-secondary); }}
.site-header .site-name {{ color: #fff; font-weight: 700; }}
.site-nav a {{ color: #fff; margin-left: 1rem; text-decoration: none; }}
.hero {{ padding: 4rem 0; text-align: center; }}
.button {{ display: inline-block; padding: 0.75rem 1.5rem; background: var(--color-primary); color: #fff; border-radius: 6px; text-decoration: none; }}
.feature-grid {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(220px, 1fr)); gap: 1.5rem; }}
.image img {{ max-width: 100%; height: auto; }}
.element-placeholder {{ padding: 1rem; border: 1px dashed #999; color: #666; }}
.site-footer {{ padding: 2rem; text-align: center; color: #666; }}
"#,
        primary = c.primary,
        secondary = c.secondary,
        background = c.background,
        text = c.text,
        heading = f.heading,
        body = f.body,
    )
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RenderContext {
        RenderContext {
            site_name: "Acme".to_string(),
            base_url: None,
        }
    }

    #[test]
    fn test_home_page_becomes_index() {
        let dir = tempfile::tempdir().unwrap();
        let content = json!({"pages": [
            {"title": "About", "slug": "about", "elements": []},
            {"title": "Home", "isHome": true, "elements": [
                {"type": "hero", "content": {"headline": "Welcome"}}
            ]}
        ]});

        let summary = render_site(&content, &json!({}), &ctx(), dir.path()).unwrap();

        assert_eq!(summary.pages, vec!["index.html", "about.html"]);
        let index = fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(index.contains("Welcome"));
        assert!(index.contains("href=\"about.html\""));
        assert!(dir.path().join("styles.css").exists());
        assert!(dir.path().join("robots.txt").exists());
        assert!(dir.path().join("assets").is_dir());
        assert!(!dir.path().join("sitemap.xml").exists());
    }

    #[test]
    fn test_sitemap_written_when_base_url_known() {
        let dir = tempfile::tempdir().unwrap();
        let content = json!({"pages": [{"isHome": true}, {"title": "About"}]});
        let ctx = RenderContext {
            site_name: "Acme".to_string(),
            base_url: Some("https://acme.example.com/".to_string()),
        };

        render_site(&content, &json!({}), &ctx, dir.path()).unwrap();

        let robots = fs::read_to_string(dir.path().join("robots.txt")).unwrap();
        assert!(robots.contains("Sitemap: https://acme.example.com/sitemap.xml"));
        let sitemap = fs::read_to_string(dir.path().join("sitemap.xml")).unwrap();
        assert!(sitemap.contains("<loc>https://acme.example.com/about.html</loc>"));
    }

    #[test]
    fn test_text_is_escaped_but_custom_html_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let content = json!({"pages": [{"isHome": true, "elements": [
            {"type": "text", "content": {"body": "<script>x</script>"}},
            {"type": "custom", "content": {"html": "<marquee>hi</marquee>"}}
        ]}]});

        render_site(&content, &json!({}), &ctx(), dir.path()).unwrap();
        let index = fs::read_to_string(dir.path().join("index.html")).unwrap();

        assert!(index.contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(index.contains("<marquee>hi</marquee>"));
    }

    #[test]
    fn test_unknown_element_renders_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let content = json!({"pages": [{"isHome": true, "elements": [
            {"type": "carousel", "content": {}}
        ]}]});

        render_site(&content, &json!({}), &ctx(), dir.path()).unwrap();
        let index = fs::read_to_string(dir.path().join("index.html")).unwrap();

        assert!(index.contains("data-element-type=\"carousel\""));
    }

    #[test]
    fn test_stylesheet_uses_settings() {
        let dir = tempfile::tempdir().unwrap();
        let content = json!({"pages": [{"isHome": true}]});
        let settings = json!({"colors": {"primary": "#ff6600"}, "fonts": {"heading": "Georgia"}});

        render_site(&content, &settings, &ctx(), dir.path()).unwrap();
        let css = fs::read_to_string(dir.path().join("styles.css")).unwrap();

        assert!(css.contains("--color-primary: #ff6600;"));
        assert!(css.contains("--font-heading: Georgia;"));
    }

    #[test]
    fn test_no_pages_is_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_site(&json!({"pages": []}), &json!({}), &ctx(), dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PublishError>(),
            Some(PublishError::Render(_))
        ));
    }

    #[test]
    fn test_duplicate_slugs_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let content = json!({"pages": [
            {"isHome": true},
            {"title": "Team", "slug": "team"},
            {"title": "Team", "slug": "team"}
        ]});

        let summary = render_site(&content, &json!({}), &ctx(), dir.path()).unwrap();
        assert_eq!(summary.pages, vec!["index.html", "team.html", "team-2.html"]);
    }
}
