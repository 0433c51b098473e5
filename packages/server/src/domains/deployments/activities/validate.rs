//! Structural checks on a build directory (before upload) and on the
//! published URL (after upload).

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domains::website::render::{INDEX_PAGE, STYLESHEET};
use crate::kernel::BaseEndpointProber;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Pre-deploy check. Any error here aborts the deployment before the
/// provider is contacted.
pub fn validate_build(build_dir: &Path) -> Result<ValidationReport> {
    let mut errors = Vec::new();

    for required in [INDEX_PAGE, STYLESHEET] {
        if !build_dir.join(required).is_file() {
            errors.push(format!("Missing required file: {}", required));
        }
    }

    let index_path = build_dir.join(INDEX_PAGE);
    if index_path.is_file() {
        let html = fs::read_to_string(&index_path)
            .with_context(|| format!("Failed to read {}", index_path.display()))?;
        errors.extend(check_document_structure(INDEX_PAGE, &html));
    }

    for page in html_files(build_dir)? {
        let html = fs::read_to_string(build_dir.join(&page))
            .with_context(|| format!("Failed to read {}", page.display()))?;
        for link in local_links(&html) {
            if !link_resolves(build_dir, &page, &link) {
                errors.push(format!(
                    "Broken link in {}: {}",
                    display_path(&page),
                    link
                ));
            }
        }
    }

    debug!(dir = %build_dir.display(), errors = errors.len(), "Validated build directory");
    Ok(ValidationReport::from_errors(errors))
}

/// Best-effort check that the published URL serves the site. Never fails;
/// problems come back in the report.
pub async fn verify_published_url(url: &str, prober: &dyn BaseEndpointProber) -> ValidationReport {
    let mut errors = Vec::new();
    match prober.get(url).await {
        Ok(response) => {
            if response.status != 200 {
                errors.push(format!("{} returned HTTP {}", url, response.status));
            }
            let content_type = response.header("content-type").unwrap_or_default();
            if !content_type.contains("text/html") {
                errors.push(format!(
                    "{} has content-type '{}', expected text/html",
                    url, content_type
                ));
            }
            if !response.body.to_ascii_lowercase().contains("<!doctype html") {
                errors.push(format!("{} response is missing a doctype", url));
            }
        }
        Err(e) => errors.push(format!("{} is not reachable: {}", url, e)),
    }

    if !errors.is_empty() {
        warn!(url = %url, errors = ?errors, "Post-deploy check failed");
    }
    ValidationReport::from_errors(errors)
}

/// The parser synthesizes missing tags, so the raw source is checked.
fn check_document_structure(name: &str, html: &str) -> Vec<String> {
    let lower = html.to_ascii_lowercase();
    let mut errors = Vec::new();
    if !lower.contains("<!doctype html") {
        errors.push(format!("{} is missing a doctype", name));
    }
    for tag in ["html", "head", "body"] {
        let open = format!("<{}", tag);
        let found = lower.match_indices(&open).any(|(i, _)| {
            lower[i + open.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '>' || c.is_whitespace())
        });
        if !found {
            errors.push(format!("{} is missing a <{}> tag", name, tag));
        }
    }
    errors
}

/// All `.html` files, relative to `root`, in stable order.
fn html_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    let mut stack = vec![PathBuf::new()];
    while let Some(rel) = stack.pop() {
        let dir = root.join(&rel);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
        };
        for entry in entries {
            let entry = entry?;
            let path = rel.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "html") {
                found.insert(path);
            }
        }
    }
    Ok(found.into_iter().collect())
}

/// `href`/`src` values that point inside the site, query and fragment removed.
fn local_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = BTreeSet::new();

    for attr in ["href", "src"] {
        let Ok(selector) = Selector::parse(&format!("[{}]", attr)) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(value) = element.value().attr(attr) else {
                continue;
            };
            if let Some(link) = local_target(value) {
                links.insert(link);
            }
        }
    }
    links.into_iter().collect()
}

fn local_target(value: &str) -> Option<String> {
    let value = value.trim();
    let lower = value.to_ascii_lowercase();
    const SKIPPED: [&str; 8] = [
        "http://",
        "https://",
        "//",
        "#",
        "mailto:",
        "tel:",
        "data:",
        "javascript:",
    ];
    if value.is_empty() || SKIPPED.iter().any(|prefix| lower.starts_with(prefix)) {
        return None;
    }
    let end = value.find(['?', '#']).unwrap_or(value.len());
    let path = &value[..end];
    (!path.is_empty()).then(|| path.to_string())
}

/// Resolve `link` relative to `page` without leaving `root`.
fn link_resolves(root: &Path, page: &Path, link: &str) -> bool {
    let mut resolved: Vec<String> = Vec::new();
    if !link.starts_with('/') {
        if let Some(parent) = page.parent() {
            for component in parent.components() {
                if let Component::Normal(part) = component {
                    resolved.push(part.to_string_lossy().into_owned());
                }
            }
        }
    }

    for part in link.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if resolved.pop().is_none() {
                    return false;
                }
            }
            other => resolved.push(other.to_string()),
        }
    }

    let target = resolved.iter().fold(root.to_path_buf(), |path, part| path.join(part));
    target.is_file() || target.join(INDEX_PAGE).is_file()
}

fn display_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
