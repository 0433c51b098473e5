//! Turn a build directory into the file list the hosting provider accepts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hosting_client::DeployFile;

use crate::common::utils::sha256_hex;

/// Every regular file under `build_dir`, sorted by path. Paths use forward
/// slashes and are relative to the site root.
pub fn package_build(build_dir: &Path) -> Result<Vec<DeployFile>> {
    let mut files = Vec::new();
    let mut stack = vec![PathBuf::new()];

    while let Some(rel) = stack.pop() {
        let dir = build_dir.join(&rel);
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let entry = entry?;
            let path = rel.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let bytes = fs::read(entry.path())
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                files.push(deploy_file(&path, &bytes));
            }
        }
    }

    files.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(files)
}

fn deploy_file(path: &Path, bytes: &[u8]) -> DeployFile {
    let file = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    DeployFile {
        file,
        sha: sha256_hex(bytes),
        size: bytes.len() as u64,
        content: STANDARD.encode(bytes),
    }
}
