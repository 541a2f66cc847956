//! Scanning the modules root for installed module directories.

use std::path::{Path, PathBuf};

use modhost_registry::Slug;
use tokio::fs;
use tracing::debug;

/// A module directory found on disk. Recomputed on every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredModule {
    /// Lowercased, trimmed directory name.
    pub slug: String,
    /// Directory name with its on-disk casing.
    pub dir_name: String,
    pub path: PathBuf,
}

/// List module directories under `modules_root`, sorted by directory name.
///
/// A missing root yields an empty list. Hidden directories and plain files
/// are ignored.
pub async fn discover(modules_root: &Path) -> Vec<DiscoveredModule> {
    let mut found = Vec::new();

    let mut entries = match fs::read_dir(modules_root).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(root = %modules_root.display(), "Modules root not readable: {}", e);
            return found;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }
        let Some(dir_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if dir_name.starts_with('.') {
            continue;
        }
        found.push(DiscoveredModule {
            slug: Slug::normalize(&dir_name),
            dir_name,
            path: entry.path(),
        });
    }

    found.sort_by(|a, b| a.dir_name.cmp(&b.dir_name));
    found
}

/// Find the on-disk directory for `slug`, matching case-insensitively.
pub async fn find_module_dir(modules_root: &Path, slug: &str) -> Option<DiscoveredModule> {
    discover(modules_root)
        .await
        .into_iter()
        .find(|module| module.slug == slug)
}
