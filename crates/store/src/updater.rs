//! Replacing the host's core module tree from a release archive.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::archive;
use crate::error::{ModuleError, Result};
use crate::fetcher::ArchiveFetcher;
use crate::utils::copy_dir_recursive;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreUpdateOutcome {
    pub path: PathBuf,
    pub files: u64,
}

pub struct CoreUpdater {
    fetcher: Arc<dyn ArchiveFetcher>,
    core_dir: PathBuf,
    archive_root: String,
    temp_dir: PathBuf,
}

impl CoreUpdater {
    pub fn new(
        fetcher: Arc<dyn ArchiveFetcher>,
        core_dir: impl Into<PathBuf>,
        archive_root: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            core_dir: core_dir.into(),
            archive_root: archive_root.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// Download the archive at `source_url` and swap its core folder in.
    ///
    /// The live tree is only replaced once the new one is fully staged next
    /// to it; if the swap fails the previous tree is put back.
    pub async fn update_core(&self, source_url: &str) -> Result<CoreUpdateOutcome> {
        let url = Url::parse(source_url).map_err(|e| ModuleError::InvalidSourceUrl {
            url: source_url.to_string(),
            source: Some(e.into()),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ModuleError::InvalidSourceUrl {
                url: source_url.to_string(),
                source: Some(eyre::eyre!("unsupported scheme '{}'", url.scheme())),
            });
        }

        info!(url = %url, "Downloading core update");
        let bytes = self.fetcher.fetch(&url).await.inspect_err(|e| {
            error!(url = %url, "Core download failed: {}", e);
        })?;

        let write_failed = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| ModuleError::StorageWriteFailed { path, source }
        };
        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(write_failed(&self.temp_dir))?;
        let scratch = tempfile::Builder::new()
            .prefix("core-update-")
            .tempdir_in(&self.temp_dir)
            .map_err(write_failed(&self.temp_dir))?;

        let archive_path = scratch.path().join("core.archive");
        tokio::fs::write(&archive_path, &bytes)
            .await
            .map_err(write_failed(&archive_path))?;

        let extracted = scratch.path().join("extracted");
        let core_dir = self.core_dir.clone();
        let archive_root = self.archive_root.clone();

        let result = tokio::task::spawn_blocking(move || {
            archive::extract(&archive_path, &extracted)?;
            let new_tree = extracted.join(&archive_root);
            if !new_tree.is_dir() {
                return Err(ModuleError::MissingExpectedFolder {
                    folder: archive_root,
                });
            }
            swap_in(&new_tree, &core_dir)
        })
        .await
        .unwrap_or_else(|e| {
            Err(ModuleError::CoreSwapFailed {
                reason: "update task failed".to_string(),
                source: Some(e.into()),
            })
        });

        match result {
            Ok(files) => {
                info!(path = %self.core_dir.display(), files, "Core updated");
                Ok(CoreUpdateOutcome {
                    path: self.core_dir.clone(),
                    files,
                })
            }
            Err(e) => {
                error!(url = %url, "Core update failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Replace `live` with a copy of `new_tree` using sibling renames.
fn swap_in(new_tree: &Path, live: &Path) -> Result<u64> {
    let swap_failed = |reason: String, source: Option<eyre::Report>| ModuleError::CoreSwapFailed { reason, source };

    let name = live
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| swap_failed(format!("'{}' has no usable name", live.display()), None))?;
    let parent = live.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .map_err(|e| swap_failed(format!("cannot create '{}'", parent.display()), Some(e.into())))?;

    let id = Uuid::new_v4();
    let staging = parent.join(format!(".{name}.staging-{id}"));
    let previous = parent.join(format!(".{name}.previous-{id}"));

    let files = match copy_dir_recursive(new_tree, &staging) {
        Ok(files) => files,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(swap_failed("cannot stage new core tree".to_string(), Some(e.into())));
        }
    };

    let had_previous = live.exists();
    if had_previous {
        if let Err(e) = fs::rename(live, &previous) {
            let _ = fs::remove_dir_all(&staging);
            return Err(swap_failed("cannot move current core aside".to_string(), Some(e.into())));
        }
    }

    if let Err(e) = fs::rename(&staging, live) {
        if had_previous {
            if let Err(restore) = fs::rename(&previous, live) {
                error!(
                    previous = %previous.display(),
                    "Cannot restore previous core tree: {}", restore
                );
            }
        }
        let _ = fs::remove_dir_all(&staging);
        return Err(swap_failed("cannot move new core into place".to_string(), Some(e.into())));
    }

    if had_previous {
        if let Err(e) = fs::remove_dir_all(&previous) {
            warn!(path = %previous.display(), "Cannot remove previous core tree: {}", e);
        }
    }
    Ok(files)
}
