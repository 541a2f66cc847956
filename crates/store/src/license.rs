use std::path::{Path, PathBuf};

use modhost_registry::Slug;
use tokio::fs;
use tracing::info;

use crate::error::{ModuleError, Result};

/// Shortest license key accepted by [`LicenseStore::save`].
pub const MIN_LICENSE_LEN: usize = 10;

/// One key file per slug under the licenses directory.
#[derive(Debug, Clone)]
pub struct LicenseStore {
    dir: PathBuf,
}

impl LicenseStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key_path(&self, slug: &Slug) -> PathBuf {
        self.dir.join(format!("{slug}.key"))
    }

    /// Check the local format rule. No remote verification happens here.
    pub fn validate(slug: &Slug, license: &str) -> Result<()> {
        if license.chars().count() < MIN_LICENSE_LEN {
            return Err(ModuleError::LicenseTooShort {
                slug: slug.to_string(),
                min: MIN_LICENSE_LEN,
            });
        }
        Ok(())
    }

    /// Write `license` for `slug`, replacing any earlier key.
    pub async fn save(&self, slug: &Slug, license: &str) -> Result<PathBuf> {
        Self::validate(slug, license)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ModuleError::StorageWriteFailed {
                path: self.dir.clone(),
                source,
            })?;

        let path = self.key_path(slug);
        fs::write(&path, license)
            .await
            .map_err(|source| ModuleError::StorageWriteFailed {
                path: path.clone(),
                source,
            })?;

        info!(slug = %slug, "License key saved");
        Ok(path)
    }

    pub async fn exists(&self, slug: &Slug) -> bool {
        fs::try_exists(self.key_path(slug)).await.unwrap_or(false)
    }
}
