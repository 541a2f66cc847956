use std::path::{Path, PathBuf};

use modhost_registry::Slug;
use tokio::fs;
use tracing::debug;

use crate::archive::ArchiveFormat;
use crate::error::{ModuleError, Result};

const FORMATS: [ArchiveFormat; 2] = [ArchiveFormat::Zip, ArchiveFormat::TarGz];

/// Raw module archives kept after install so users can download them again.
#[derive(Debug, Clone)]
pub struct ArchiveCache {
    dir: PathBuf,
}

/// A cached archive ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArchive {
    pub path: PathBuf,
    pub file_name: String,
    pub format: ArchiveFormat,
}

impl ArchiveCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(slug: &Slug, format: ArchiveFormat) -> String {
        format!("{slug}.{}", format.extension())
    }

    /// Copy `source` into the cache as the archive for `slug`.
    ///
    /// A cached archive of the other format is removed.
    pub async fn store(&self, slug: &Slug, source: &Path, format: ArchiveFormat) -> Result<CachedArchive> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ModuleError::StorageWriteFailed {
                path: self.dir.clone(),
                source,
            })?;

        let file_name = Self::file_name(slug, format);
        let path = self.dir.join(&file_name);
        fs::copy(source, &path)
            .await
            .map_err(|source| ModuleError::StorageWriteFailed {
                path: path.clone(),
                source,
            })?;

        for other in FORMATS.iter().filter(|f| **f != format) {
            let stale = self.dir.join(Self::file_name(slug, *other));
            if fs::remove_file(&stale).await.is_ok() {
                debug!(path = %stale.display(), "Removed stale cached archive");
            }
        }

        Ok(CachedArchive {
            path,
            file_name,
            format,
        })
    }

    pub async fn find(&self, slug: &Slug) -> Option<CachedArchive> {
        for format in FORMATS {
            let file_name = Self::file_name(slug, format);
            let path = self.dir.join(&file_name);
            if fs::try_exists(&path).await.unwrap_or(false) {
                return Some(CachedArchive {
                    path,
                    file_name,
                    format,
                });
            }
        }
        None
    }
}
