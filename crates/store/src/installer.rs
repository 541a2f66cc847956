//! The install pipeline and the other per-module mutations.
//!
//! An install runs strictly in order: validate the slug, read the catalog,
//! gate on license, refuse collisions, fetch, verify, unpack, cache the
//! archive, run the module's install hook, write the registry record, then
//! queue the catalog reports. Nothing downloaded is ever extracted over an
//! existing module directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use modhost_registry::{
    InstallSource, Lifecycle, ModuleRecord, ModuleUpdate, RegistryError, RegistryStore, Slug,
};
use serde::Serialize;
use tokio::fs;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::archive::{self, ArchiveFormat};
use crate::cache::{ArchiveCache, CachedArchive};
use crate::catalog::{Catalog, CatalogEntry, InstalledReport, ModuleSyncState};
use crate::config::ModulePaths;
use crate::discovery::find_module_dir;
use crate::error::{ModuleError, Result};
use crate::fetcher::ArchiveFetcher;
use crate::license::LicenseStore;
use crate::manifest::{InstallHook, ModuleManifest};
use crate::sync::{SyncJob, SyncQueue};
use crate::utils::append_line;

/// Version recorded when the catalog entry carries none.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Validate user input as a slug. Runs before any I/O.
pub fn parse_slug(input: &str) -> Result<Slug> {
    Slug::parse(input).map_err(|e| match e {
        RegistryError::InvalidSlug { slug } => ModuleError::InvalidSlug { slug },
        other => ModuleError::Registry(other),
    })
}

/// Runs a module's post-install hook.
#[async_trait]
pub trait HookRunner: Send + Sync {
    /// Run `hook` with `module_dir` as working directory.
    ///
    /// The error string is reported as the failure reason.
    async fn run(&self, module_dir: &Path, hook: &InstallHook) -> std::result::Result<(), String>;
}

/// Spawns the hook command as a child process.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandHookRunner;

#[async_trait]
impl HookRunner for CommandHookRunner {
    async fn run(&self, module_dir: &Path, hook: &InstallHook) -> std::result::Result<(), String> {
        let Some((program, args)) = hook.command.split_first() else {
            return Err("install command is empty".to_string());
        };

        // Relative paths like `./install.sh` point into the module.
        let program_path = Path::new(program);
        let program = if program_path.components().count() > 1 && program_path.is_relative() {
            module_dir.join(program_path)
        } else {
            PathBuf::from(program)
        };

        let mut command = tokio::process::Command::new(&program);
        command
            .args(args)
            .current_dir(module_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(hook.timeout(), command.output()).await {
            Err(_) => return Err(format!("timed out after {:?}", hook.timeout())),
            Ok(Err(e)) => return Err(format!("cannot start '{}': {e}", program.display())),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
            Some(line) => Err(format!("{}: {}", output.status, line.trim())),
            None => Err(output.status.to_string()),
        }
    }
}

/// What a successful install produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    pub slug: String,
    pub path: PathBuf,
    pub version: String,
    pub files: usize,
    pub archive: Option<PathBuf>,
}

pub struct Installer {
    catalog: Arc<dyn Catalog>,
    fetcher: Arc<dyn ArchiveFetcher>,
    registry: Arc<dyn RegistryStore>,
    hooks: Arc<dyn HookRunner>,
    sync: SyncQueue,
    licenses: LicenseStore,
    cache: ArchiveCache,
    paths: ModulePaths,
    install_source: InstallSource,
}

impl Installer {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        fetcher: Arc<dyn ArchiveFetcher>,
        registry: Arc<dyn RegistryStore>,
        hooks: Arc<dyn HookRunner>,
        sync: SyncQueue,
        paths: ModulePaths,
        install_source: InstallSource,
    ) -> Self {
        Self {
            licenses: LicenseStore::new(&paths.licenses_dir),
            cache: ArchiveCache::new(&paths.archive_cache_dir),
            catalog,
            fetcher,
            registry,
            hooks,
            sync,
            paths,
            install_source,
        }
    }

    pub fn licenses(&self) -> &LicenseStore {
        &self.licenses
    }

    pub fn cache(&self) -> &ArchiveCache {
        &self.cache
    }

    /// Install `slug` from the catalog.
    pub async fn install(&self, slug: &str, license: Option<&str>) -> Result<InstallOutcome> {
        let slug = parse_slug(slug)?;

        let entry = self.resolve_entry(&slug).await?;
        let url = entry
            .repository
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ModuleError::ModuleNotFound {
                slug: slug.to_string(),
            })?;

        let has_license = license.is_some_and(|l| !l.trim().is_empty());
        if entry.requires_license && !has_license {
            warn!(slug = %slug, "Install refused: module requires a license");
            return Err(ModuleError::LicenseRequired {
                slug: slug.to_string(),
            });
        }

        let target = self.paths.module_dir(slug.as_str());
        self.ensure_not_installed(&slug, &target).await?;

        let url = Url::parse(url).map_err(|e| ModuleError::DownloadFailed {
            url: url.to_string(),
            reason: "catalog archive URL is not valid".to_string(),
            source: Some(e.into()),
        })?;
        info!(slug = %slug, url = %url, "Downloading module archive");
        let bytes = self.fetcher.fetch(&url).await.inspect_err(|e| {
            error!(slug = %slug, url = %url, "Module download failed: {}", e);
        })?;
        if let Some(checksum) = &entry.checksum {
            checksum.ensure(&bytes).inspect_err(|e| {
                error!(slug = %slug, "Rejecting module archive: {}", e);
            })?;
        }

        let (files, archive) = self.unpack(&slug, &bytes, &target).await?;

        let version = entry
            .version
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let hook_failure = self.run_install_hook(&slug, &target).await;

        // A reinstall revives a soft-deleted record.
        let now = Utc::now();
        let update = ModuleUpdate::new()
            .enabled(true)
            .version(version.clone())
            .source(self.install_source)
            .meta(entry.raw.clone())
            .installed_at(now)
            .lifecycle(Lifecycle::Active);
        self.registry.upsert(&slug, update).await.inspect_err(|e| {
            error!(slug = %slug, "Cannot record installed module: {}", e);
        })?;

        self.sync.enqueue(SyncJob::Installed(InstalledReport {
            slug: slug.to_string(),
            version: version.clone(),
        }));
        self.sync.enqueue(SyncJob::Sync(vec![ModuleSyncState {
            slug: slug.to_string(),
            version: version.clone(),
            enabled: true,
        }]));

        // Files and record stay in place so the failure can be inspected.
        if let Some(reason) = hook_failure {
            return Err(ModuleError::PostInstallFailed {
                slug: slug.to_string(),
                reason,
            });
        }

        let line = format!("{} - {} installed", now.format("%Y-%m-%d %H:%M:%S"), slug);
        if let Err(e) = append_line(&self.paths.install_log(), &line).await {
            warn!(slug = %slug, "Cannot write install log: {}", e);
        }

        info!(slug = %slug, version = %version, path = %target.display(), "Module installed");
        Ok(InstallOutcome {
            slug: slug.to_string(),
            path: target,
            version,
            files,
            archive,
        })
    }

    async fn resolve_entry(&self, slug: &Slug) -> Result<CatalogEntry> {
        let found = self.catalog.find_module(slug).await.inspect_err(|e| {
            error!(slug = %slug, "Cannot read catalog: {}", e);
        })?;
        found.ok_or_else(|| {
            warn!(slug = %slug, "Module not found in catalog");
            ModuleError::ModuleNotFound {
                slug: slug.to_string(),
            }
        })
    }

    async fn ensure_not_installed(&self, slug: &Slug, target: &Path) -> Result<()> {
        let existing = if fs::try_exists(target).await.unwrap_or(false) {
            Some(target.to_path_buf())
        } else {
            find_module_dir(&self.paths.modules_root, slug.as_str())
                .await
                .map(|m| m.path)
        };
        match existing {
            Some(path) => {
                warn!(slug = %slug, path = %path.display(), "Module directory already exists");
                Err(ModuleError::AlreadyInstalled {
                    slug: slug.to_string(),
                    path,
                })
            }
            None => Ok(()),
        }
    }

    /// Write the download to the temp area, extract it into `target` and
    /// keep a copy in the archive cache. The temp file is always removed.
    async fn unpack(&self, slug: &Slug, bytes: &[u8], target: &Path) -> Result<(usize, Option<PathBuf>)> {
        let temp_dir = &self.paths.temp_dir;
        fs::create_dir_all(temp_dir)
            .await
            .map_err(|source| ModuleError::StorageWriteFailed {
                path: temp_dir.clone(),
                source,
            })?;
        let temp = temp_dir.join(format!("temp-{slug}-{}.download", Uuid::new_v4()));
        if let Err(source) = fs::write(&temp, bytes).await {
            error!(slug = %slug, path = %temp.display(), "Cannot store download: {}", source);
            let _ = fs::remove_file(&temp).await;
            return Err(ModuleError::StorageWriteFailed { path: temp, source });
        }

        let extracted = {
            let (archive, dest) = (temp.clone(), target.to_path_buf());
            tokio::task::spawn_blocking(move || archive::extract(&archive, &dest))
                .await
                .unwrap_or_else(|e| {
                    Err(ModuleError::ExtractionFailed {
                        path: target.to_path_buf(),
                        reason: "extraction task failed".to_string(),
                        source: Some(e.into()),
                    })
                })
        };

        let outcome = match extracted {
            Ok(files) => {
                let format = ArchiveFormat::detect(bytes).unwrap_or(ArchiveFormat::Zip);
                let cached = match self.cache.store(slug, &temp, format).await {
                    Ok(CachedArchive { path, .. }) => Some(path),
                    Err(e) => {
                        warn!(slug = %slug, "Cannot cache module archive: {}", e);
                        None
                    }
                };
                debug!(slug = %slug, files, "Archive extracted");
                Ok((files, cached))
            }
            Err(e) => {
                error!(slug = %slug, path = %target.display(), "Extraction failed: {}", e);
                Err(e)
            }
        };

        if let Err(e) = fs::remove_file(&temp).await {
            warn!(path = %temp.display(), "Cannot remove temporary download: {}", e);
        }
        outcome
    }

    /// Run the manifest's install hook, if any. Returns the failure reason.
    async fn run_install_hook(&self, slug: &Slug, module_dir: &Path) -> Option<String> {
        let manifest = match ModuleManifest::load(module_dir).await {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(slug = %slug, "Ignoring unreadable module manifest: {}", e);
                None
            }
        };
        let hook = manifest.and_then(|m| m.install)?;

        info!(slug = %slug, command = ?hook.command, "Running install hook");
        match self.hooks.run(module_dir, &hook).await {
            Ok(()) => None,
            Err(reason) => {
                error!(slug = %slug, "Install hook failed: {}", reason);
                Some(reason)
            }
        }
    }

    /// Flip the enabled flag for `slug`.
    pub async fn toggle(&self, slug: &str) -> Result<ModuleRecord> {
        let slug = parse_slug(slug)?;
        let record = self.registry.toggle(&slug).await?;
        info!(slug = %slug, enabled = record.enabled, "Module toggled");
        Ok(record)
    }

    /// Store a license key for `slug`. Only the local format is checked.
    pub async fn save_license(&self, slug: &str, license: &str) -> Result<PathBuf> {
        let slug = parse_slug(slug)?;
        self.licenses.save(&slug, license).await
    }

    /// Hand out the cached archive for `slug` once the catalog accepts `license`.
    pub async fn download(&self, slug: &str, license: &str) -> Result<CachedArchive> {
        let slug = parse_slug(slug)?;

        match self.catalog.verify_license(&slug, license).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(slug = %slug, "Catalog rejected license");
                return Err(ModuleError::LicenseInvalid {
                    slug: slug.to_string(),
                    reason: "the catalog rejected the license".to_string(),
                });
            }
            Err(e) => {
                warn!(slug = %slug, "License verification failed: {}", e);
                return Err(ModuleError::LicenseInvalid {
                    slug: slug.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        self.cache.find(&slug).await.ok_or_else(|| {
            warn!(slug = %slug, "No cached archive to serve");
            ModuleError::ArchiveNotFound {
                slug: slug.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn slug_errors_map_to_input_errors() {
        assert!(matches!(parse_slug("Bad Slug"), Err(ModuleError::InvalidSlug { .. })));
        assert_eq!(parse_slug("ok-1").unwrap().as_str(), "ok-1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hook_reports_exit_status_and_stderr() {
        let dir = TempDir::new().unwrap();
        let hook = InstallHook {
            command: vec!["sh".into(), "-c".into(), "echo nope >&2; exit 3".into()],
            timeout_secs: Some(10),
        };
        let err = CommandHookRunner.run(dir.path(), &hook).await.unwrap_err();
        assert!(err.contains("nope"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hook_runs_in_module_dir() {
        let dir = TempDir::new().unwrap();
        let hook = InstallHook {
            command: vec!["sh".into(), "-c".into(), "touch installed.flag".into()],
            timeout_secs: None,
        };
        CommandHookRunner.run(dir.path(), &hook).await.unwrap();
        assert!(dir.path().join("installed.flag").exists());
    }

    #[tokio::test]
    async fn empty_hook_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let hook = InstallHook {
            command: Vec::new(),
            timeout_secs: None,
        };
        assert!(CommandHookRunner.run(dir.path(), &hook).await.is_err());
    }
}
