//! Runtime configuration handed to every component at construction.

use std::path::PathBuf;
use std::time::Duration;

use modhost_registry::InstallSource;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CATALOG_URL: &str = "https://oopsall.dev/api";
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub paths: PathOverrides,
    /// Load every discovered module regardless of registry state.
    #[serde(default)]
    pub dev_mode: bool,
    /// Include full error chains in failure payloads.
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_install_source")]
    pub install_source: InstallSource,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_install_source() -> InstallSource {
    InstallSource::Api
}

impl ModuleConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            paths: PathOverrides::default(),
            dev_mode: false,
            debug: false,
            install_source: default_install_source(),
            catalog: CatalogConfig::default(),
            core: CoreConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Resolve every directory the engine touches.
    pub fn paths(&self) -> ModulePaths {
        let data = &self.data_dir;
        let pick = |over: &Option<PathBuf>, default: &str| {
            over.clone().unwrap_or_else(|| data.join(default))
        };
        ModulePaths {
            modules_root: pick(&self.paths.modules_root, "modules"),
            licenses_dir: pick(&self.paths.licenses_dir, "licenses"),
            archive_cache_dir: pick(&self.paths.archive_cache_dir, "archives"),
            temp_dir: pick(&self.paths.temp_dir, "tmp"),
            logs_dir: pick(&self.paths.logs_dir, "logs"),
            core_dir: pick(&self.paths.core_dir, "core"),
            registry_dir: pick(&self.paths.registry_dir, "registry"),
        }
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

/// Optional per-directory overrides; unset entries live under `data_dir`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules_root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licenses_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_cache_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePaths {
    pub modules_root: PathBuf,
    pub licenses_dir: PathBuf,
    pub archive_cache_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub core_dir: PathBuf,
    pub registry_dir: PathBuf,
}

impl ModulePaths {
    pub fn module_dir(&self, slug: &str) -> PathBuf {
        self.modules_root.join(slug)
    }

    pub fn install_log(&self) -> PathBuf {
        self.logs_dir.join("module-installs.log")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub base_url: String,
    /// Bearer token sent with catalog and archive requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_archive_bytes() -> u64 {
    DEFAULT_MAX_ARCHIVE_BYTES
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            max_archive_bytes: default_max_archive_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Top-level folder a core archive must contain.
    #[serde(default = "default_archive_root")]
    pub archive_root: String,
    /// JSON endpoint whose `tag_name` is the latest core release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_feed_url: Option<String>,
    #[serde(default = "default_version_fallback")]
    pub version_fallback: String,
}

fn default_archive_root() -> String {
    "core-main".to_string()
}

fn default_version_fallback() -> String {
    "dev".to_string()
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            archive_root: default_archive_root(),
            release_feed_url: None,
            version_fallback: default_version_fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

impl SyncConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}
