use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use eyre::Result;
use modhost_store::{InstallSource, ModuleConfig};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(flatten)]
    pub modules: ModuleConfig,
    /// PostgreSQL connection string; the file registry is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modules: ModuleConfig::new(get_default_data_dir()),
            database_url: None,
        }
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .map_err(|_| eyre::eyre!("Invalid boolean value: {}", value))
}

fn parse_number(value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .map_err(|_| eyre::eyre!("Invalid number: {}", value))
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl Config {
    pub fn get_config_path() -> PathBuf {
        get_default_config_dir().join("config.json")
    }

    pub async fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()).await
    }

    /// Read the config at `path`, writing the defaults there if it is missing.
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let default_config = Self::default();
            default_config.save_to(path).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();
        let m = &mut self.modules;

        match parts.as_slice() {
            ["data_dir"] => m.data_dir = PathBuf::from(value),
            ["dev_mode"] => m.dev_mode = parse_bool(value)?,
            ["debug"] => m.debug = parse_bool(value)?,
            ["install_source"] => {
                m.install_source = value
                    .parse::<InstallSource>()
                    .map_err(|e| eyre::eyre!("{}", e))?;
            }
            ["database_url"] => self.database_url = optional(value),
            ["catalog", "base_url"] => m.catalog.base_url = value.to_string(),
            ["catalog", "token"] => m.catalog.token = optional(value),
            ["catalog", "timeout_secs"] => m.catalog.timeout_secs = parse_number(value)?,
            ["catalog", "max_archive_bytes"] => {
                m.catalog.max_archive_bytes = parse_number(value)?
            }
            ["core", "archive_root"] => m.core.archive_root = value.to_string(),
            ["core", "release_feed_url"] => m.core.release_feed_url = optional(value),
            ["core", "version_fallback"] => m.core.version_fallback = value.to_string(),
            ["sync", "max_attempts"] => {
                m.sync.max_attempts = value
                    .parse::<u32>()
                    .map_err(|_| eyre::eyre!("Invalid number: {}", value))?;
            }
            ["sync", "backoff_ms"] => m.sync.backoff_ms = parse_number(value)?,
            ["paths", "modules_root"] => m.paths.modules_root = optional(value).map(PathBuf::from),
            ["paths", "core_dir"] => m.paths.core_dir = optional(value).map(PathBuf::from),
            _ => {
                return Err(eyre::eyre!("Unknown configuration key: {}", key));
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();
        let m = &self.modules;
        let paths = m.paths();

        let value = match parts.as_slice() {
            ["data_dir"] => m.data_dir.display().to_string(),
            ["dev_mode"] => m.dev_mode.to_string(),
            ["debug"] => m.debug.to_string(),
            ["install_source"] => m.install_source.to_string(),
            ["database_url"] => self.database_url.clone().unwrap_or_default(),
            ["catalog", "base_url"] => m.catalog.base_url.clone(),
            ["catalog", "token"] => mask(m.catalog.token.as_deref()),
            ["catalog", "timeout_secs"] => m.catalog.timeout_secs.to_string(),
            ["catalog", "max_archive_bytes"] => m.catalog.max_archive_bytes.to_string(),
            ["core", "archive_root"] => m.core.archive_root.clone(),
            ["core", "release_feed_url"] => m.core.release_feed_url.clone().unwrap_or_default(),
            ["core", "version_fallback"] => m.core.version_fallback.clone(),
            ["sync", "max_attempts"] => m.sync.max_attempts.to_string(),
            ["sync", "backoff_ms"] => m.sync.backoff_ms.to_string(),
            ["paths", "modules_root"] => paths.modules_root.display().to_string(),
            ["paths", "core_dir"] => paths.core_dir.display().to_string(),
            _ => {
                return Err(eyre::eyre!("Unknown configuration key: {}", key));
            }
        };

        Ok(value)
    }

    pub fn show_all(&self) -> String {
        let m = &self.modules;
        let paths = m.paths();

        format!(
            "Configuration:\n\
             ├─ data_dir: {}\n\
             ├─ dev_mode: {}\n\
             ├─ debug: {}\n\
             ├─ install_source: {}\n\
             └─ registry: {}\n\
             Paths:\n\
             ├─ modules_root: {}\n\
             ├─ licenses: {}\n\
             ├─ archives: {}\n\
             └─ core_dir: {}\n\
             Catalog:\n\
             ├─ base_url: {}\n\
             ├─ token: {}\n\
             ├─ timeout_secs: {}\n\
             └─ max_archive_bytes: {}\n\
             Core:\n\
             ├─ archive_root: {}\n\
             ├─ release_feed_url: {}\n\
             └─ version_fallback: {}\n\
             Sync:\n\
             ├─ max_attempts: {}\n\
             └─ backoff_ms: {}",
            m.data_dir.display(),
            m.dev_mode,
            m.debug,
            m.install_source,
            if self.database_url.is_some() { "postgres" } else { "file" },
            paths.modules_root.display(),
            paths.licenses_dir.display(),
            paths.archive_cache_dir.display(),
            paths.core_dir.display(),
            m.catalog.base_url,
            mask(m.catalog.token.as_deref()),
            m.catalog.timeout_secs,
            m.catalog.max_archive_bytes,
            m.core.archive_root,
            m.core.release_feed_url.as_deref().unwrap_or("(not set)"),
            m.core.version_fallback,
            m.sync.max_attempts,
            m.sync.backoff_ms,
        )
    }

    pub async fn reset() -> Result<Self> {
        let config = Self::default();
        config.save().await?;
        Ok(config)
    }
}

fn mask(token: Option<&str>) -> String {
    match token {
        Some(t) if !t.is_empty() => "********".to_string(),
        _ => "(not set)".to_string(),
    }
}

/// Get the default configuration directory
fn get_default_config_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "modhost", "modhost") {
        proj_dirs.config_dir().to_path_buf()
    } else {
        PathBuf::from(".modhost").join("config")
    }
}

/// Get the default data directory
fn get_default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "modhost", "modhost") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".modhost").join("data")
    }
}
