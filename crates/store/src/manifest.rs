//! The optional `module.json` descriptor shipped at a module's root.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

pub const MANIFEST_FILE: &str = "module.json";

/// Provider key used when a manifest does not name one.
pub const CONVENTIONAL_PROVIDER_PATH: &str = "providers/module";

pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 300;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ModuleManifest {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    /// Key of the module's provider in the host's provider table.
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub install: Option<InstallHook>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstallHook {
    /// Program followed by its arguments, run from the module directory.
    pub command: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl InstallHook {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS))
    }
}

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Cannot read manifest at '{}'", .path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest at '{}': {source}", .path.display())]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ModuleManifest {
    /// Read `module.json` from `module_dir`. A missing file is `Ok(None)`.
    pub async fn load(module_dir: &Path) -> Result<Option<Self>, ManifestError> {
        let path = module_dir.join(MANIFEST_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Io { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ManifestError::Parse { path, source })
    }

    /// The provider key for a module living in `dir_name`.
    ///
    /// `dir_name` keeps its on-disk casing.
    pub fn provider_key(manifest: Option<&Self>, dir_name: &str) -> String {
        manifest
            .and_then(|m| m.entry.clone())
            .filter(|entry| !entry.trim().is_empty())
            .unwrap_or_else(|| conventional_provider_key(dir_name))
    }
}

pub fn conventional_provider_key(dir_name: &str) -> String {
    format!("{dir_name}/{CONVENTIONAL_PROVIDER_PATH}")
}
