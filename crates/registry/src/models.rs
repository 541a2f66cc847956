//! Persisted module records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{InstallSource, Lifecycle, Slug};

/// Version stamped on records that were created without one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// One row of the registry: the state of a single installed module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub slug: Slug,
    pub enabled: bool,
    pub version: String,
    pub source: InstallSource,
    /// Catalog payload captured at install time; passed through untouched.
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
    pub installed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl ModuleRecord {
    /// Build a fresh record with the registry defaults applied.
    pub fn new(slug: Slug, now: DateTime<Utc>) -> Self {
        Self {
            slug,
            enabled: true,
            version: DEFAULT_VERSION.to_string(),
            source: InstallSource::default(),
            meta: None,
            installed_at: Some(now),
            created_at: now,
            updated_at: now,
            lifecycle: Lifecycle::Active,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.lifecycle.is_deleted()
    }

    /// Apply a partial update, always stamping `updated_at`.
    pub fn apply(&mut self, update: &ModuleUpdate, now: DateTime<Utc>) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(ref version) = update.version {
            self.version = version.clone();
        }
        if let Some(source) = update.source {
            self.source = source;
        }
        if let Some(ref meta) = update.meta {
            self.meta = Some(meta.clone());
        }
        if let Some(installed_at) = update.installed_at {
            self.installed_at = Some(installed_at);
        }
        if let Some(lifecycle) = update.lifecycle {
            self.lifecycle = lifecycle;
        }
        self.updated_at = now;
    }
}

/// Fields written by an upsert. `None` leaves the stored value untouched
/// (or the default, for a record that does not exist yet).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleUpdate {
    pub enabled: Option<bool>,
    pub version: Option<String>,
    pub source: Option<InstallSource>,
    pub meta: Option<serde_json::Value>,
    pub installed_at: Option<DateTime<Utc>>,
    pub lifecycle: Option<Lifecycle>,
}

impl ModuleUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn source(mut self, source: InstallSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn installed_at(mut self, at: DateTime<Utc>) -> Self {
        self.installed_at = Some(at);
        self
    }

    pub fn lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }
}
