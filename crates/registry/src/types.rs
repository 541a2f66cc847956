//! Supporting types for the module registry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

static SLUG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Canonical identifier of a module.
///
/// A slug is lowercase ASCII letters, digits and dashes only. It is the
/// primary key of a [`ModuleRecord`](crate::ModuleRecord) and never changes
/// once the record exists.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    /// Validate and wrap a slug.
    pub fn parse(input: &str) -> Result<Self, RegistryError> {
        if SLUG_PATTERN.is_match(input) {
            Ok(Self(input.to_string()))
        } else {
            Err(RegistryError::InvalidSlug {
                slug: input.to_string(),
            })
        }
    }

    /// Normalise a directory name into a slug candidate (lowercased, trimmed).
    ///
    /// The result is not validated; directory names that do not form a valid
    /// slug simply never match a registry entry.
    pub fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Slug {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Slug::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// How a module ended up installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallSource {
    #[default]
    Cli,
    Store,
    Api,
}

impl InstallSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallSource::Cli => "cli",
            InstallSource::Store => "store",
            InstallSource::Api => "api",
        }
    }
}

impl fmt::Display for InstallSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallSource {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cli" => Ok(InstallSource::Cli),
            "store" => Ok(InstallSource::Store),
            "api" => Ok(InstallSource::Api),
            other => Err(RegistryError::InvalidRecord {
                message: format!("unknown install source '{other}'"),
                source: None,
            }),
        }
    }
}

/// Lifecycle of a persisted record.
///
/// Deleted records stay in the store so they can be audited or restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Active,
    Deleted { at: DateTime<Utc> },
}

impl Lifecycle {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Lifecycle::Deleted { .. })
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Deleted { at } => Some(*at),
        }
    }
}
