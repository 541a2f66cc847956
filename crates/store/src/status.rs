use std::path::Path;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::manifest::ModuleManifest;
use crate::registry::ModuleView;

/// Health snapshot of the engine and its remote collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub token_present: bool,
    pub catalog_reachable: bool,
    pub core_version: String,
    pub latest_release: ReleaseStatus,
    pub update_available: bool,
    pub module_count: usize,
    pub modules: Vec<ModuleView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReleaseStatus {
    Ok { version: String },
    Unknown,
    Unreachable { reason: String },
}

impl ReleaseStatus {
    pub fn version(&self) -> Option<&str> {
        match self {
            ReleaseStatus::Ok { version } => Some(version),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct Release {
    tag_name: Option<String>,
}

/// Latest release published on a JSON feed with a `tag_name` field.
pub struct ReleaseFeed {
    url: String,
    client: Client,
}

impl ReleaseFeed {
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub async fn latest(&self) -> ReleaseStatus {
        let response = match self
            .client
            .get(&self.url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %self.url, "Release feed unreachable: {}", e);
                return ReleaseStatus::Unreachable {
                    reason: e.to_string(),
                };
            }
        };

        if !response.status().is_success() {
            return ReleaseStatus::Unknown;
        }
        match response.json::<Release>().await {
            Ok(Release { tag_name: Some(tag) }) => {
                let version = tag.trim().trim_start_matches('v').to_string();
                if version.is_empty() {
                    ReleaseStatus::Unknown
                } else {
                    ReleaseStatus::Ok { version }
                }
            }
            _ => ReleaseStatus::Unknown,
        }
    }
}

/// Version of the installed core, read from its manifest.
pub async fn core_version(core_dir: &Path, fallback: &str) -> String {
    match ModuleManifest::load(core_dir).await {
        Ok(Some(ModuleManifest {
            version: Some(version),
            ..
        })) => version,
        _ => fallback.to_string(),
    }
}

/// Whether `latest` is a newer semantic version than `current`.
///
/// Anything that does not parse as semver never counts as an update.
pub fn update_available(current: &str, latest: &str) -> bool {
    let parse = |v: &str| semver::Version::parse(v.trim().trim_start_matches('v')).ok();
    match (parse(current), parse(latest)) {
        (Some(current), Some(latest)) => latest > current,
        _ => false,
    }
}
