//! Client for the remote module catalog.

use async_trait::async_trait;
use modhost_registry::Slug;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::checksum::Checksum;
use crate::config::CatalogConfig;
use crate::error::{ModuleError, Result};

pub const USER_AGENT: &str = concat!("modhost/", env!("CARGO_PKG_VERSION"));

/// One installable module as advertised by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub slug: String,
    /// Archive URL.
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "loose_bool")]
    pub requires_license: bool,
    #[serde(default)]
    pub checksum: Option<Checksum>,
    /// The entry exactly as the catalog sent it.
    #[serde(skip)]
    pub raw: Value,
}

impl CatalogEntry {
    pub fn from_value(value: Value) -> std::result::Result<Self, serde_json::Error> {
        let mut entry: CatalogEntry = serde_json::from_value(value.clone())?;
        entry.raw = value;
        Ok(entry)
    }
}

/// Accept `true`, `1`, `"1"`, `"true"`, `"yes"` as set; everything else is unset.
fn loose_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().is_some_and(|n| n != 0),
        Value::String(s) => matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"),
        _ => false,
    })
}

/// Parse a listing payload: either a bare array or `{"modules": [...]}`.
///
/// Individual entries that do not carry a usable slug are skipped.
pub fn parse_listing(payload: Value) -> Result<Vec<CatalogEntry>> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("modules") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ModuleError::CatalogDataInvalid {
                    reason: "expected a list of modules".to_string(),
                });
            }
        },
        _ => {
            return Err(ModuleError::CatalogDataInvalid {
                reason: "expected a list of modules".to_string(),
            });
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match CatalogEntry::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping malformed catalog entry: {}", e);
                None
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledReport {
    pub slug: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSyncState {
    pub slug: String,
    pub version: String,
    pub enabled: bool,
}

/// The catalog operations the engine depends on.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// `GET /modules`.
    async fn list_modules(&self) -> Result<Vec<CatalogEntry>>;

    /// `POST /verify-license`; `Ok(false)` when the catalog says invalid.
    async fn verify_license(&self, slug: &Slug, license: &str) -> Result<bool>;

    /// `POST /installed`.
    async fn report_installed(&self, report: &InstalledReport) -> Result<()>;

    /// `POST /sync-modules`.
    async fn sync_modules(&self, states: &[ModuleSyncState]) -> Result<()>;

    /// `GET /verify-token`; `Ok(true)` on a 2xx answer.
    async fn verify_token(&self) -> Result<bool>;

    /// Find a single module in the listing.
    async fn find_module(&self, slug: &Slug) -> Result<Option<CatalogEntry>> {
        Ok(self
            .list_modules()
            .await?
            .into_iter()
            .find(|entry| entry.slug == slug.as_str()))
    }
}

/// Build the HTTP client shared by the catalog and the fetcher.
pub fn build_client(config: &CatalogConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            ModuleError::InvalidCatalogConfig {
                url: config.base_url.clone(),
                source: Some(eyre::eyre!("catalog token is not a valid header value: {e}")),
            }
        })?;
        headers.insert(AUTHORIZATION, value);
    }

    Client::builder()
        .timeout(config.timeout())
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
        .map_err(|e| ModuleError::InvalidCatalogConfig {
            url: config.base_url.clone(),
            source: Some(e.into()),
        })
}

/// Catalog reached over HTTP with bearer authentication.
pub struct HttpCatalog {
    base_url: String,
    client: Client,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.clone(),
            client: build_client(config)?,
        })
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Resolve an endpoint below the base URL.
    ///
    /// The base URL is validated on every call so that a bad configuration
    /// surfaces as an operation failure rather than a startup failure.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let invalid = |source: Option<eyre::Report>| ModuleError::InvalidCatalogConfig {
            url: self.base_url.clone(),
            source,
        };

        let mut base = Url::parse(&self.base_url).map_err(|e| invalid(Some(e.into())))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(invalid(None));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(path).map_err(|e| invalid(Some(e.into())))
    }

    fn unreachable(url: &Url, reason: impl Into<String>, source: Option<eyre::Report>) -> ModuleError {
        ModuleError::CatalogUnreachable {
            url: url.to_string(),
            reason: reason.into(),
            source,
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = self.endpoint(path)?;
        self.client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| Self::unreachable(&url, "request failed", Some(e.into())))
    }

    async fn post_expect_success(&self, path: &str, body: &Value) -> Result<()> {
        let response = self.post_json(path, body).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let url = self.endpoint(path)?;
            Err(Self::unreachable(&url, format!("HTTP {status}"), None))
        }
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn list_modules(&self) -> Result<Vec<CatalogEntry>> {
        let url = self.endpoint("modules")?;
        debug!(url = %url, "Fetching catalog listing");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::unreachable(&url, "request failed", Some(e.into())))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, %status, "Catalog listing failed");
            return Err(Self::unreachable(&url, format!("HTTP {status}"), None));
        }

        let payload: Value =
            response
                .json()
                .await
                .map_err(|e| ModuleError::CatalogDataInvalid {
                    reason: format!("response is not JSON: {e}"),
                })?;
        parse_listing(payload)
    }

    async fn verify_license(&self, slug: &Slug, license: &str) -> Result<bool> {
        let response = self
            .post_json(
                "verify-license",
                &json!({ "slug": slug.as_str(), "license": license }),
            )
            .await?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ModuleError::CatalogDataInvalid {
                reason: format!("license response is not JSON: {e}"),
            })?;
        Ok(body.get("valid").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn report_installed(&self, report: &InstalledReport) -> Result<()> {
        let body = serde_json::to_value(report).map_err(|e| ModuleError::CatalogDataInvalid {
            reason: e.to_string(),
        })?;
        self.post_expect_success("installed", &body).await
    }

    async fn sync_modules(&self, states: &[ModuleSyncState]) -> Result<()> {
        let body = serde_json::to_value(states).map_err(|e| ModuleError::CatalogDataInvalid {
            reason: e.to_string(),
        })?;
        self.post_expect_success("sync-modules", &body).await
    }

    async fn verify_token(&self) -> Result<bool> {
        let url = self.endpoint("verify-token")?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::unreachable(&url, "request failed", Some(e.into())))?;
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(base: &str) -> HttpCatalog {
        HttpCatalog::with_client(base, Client::new())
    }

    #[test]
    fn endpoints_append_below_base_path() {
        let c = catalog("https://oopsall.dev/api");
        assert_eq!(
            c.endpoint("modules").unwrap().as_str(),
            "https://oopsall.dev/api/modules"
        );
        let c = catalog("https://oopsall.dev/api/");
        assert_eq!(
            c.endpoint("verify-license").unwrap().as_str(),
            "https://oopsall.dev/api/verify-license"
        );
    }

    #[test]
    fn malformed_base_is_invalid_config() {
        for bad in ["not a url", "ftp://host/api", "mailto:someone@example.com"] {
            assert!(
                matches!(
                    catalog(bad).endpoint("modules"),
                    Err(ModuleError::InvalidCatalogConfig { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn listing_accepts_array_or_wrapped_object() {
        let array = json!([{"slug": "widgets", "repository": "https://x/w.zip"}]);
        assert_eq!(parse_listing(array).unwrap().len(), 1);

        let wrapped = json!({"modules": [{"slug": "a"}, {"slug": "b"}]});
        assert_eq!(parse_listing(wrapped).unwrap().len(), 2);
    }

    #[test]
    fn listing_rejects_non_lists() {
        for bad in [json!({"error": "nope"}), json!("modules"), json!(null)] {
            assert!(matches!(
                parse_listing(bad),
                Err(ModuleError::CatalogDataInvalid { .. })
            ));
        }
    }

    #[test]
    fn entries_keep_raw_payload_and_read_loose_flags() {
        let listing = json!([
            {"slug": "paid", "requires_license": "1", "vendor": "acme"},
            {"slug": "free", "requires_license": 0},
            {"name": "no slug"}
        ]);
        let entries = parse_listing(listing).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].requires_license);
        assert_eq!(entries[0].raw["vendor"], "acme");
        assert!(!entries[1].requires_license);
    }
}
