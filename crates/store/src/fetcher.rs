//! Bounded archive downloads.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::config::CatalogConfig;
use crate::error::{ModuleError, Result};

/// Retrieves archive bytes from a URL.
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Download `url` completely into memory.
    ///
    /// Implementations fail with [`ModuleError::DownloadFailed`] on transport
    /// errors and non-success statuses, and with
    /// [`ModuleError::ArchiveTooLarge`] once the body exceeds their limit.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(client: Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        Ok(Self::new(
            crate::catalog::build_client(config)?,
            config.max_archive_bytes,
        ))
    }

    fn failed(url: &Url, reason: impl Into<String>, source: Option<eyre::Report>) -> ModuleError {
        ModuleError::DownloadFailed {
            url: url.to_string(),
            reason: reason.into(),
            source,
        }
    }
}

#[async_trait]
impl ArchiveFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        debug!(url = %url, "Downloading archive");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::failed(url, "request failed", Some(e.into())))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, %status, "Archive download failed");
            return Err(Self::failed(url, format!("HTTP {status}"), None));
        }

        let too_large = || ModuleError::ArchiveTooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(too_large());
        }

        let body = read_limited(response.bytes_stream(), self.max_bytes)
            .await
            .map_err(|e| Self::failed(url, "body read failed", Some(e.into())))?
            .ok_or_else(too_large)?;

        debug!(url = %url, bytes = body.len(), "Archive downloaded");
        Ok(body)
    }
}

/// Collect a body stream, or `None` once it grows past `max_bytes`.
async fn read_limited<S, B, E>(stream: S, max_bytes: u64) -> std::result::Result<Option<Vec<u8>>, E>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
{
    let mut stream = std::pin::pin!(stream);
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        if body.len() as u64 + chunk.len() as u64 > max_bytes {
            return Ok(None);
        }
        body.extend_from_slice(chunk);
    }
    Ok(Some(body))
}
