//! Stub collaborators and fixtures shared by the integration tests.
#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use modhost_store::catalog::parse_listing;
use modhost_store::error::{ModuleError, Result};
use modhost_store::registry::ModuleRegistry;
use modhost_store::{
    ArchiveFetcher, Catalog, CatalogEntry, HookRunner, InstallHook, InstalledReport, ModuleConfig,
    ModuleService, ModuleSyncState, ProviderTable, ServiceParts, Slug,
};
use modhost_registry::FilesystemRegistry;
use serde_json::Value;
use tempfile::TempDir;
use url::Url;
use zip::write::SimpleFileOptions;

/// Catalog answering from a fixed listing.
#[derive(Default)]
pub struct StubCatalog {
    pub listing: Value,
    pub license_valid: bool,
    pub unreachable: bool,
    pub list_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub installed: Mutex<Vec<InstalledReport>>,
    pub synced: Mutex<Vec<ModuleSyncState>>,
}

impl StubCatalog {
    pub fn new(listing: Value) -> Self {
        Self {
            listing,
            ..Self::default()
        }
    }

    pub fn accepting_licenses(mut self) -> Self {
        self.license_valid = true;
        self
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(ModuleError::CatalogUnreachable {
                url: "stub://catalog".to_string(),
                reason: "connection refused".to_string(),
                source: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for StubCatalog {
    async fn list_modules(&self) -> Result<Vec<CatalogEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        parse_listing(self.listing.clone())
    }

    async fn verify_license(&self, _slug: &Slug, _license: &str) -> Result<bool> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.license_valid)
    }

    async fn report_installed(&self, report: &InstalledReport) -> Result<()> {
        self.installed.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn sync_modules(&self, states: &[ModuleSyncState]) -> Result<()> {
        self.synced.lock().unwrap().extend_from_slice(states);
        Ok(())
    }

    async fn verify_token(&self) -> Result<bool> {
        self.check_reachable()?;
        Ok(true)
    }
}

/// Fetcher serving the same bytes for every URL.
pub struct StubFetcher {
    pub body: Vec<u8>,
    pub fetches: AtomicUsize,
}

impl StubFetcher {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArchiveFetcher for StubFetcher {
    async fn fetch(&self, _url: &Url) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

/// Hook runner that records invocations and fails on demand.
#[derive(Default)]
pub struct StubHooks {
    pub fail_with: Option<String>,
    pub runs: AtomicUsize,
}

#[async_trait]
impl HookRunner for StubHooks {
    async fn run(&self, _module_dir: &Path, _hook: &InstallHook) -> std::result::Result<(), String> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }
}

pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn widgets_archive() -> Vec<u8> {
    zip_bytes(&[
        ("README.md", "widgets for everyone"),
        ("src/", ""),
        ("src/widget.txt", "a widget"),
    ])
}

pub fn test_config(dir: &TempDir) -> ModuleConfig {
    let mut config = ModuleConfig::new(dir.path());
    config.sync.backoff_ms = 1;
    config
}

pub struct Harness {
    pub dir: TempDir,
    pub catalog: Arc<StubCatalog>,
    pub fetcher: Arc<StubFetcher>,
    pub hooks: Arc<StubHooks>,
    pub registry: Arc<FilesystemRegistry>,
    pub service: ModuleService,
}

impl Harness {
    pub async fn new(catalog: StubCatalog, archive: Vec<u8>) -> Self {
        Self::build(catalog, archive, StubHooks::default(), ProviderTable::new()).await
    }

    pub async fn build(
        catalog: StubCatalog,
        archive: Vec<u8>,
        hooks: StubHooks,
        providers: ProviderTable,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let registry = Arc::new(FilesystemRegistry::open(config.paths().registry_dir).await.unwrap());
        let catalog = Arc::new(catalog);
        let fetcher = Arc::new(StubFetcher::new(archive));
        let hooks = Arc::new(hooks);

        let service = ModuleService::new(
            config,
            ServiceParts {
                registry: registry.clone(),
                catalog: catalog.clone(),
                fetcher: fetcher.clone(),
                hooks: hooks.clone(),
                providers: Arc::new(providers),
                release_feed: None,
            },
        );

        Self {
            dir,
            catalog,
            fetcher,
            hooks,
            registry,
            service,
        }
    }

    pub fn view(&self) -> &ModuleRegistry {
        self.service.registry()
    }
}

pub fn slug(s: &str) -> Slug {
    Slug::parse(s).unwrap()
}
