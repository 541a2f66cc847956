//! The operation surface callers use, answering with [`ApiResponse`] payloads.

use std::sync::Arc;
use std::time::Duration;

use modhost_registry::{FilesystemRegistry, RegistryError, RegistryStore};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::catalog::{Catalog, HttpCatalog, build_client};
use crate::config::{CatalogConfig, ModuleConfig, ModulePaths};
use crate::error::{ModuleError, Result};
use crate::fetcher::{ArchiveFetcher, HttpFetcher};
use crate::installer::{CommandHookRunner, HookRunner, Installer, parse_slug};
use crate::loader::{ActivationPlan, LoadReport, ModuleLoader};
use crate::provider::{ModuleHost, ProviderTable};
use crate::registry::ModuleRegistry;
use crate::response::ApiResponse;
use crate::status::{ReleaseFeed, ReleaseStatus, StatusReport, core_version, update_available};
use crate::sync::{self, SyncStats, SyncWorker};
use crate::updater::CoreUpdater;

const RELEASE_FEED_TIMEOUT_SECS: u64 = 5;

/// Collaborators a [`ModuleService`] is assembled from.
pub struct ServiceParts {
    pub registry: Arc<dyn RegistryStore>,
    pub catalog: Arc<dyn Catalog>,
    pub fetcher: Arc<dyn ArchiveFetcher>,
    pub hooks: Arc<dyn HookRunner>,
    pub providers: Arc<ProviderTable>,
    pub release_feed: Option<ReleaseFeed>,
}

impl ServiceParts {
    /// Networked collaborators sharing one authenticated HTTP client.
    pub fn http(
        config: &ModuleConfig,
        registry: Arc<dyn RegistryStore>,
        providers: Arc<ProviderTable>,
    ) -> Result<Self> {
        let client = build_client(&config.catalog)?;
        // The release feed is a third party; it never sees the catalog token.
        let release_feed = match &config.core.release_feed_url {
            Some(url) => {
                let anonymous = CatalogConfig {
                    token: None,
                    timeout_secs: RELEASE_FEED_TIMEOUT_SECS,
                    ..config.catalog.clone()
                };
                Some(ReleaseFeed::new(url.clone(), build_client(&anonymous)?))
            }
            None => None,
        };

        Ok(Self {
            registry,
            catalog: Arc::new(HttpCatalog::with_client(
                config.catalog.base_url.clone(),
                client.clone(),
            )),
            fetcher: Arc::new(HttpFetcher::new(client, config.catalog.max_archive_bytes)),
            hooks: Arc::new(CommandHookRunner),
            providers,
            release_feed,
        })
    }
}

pub struct ModuleService {
    config: ModuleConfig,
    paths: ModulePaths,
    registry: Arc<dyn RegistryStore>,
    catalog: Arc<dyn Catalog>,
    installer: Installer,
    view: ModuleRegistry,
    loader: ModuleLoader,
    updater: CoreUpdater,
    release_feed: Option<ReleaseFeed>,
    worker: SyncWorker,
}

impl ModuleService {
    /// Assemble the service. Must be called inside a tokio runtime, since the
    /// sync worker is spawned here.
    pub fn new(config: ModuleConfig, parts: ServiceParts) -> Self {
        let paths = config.paths();
        let (queue, worker) = sync::start(parts.catalog.clone(), config.sync.clone());

        let installer = Installer::new(
            parts.catalog.clone(),
            parts.fetcher.clone(),
            parts.registry.clone(),
            parts.hooks,
            queue,
            paths.clone(),
            config.install_source,
        );
        let view = ModuleRegistry::new(
            parts.registry.clone(),
            parts.providers.clone(),
            installer.licenses().clone(),
            &paths.modules_root,
        );
        let loader = ModuleLoader::new(
            parts.registry.clone(),
            parts.providers,
            &paths.modules_root,
            config.dev_mode,
        );
        let updater = CoreUpdater::new(
            parts.fetcher,
            &paths.core_dir,
            config.core.archive_root.clone(),
            &paths.temp_dir,
        );

        Self {
            registry: parts.registry,
            catalog: parts.catalog,
            release_feed: parts.release_feed,
            config,
            paths,
            installer,
            view,
            loader,
            updater,
            worker,
        }
    }

    /// Build the service with the HTTP catalog and the file registry.
    pub async fn connect(config: ModuleConfig, providers: Arc<ProviderTable>) -> Result<Self> {
        let registry = FilesystemRegistry::open(config.paths().registry_dir).await?;
        let parts = ServiceParts::http(&config, Arc::new(registry), providers)?;
        Ok(Self::new(config, parts))
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn paths(&self) -> &ModulePaths {
        &self.paths
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.view
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    fn failure(&self, e: &ModuleError, context: Value) -> ApiResponse {
        warn!(code = e.code(), context = %context, "Operation failed: {}", e);
        ApiResponse::from_error(e, context, self.config.debug)
    }

    fn respond<T>(&self, result: Result<T>, context: Value, ok: impl FnOnce(T) -> ApiResponse) -> ApiResponse {
        match result {
            Ok(value) => ok(value),
            Err(e) => self.failure(&e, context),
        }
    }

    pub async fn install(&self, slug: &str, license: Option<&str>) -> ApiResponse {
        let result = self.installer.install(slug, license).await;
        self.respond(
            result,
            json!({ "slug": slug, "license_supplied": license.is_some() }),
            |outcome| {
                ApiResponse::success_with(
                    format!("Module '{}' was installed successfully.", outcome.slug),
                    outcome,
                )
            },
        )
    }

    pub async fn toggle(&self, slug: &str) -> ApiResponse {
        let result = self.installer.toggle(slug).await;
        self.respond(result, json!({ "slug": slug }), |record| {
            ApiResponse::success_with(
                "Module state updated.",
                json!({ "slug": record.slug, "enabled": record.enabled }),
            )
        })
    }

    pub async fn save_license(&self, slug: &str, license: &str) -> ApiResponse {
        let result = self.installer.save_license(slug, license).await;
        self.respond(result, json!({ "slug": slug }), |path| {
            ApiResponse::success_with("License key saved.", json!({ "slug": slug, "path": path }))
        })
    }

    pub async fn download(&self, slug: &str, license: &str) -> ApiResponse {
        let result = self.installer.download(slug, license).await;
        self.respond(result, json!({ "slug": slug }), |archive| {
            ApiResponse::success_with(
                "Archive is ready for download.",
                json!({
                    "slug": slug,
                    "path": archive.path,
                    "file_name": archive.file_name,
                }),
            )
        })
    }

    /// Local registry view plus the catalog listing, which is best effort.
    pub async fn list_modules(&self, include_deleted: bool) -> ApiResponse {
        let result = self.view.list_all(include_deleted).await;
        let installed = match result {
            Ok(views) => views,
            Err(e) => return self.failure(&e, json!({ "include_deleted": include_deleted })),
        };

        let available: Vec<Value> = match self.catalog.list_modules().await {
            Ok(entries) => entries.into_iter().map(|entry| entry.raw).collect(),
            Err(e) => {
                warn!("Catalog listing unavailable: {}", e);
                Vec::new()
            }
        };

        ApiResponse::success_with(
            "Modules listed.",
            json!({ "installed": installed, "available": available }),
        )
    }

    pub async fn status_report(&self) -> Result<StatusReport> {
        let modules = self.view.list_all(false).await?;
        let token_present = self.config.catalog.token.as_deref().is_some_and(|t| !t.is_empty());

        let catalog_reachable = token_present
            && match self.catalog.verify_token().await {
                Ok(ok) => ok,
                Err(e) => {
                    warn!("Catalog token check failed: {}", e);
                    false
                }
            };

        let core_version = core_version(&self.paths.core_dir, &self.config.core.version_fallback).await;
        let latest_release = match &self.release_feed {
            Some(feed) => feed.latest().await,
            None => ReleaseStatus::Unknown,
        };
        let update_available = latest_release
            .version()
            .is_some_and(|latest| update_available(&core_version, latest));

        Ok(StatusReport {
            token_present,
            catalog_reachable,
            core_version,
            latest_release,
            update_available,
            module_count: modules.len(),
            modules,
        })
    }

    pub async fn status(&self) -> ApiResponse {
        let result = self.status_report().await;
        self.respond(result, json!({}), |report| {
            ApiResponse::success_with("Module host is alive.", report)
        })
    }

    pub async fn update_core(&self, source_url: &str) -> ApiResponse {
        let result = self.updater.update_core(source_url).await;
        self.respond(result, json!({ "url": source_url }), |outcome| {
            ApiResponse::success_with("Core updated successfully.", outcome)
        })
    }

    /// Soft-delete the record for `slug`. Files on disk are left alone.
    pub async fn delete(&self, slug: &str) -> ApiResponse {
        let result = self.set_deleted(slug, true).await;
        self.respond(result, json!({ "slug": slug }), |_| {
            ApiResponse::success_with("Module record deleted.", json!({ "slug": slug }))
        })
    }

    pub async fn restore(&self, slug: &str) -> ApiResponse {
        let result = self.set_deleted(slug, false).await;
        self.respond(result, json!({ "slug": slug }), |_| {
            ApiResponse::success_with("Module record restored.", json!({ "slug": slug }))
        })
    }

    async fn set_deleted(&self, slug: &str, deleted: bool) -> Result<()> {
        let slug = parse_slug(slug)?;
        let found = if deleted {
            self.registry.soft_delete(&slug).await?
        } else {
            self.registry.restore(&slug).await?
        };
        if !found {
            return Err(RegistryError::ModuleNotFound {
                slug: slug.to_string(),
            }
            .into());
        }
        info!(slug = %slug, deleted, "Module record lifecycle changed");
        Ok(())
    }

    pub async fn plan(&self) -> ActivationPlan {
        self.loader.plan().await
    }

    pub async fn plan_response(&self) -> ApiResponse {
        let plan = self.plan().await;
        let slugs = |list: &[crate::discovery::DiscoveredModule]| {
            list.iter().map(|m| m.slug.clone()).collect::<Vec<_>>()
        };
        ApiResponse::success_with(
            "Activation plan computed.",
            json!({
                "dev_mode": plan.dev_mode,
                "discovered": slugs(&plan.discovered),
                "activation": slugs(&plan.activation),
                "drifted": plan.drifted,
            }),
        )
    }

    /// Boot-time activation into `host`.
    pub async fn load_modules(&self, host: &mut dyn ModuleHost) -> LoadReport {
        self.loader.load_enabled_modules(host).await
    }

    /// Stop accepting work and give pending catalog reports `grace` to drain.
    pub async fn shutdown(self, grace: Duration) -> Option<SyncStats> {
        let Self { installer, worker, .. } = self;
        drop(installer);
        worker.finish(grace).await
    }
}
