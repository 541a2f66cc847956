//! modhost store - module lifecycle engine
//!
//! This crate installs, toggles, loads and updates the feature modules of a
//! host application. Modules are distributed as archives listed by a remote
//! catalog; their persisted state lives in a [`modhost_registry`] backend.
//!
//! # Features
//!
//! - **Install pipeline**: catalog lookup, license gate, bounded download,
//!   checksum verification, safe extraction, post-install hook, registry write
//! - **Boot loader**: registry-enabled modules intersected with what is on
//!   disk, each registered through a provider table in isolation
//! - **Registry view**: records joined with directory, license and provider state
//! - **Catalog reporting**: install and sync reports delivered in the background
//! - **Core self-update**: staged tree swapped in with rollback
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use modhost_store::{ModuleConfig, ModuleService, ProviderTable};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ModuleConfig::new("./data");
//! let service = ModuleService::connect(config, Arc::new(ProviderTable::new())).await?;
//!
//! let response = service.install("widgets", None).await;
//! println!("{}", serde_json::to_string_pretty(&response)?);
//! # Ok(())
//! # }
//! ```
pub mod archive;
pub mod cache;
pub mod catalog;
pub mod checksum;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod installer;
pub mod license;
pub mod loader;
pub mod manifest;
pub mod provider;
pub mod registry;
pub mod response;
pub mod service;
pub mod status;
pub mod sync;
pub mod updater;
pub mod utils;

pub use archive::ArchiveFormat;
pub use cache::{ArchiveCache, CachedArchive};
pub use catalog::{Catalog, CatalogEntry, HttpCatalog, InstalledReport, ModuleSyncState};
pub use checksum::{Checksum, ChecksumAlgorithm};
pub use config::{CatalogConfig, CoreConfig, ModuleConfig, ModulePaths, SyncConfig};
pub use discovery::{DiscoveredModule, discover};
pub use error::{ErrorCategory, ModuleError, Result};
pub use fetcher::{ArchiveFetcher, HttpFetcher};
pub use installer::{CommandHookRunner, HookRunner, InstallOutcome, Installer, parse_slug};
pub use license::{LicenseStore, MIN_LICENSE_LEN};
pub use loader::{ActivationPlan, LoadReport, ModuleLoader, activation_set};
pub use manifest::{InstallHook, ModuleManifest};
pub use provider::{ModuleContext, ModuleHost, ModuleProvider, ProviderTable};
pub use registry::{ModuleRegistry, ModuleView};
pub use response::{ApiResponse, ErrorDetail};
pub use service::{ModuleService, ServiceParts};
pub use status::{ReleaseFeed, ReleaseStatus, StatusReport};
pub use sync::{SyncJob, SyncQueue, SyncStats, SyncWorker};
pub use updater::{CoreUpdateOutcome, CoreUpdater};

pub use modhost_registry::{InstallSource, ModuleRecord, RegistryStore, Slug};
