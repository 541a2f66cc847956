//! Read-only view joining registry records with what is on disk.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use modhost_registry::{ModuleRecord, RegistryStore};
use serde::Serialize;
use tracing::debug;

use crate::discovery::{DiscoveredModule, discover};
use crate::error::Result;
use crate::license::LicenseStore;
use crate::manifest::ModuleManifest;
use crate::provider::ProviderTable;

/// A registry record plus the derived disk and license state.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleView {
    #[serde(flatten)]
    pub record: ModuleRecord,
    pub path: PathBuf,
    pub folder_exists: bool,
    pub license_present: bool,
    pub provider_key: Option<String>,
    pub provider_resolvable: bool,
}

pub struct ModuleRegistry {
    store: Arc<dyn RegistryStore>,
    providers: Arc<ProviderTable>,
    licenses: LicenseStore,
    modules_root: PathBuf,
}

impl ModuleRegistry {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        providers: Arc<ProviderTable>,
        licenses: LicenseStore,
        modules_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            providers,
            licenses,
            modules_root: modules_root.into(),
        }
    }

    /// List every record with its derived state.
    ///
    /// Disk state is scanned on every call and nothing is written.
    pub async fn list_all(&self, include_deleted: bool) -> Result<Vec<ModuleView>> {
        if !self.store.is_initialized().await? {
            debug!("Module registry not initialized; listing is empty");
            return Ok(Vec::new());
        }

        let records = self.store.scan(include_deleted).await?;
        let mut on_disk: HashMap<String, DiscoveredModule> = HashMap::new();
        for module in discover(&self.modules_root).await {
            on_disk.entry(module.slug.clone()).or_insert(module);
        }

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let found = on_disk.get(record.slug.as_str());
            let license_present = self.licenses.exists(&record.slug).await;

            let (path, provider_key) = match found {
                Some(module) => {
                    let manifest = ModuleManifest::load(&module.path).await.ok().flatten();
                    (
                        module.path.clone(),
                        Some(ModuleManifest::provider_key(manifest.as_ref(), &module.dir_name)),
                    )
                }
                None => (self.modules_root.join(record.slug.as_str()), None),
            };
            let provider_resolvable = provider_key
                .as_deref()
                .is_some_and(|key| self.providers.contains(key));

            views.push(ModuleView {
                folder_exists: found.is_some(),
                record,
                path,
                license_present,
                provider_key,
                provider_resolvable,
            });
        }
        Ok(views)
    }
}
