//! JSON file registry backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::models::{ModuleRecord, ModuleUpdate};
use crate::traits::RegistryStore;
use crate::types::{Lifecycle, Slug};

const REGISTRY_FILE: &str = "registry.json";
const BACKUP_FILE: &str = "registry.json.backup";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    modules: BTreeMap<String, ModuleRecord>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Registry stored as a single JSON document.
///
/// ```text
/// root/
/// +-- registry.json
/// +-- registry.json.backup
/// ```
///
/// Every operation re-reads the document so that separate processes sharing
/// the directory observe each other's writes. Writes go to a temp file that
/// is renamed over the live one; the previous version is kept as the backup.
#[derive(Debug)]
pub struct FilesystemRegistry {
    root: PathBuf,
    registry_path: PathBuf,
    backup_path: PathBuf,
    lock: Mutex<()>,
}

impl FilesystemRegistry {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            registry_path: root.join(REGISTRY_FILE),
            backup_path: root.join(BACKUP_FILE),
            root,
            lock: Mutex::new(()),
        }
    }

    /// Open a registry, creating the directory and an empty document if needed.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let registry = Self::new(root);
        registry.initialize().await?;
        Ok(registry)
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    async fn load(&self) -> Result<RegistryDocument> {
        if !fs::try_exists(&self.registry_path).await.unwrap_or(false) {
            debug!("No registry document at {}", self.registry_path.display());
            return Ok(RegistryDocument::default());
        }

        let primary = match fs::read_to_string(&self.registry_path).await {
            Ok(content) => serde_json::from_str::<RegistryDocument>(&content).map_err(|e| {
                RegistryError::Corrupted {
                    message: format!("{} is not valid", self.registry_path.display()),
                    source: Some(e.into()),
                }
            }),
            Err(e) => Err(RegistryError::operation("read registry", e)),
        };

        match primary {
            Ok(doc) => Ok(doc),
            Err(err) => {
                warn!("Failed to load registry ({err}), checking backup");
                if !fs::try_exists(&self.backup_path).await.unwrap_or(false) {
                    return Err(err);
                }
                let content = fs::read_to_string(&self.backup_path)
                    .await
                    .map_err(|e| RegistryError::operation("read registry backup", e))?;
                let doc = serde_json::from_str(&content).map_err(|e| RegistryError::Corrupted {
                    message: "registry backup is not valid".to_string(),
                    source: Some(e.into()),
                })?;
                info!("Restored registry from backup");
                Ok(doc)
            }
        }
    }

    async fn save(&self, doc: &mut RegistryDocument) -> Result<()> {
        doc.last_updated = Some(Utc::now());
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| RegistryError::operation("serialize registry", e))?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| RegistryError::operation("create registry directory", e))?;

        // A primary that no longer parses must not overwrite the last good backup.
        if let Ok(current) = fs::read_to_string(&self.registry_path).await {
            if serde_json::from_str::<RegistryDocument>(&current).is_ok() {
                if let Err(e) = fs::write(&self.backup_path, current).await {
                    warn!("Failed to create registry backup: {}", e);
                }
            } else {
                warn!("Registry document is corrupt; keeping the existing backup");
            }
        }

        let tmp = self
            .root
            .join(format!(".{REGISTRY_FILE}.{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, content)
            .await
            .map_err(|e| RegistryError::operation("write registry", e))?;
        if let Err(e) = fs::rename(&tmp, &self.registry_path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(RegistryError::operation("replace registry", e));
        }

        debug!("Registry saved with {} modules", doc.modules.len());
        Ok(())
    }

    async fn set_lifecycle(&self, slug: &Slug, lifecycle: Lifecycle) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let Some(record) = doc.modules.get_mut(slug.as_str()) else {
            return Ok(false);
        };
        record.apply(&ModuleUpdate::new().lifecycle(lifecycle), Utc::now());
        self.save(&mut doc).await?;
        Ok(true)
    }
}

#[async_trait]
impl RegistryStore for FilesystemRegistry {
    async fn is_initialized(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.registry_path).await.unwrap_or(false))
    }

    async fn initialize(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if fs::try_exists(&self.registry_path).await.unwrap_or(false) {
            return Ok(());
        }
        info!("Creating module registry at {}", self.registry_path.display());
        self.save(&mut RegistryDocument::default()).await
    }

    async fn get(&self, slug: &Slug) -> Result<Option<ModuleRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.modules.remove(slug.as_str()))
    }

    async fn upsert(&self, slug: &Slug, update: ModuleUpdate) -> Result<ModuleRecord> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let now = Utc::now();

        let record = doc
            .modules
            .entry(slug.to_string())
            .or_insert_with(|| ModuleRecord::new(slug.clone(), now));
        record.apply(&update, now);
        let record = record.clone();

        self.save(&mut doc).await?;
        Ok(record)
    }

    async fn scan(&self, include_deleted: bool) -> Result<Vec<ModuleRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .modules
            .into_values()
            .filter(|record| include_deleted || !record.is_deleted())
            .collect())
    }

    async fn soft_delete(&self, slug: &Slug) -> Result<bool> {
        self.set_lifecycle(slug, Lifecycle::Deleted { at: Utc::now() })
            .await
    }

    async fn restore(&self, slug: &Slug) -> Result<bool> {
        self.set_lifecycle(slug, Lifecycle::Active).await
    }

    async fn toggle(&self, slug: &Slug) -> Result<ModuleRecord> {
        let _guard = self.lock.lock().await;
        let mut doc = self.load().await?;
        let now = Utc::now();

        let record = match doc.modules.get_mut(slug.as_str()) {
            Some(record) => {
                let enabled = !record.enabled;
                record.apply(&ModuleUpdate::new().enabled(enabled), now);
                record.clone()
            }
            None => {
                let record = ModuleRecord::new(slug.clone(), now);
                doc.modules.insert(slug.to_string(), record.clone());
                record
            }
        };

        self.save(&mut doc).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn slug(s: &str) -> Slug {
        Slug::parse(s).unwrap()
    }

    #[tokio::test]
    async fn missing_document_is_uninitialized_not_an_error() {
        let dir = TempDir::new().unwrap();
        let registry = FilesystemRegistry::new(dir.path());

        assert!(!registry.is_initialized().await.unwrap());
        assert!(registry.scan(true).await.unwrap().is_empty());
        assert!(registry.enabled_slugs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_backup_when_primary_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let registry = FilesystemRegistry::open(dir.path()).await.unwrap();
        registry
            .upsert(&slug("blog"), ModuleUpdate::new())
            .await
            .unwrap();
        // second write rotates the first into the backup
        registry
            .upsert(&slug("shop"), ModuleUpdate::new())
            .await
            .unwrap();

        std::fs::write(registry.registry_path(), "{ not json").unwrap();

        let records = registry.scan(true).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].slug.as_str(), "blog");
    }

    #[tokio::test]
    async fn write_after_recovery_keeps_the_good_backup() {
        let dir = TempDir::new().unwrap();
        let registry = FilesystemRegistry::open(dir.path()).await.unwrap();
        registry
            .upsert(&slug("blog"), ModuleUpdate::new())
            .await
            .unwrap();
        registry
            .upsert(&slug("shop"), ModuleUpdate::new())
            .await
            .unwrap();

        std::fs::write(registry.registry_path(), "{ not json").unwrap();
        // recovered from the backup, which only knows "blog"
        registry
            .upsert(&slug("news"), ModuleUpdate::new())
            .await
            .unwrap();

        let backup = std::fs::read_to_string(dir.path().join(BACKUP_FILE)).unwrap();
        assert!(serde_json::from_str::<RegistryDocument>(&backup).is_ok());

        // a second crash still leaves a usable backup behind
        std::fs::write(registry.registry_path(), "{ not json").unwrap();
        let slugs: Vec<_> = registry
            .scan(true)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.slug.to_string())
            .collect();
        assert_eq!(slugs, vec!["blog"]);
    }

    #[tokio::test]
    async fn corrupt_without_backup_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(REGISTRY_FILE), "{ \"modules\": 7 }").unwrap();
        let registry = FilesystemRegistry::new(dir.path());

        assert!(matches!(
            registry.scan(false).await,
            Err(RegistryError::Corrupted { .. })
        ));
    }

    #[tokio::test]
    async fn toggle_creates_enabled_record_then_alternates() {
        let dir = TempDir::new().unwrap();
        let registry = FilesystemRegistry::open(dir.path()).await.unwrap();
        let blog = slug("blog");

        assert!(registry.toggle(&blog).await.unwrap().enabled);
        assert!(!registry.toggle(&blog).await.unwrap().enabled);
        assert!(registry.toggle(&blog).await.unwrap().enabled);
    }
}
