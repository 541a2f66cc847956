//! Trait definitions for module registry backends.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ModuleRecord, ModuleUpdate};
use crate::types::Slug;

/// Persisted per-module state.
///
/// Implementations must be safe to share behind an `Arc` and serialize
/// concurrent writers internally: two upserts for the same slug never lose
/// an update, and upserts for different slugs never interfere.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Whether the backing store exists yet.
    ///
    /// A missing store is not an error; the boot loader treats it as
    /// "nothing enabled".
    async fn is_initialized(&self) -> Result<bool>;

    /// Create the backing store if it does not exist.
    async fn initialize(&self) -> Result<()>;

    /// Get a record by slug, including soft-deleted ones.
    async fn get(&self, slug: &Slug) -> Result<Option<ModuleRecord>>;

    /// Insert or update a record.
    ///
    /// A record created by this call gets the registry defaults
    /// (enabled, version `1.0.0`, source `cli`) for every field the update
    /// leaves unset, plus `created_at`. `updated_at` is always stamped.
    async fn upsert(&self, slug: &Slug, update: ModuleUpdate) -> Result<ModuleRecord>;

    /// List records ordered by slug.
    async fn scan(&self, include_deleted: bool) -> Result<Vec<ModuleRecord>>;

    /// Mark a record deleted. Returns `false` when no such record exists.
    async fn soft_delete(&self, slug: &Slug) -> Result<bool>;

    /// Bring a soft-deleted record back. Returns `false` when no such record exists.
    async fn restore(&self, slug: &Slug) -> Result<bool>;

    /// Slugs of active records with `enabled = true`.
    async fn enabled_slugs(&self) -> Result<Vec<Slug>> {
        Ok(self
            .scan(false)
            .await?
            .into_iter()
            .filter(|record| record.enabled)
            .map(|record| record.slug)
            .collect())
    }

    /// Flip the enabled flag, creating an enabled record when none exists.
    async fn toggle(&self, slug: &Slug) -> Result<ModuleRecord>;
}
