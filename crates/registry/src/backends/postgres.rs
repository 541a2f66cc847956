//! PostgreSQL registry backend.

use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use chrono::{DateTime, Utc};
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};

use crate::error::{RegistryError, Result};
use crate::models::{ModuleRecord, ModuleUpdate};
use crate::traits::RegistryStore;
use crate::types::{InstallSource, Lifecycle, Slug};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS modules (
    slug          TEXT PRIMARY KEY,
    enabled       BOOLEAN NOT NULL DEFAULT TRUE,
    version       TEXT NOT NULL DEFAULT '1.0.0',
    source        TEXT NOT NULL DEFAULT 'cli' CHECK (source IN ('cli', 'store', 'api')),
    meta          JSONB,
    installed_at  TIMESTAMPTZ,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL,
    deleted_at    TIMESTAMPTZ
)";

const SELECT_COLUMNS: &str =
    "slug, enabled, version, source, meta, installed_at, created_at, updated_at, deleted_at";

const UPSERT: &str = "
INSERT INTO modules (slug, enabled, version, source, meta, installed_at, created_at, updated_at, deleted_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (slug) DO UPDATE SET
    enabled = EXCLUDED.enabled,
    version = EXCLUDED.version,
    source = EXCLUDED.source,
    meta = EXCLUDED.meta,
    installed_at = EXCLUDED.installed_at,
    updated_at = EXCLUDED.updated_at,
    deleted_at = EXCLUDED.deleted_at";

type PgPool = Pool<PostgresConnectionManager<NoTls>>;

fn backend(e: impl Into<eyre::Report>) -> RegistryError {
    RegistryError::BackendError {
        source: Some(e.into()),
    }
}

/// Registry stored in a `modules` table.
///
/// Read-modify-write happens inside a transaction holding a row lock, so
/// concurrent upserts of the same slug serialize in the database.
#[derive(Clone)]
pub struct PostgresRegistry {
    pool: PgPool,
}

impl PostgresRegistry {
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let manager = PostgresConnectionManager::new_from_stringlike(connection_string, NoTls)
            .map_err(backend)?;
        let pool = Pool::builder().build(manager).await.map_err(backend)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &Row) -> Result<ModuleRecord> {
        let slug: String = row.get("slug");
        let source: String = row.get("source");
        let deleted_at: Option<DateTime<Utc>> = row.get("deleted_at");
        Ok(ModuleRecord {
            slug: Slug::parse(&slug)?,
            enabled: row.get("enabled"),
            version: row.get("version"),
            source: source.parse::<InstallSource>()?,
            meta: row.get("meta"),
            installed_at: row.get("installed_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            lifecycle: match deleted_at {
                Some(at) => Lifecycle::Deleted { at },
                None => Lifecycle::Active,
            },
        })
    }

    async fn modify<F>(&self, slug: &Slug, create: bool, f: F) -> Result<Option<ModuleRecord>>
    where
        F: FnOnce(Option<ModuleRecord>, DateTime<Utc>) -> Option<ModuleRecord> + Send,
    {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let tx = conn.transaction().await.map_err(backend)?;

        let query = format!("SELECT {SELECT_COLUMNS} FROM modules WHERE slug = $1 FOR UPDATE");
        let existing = tx
            .query_opt(query.as_str(), &[&slug.as_str()])
            .await
            .map_err(backend)?
            .map(|row| Self::row_to_record(&row))
            .transpose()?;

        if existing.is_none() && !create {
            return Ok(None);
        }

        let Some(record) = f(existing, Utc::now()) else {
            return Ok(None);
        };

        tx.execute(
            UPSERT,
            &[
                &record.slug.as_str(),
                &record.enabled,
                &record.version,
                &record.source.as_str(),
                &record.meta,
                &record.installed_at,
                &record.created_at,
                &record.updated_at,
                &record.lifecycle.deleted_at(),
            ],
        )
        .await
        .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        debug!("Persisted module record {}", record.slug);
        Ok(Some(record))
    }
}

#[async_trait]
impl RegistryStore for PostgresRegistry {
    async fn is_initialized(&self) -> Result<bool> {
        let conn = self.pool.get().await.map_err(backend)?;
        let row = conn
            .query_one("SELECT to_regclass('modules') IS NOT NULL", &[])
            .await
            .map_err(backend)?;
        Ok(row.get(0))
    }

    async fn initialize(&self) -> Result<()> {
        let conn = self.pool.get().await.map_err(backend)?;
        conn.batch_execute(CREATE_TABLE).await.map_err(backend)?;
        info!("Module registry table ready");
        Ok(())
    }

    async fn get(&self, slug: &Slug) -> Result<Option<ModuleRecord>> {
        let conn = self.pool.get().await.map_err(backend)?;
        let query = format!("SELECT {SELECT_COLUMNS} FROM modules WHERE slug = $1");
        conn.query_opt(query.as_str(), &[&slug.as_str()])
            .await
            .map_err(backend)?
            .map(|row| Self::row_to_record(&row))
            .transpose()
    }

    async fn upsert(&self, slug: &Slug, update: ModuleUpdate) -> Result<ModuleRecord> {
        let slug_owned = slug.clone();
        self.modify(slug, true, move |existing, now| {
            let mut record = existing.unwrap_or_else(|| ModuleRecord::new(slug_owned, now));
            record.apply(&update, now);
            Some(record)
        })
        .await?
        .ok_or_else(|| RegistryError::ModuleNotFound {
            slug: slug.to_string(),
        })
    }

    async fn scan(&self, include_deleted: bool) -> Result<Vec<ModuleRecord>> {
        let conn = self.pool.get().await.map_err(backend)?;
        let filter = if include_deleted {
            ""
        } else {
            "WHERE deleted_at IS NULL"
        };
        let query = format!("SELECT {SELECT_COLUMNS} FROM modules {filter} ORDER BY slug");
        conn.query(query.as_str(), &[])
            .await
            .map_err(backend)?
            .iter()
            .map(Self::row_to_record)
            .collect()
    }

    async fn soft_delete(&self, slug: &Slug) -> Result<bool> {
        let deleted = self
            .modify(slug, false, |existing, now| {
                existing.map(|mut record| {
                    record.apply(
                        &ModuleUpdate::new().lifecycle(Lifecycle::Deleted { at: now }),
                        now,
                    );
                    record
                })
            })
            .await?;
        Ok(deleted.is_some())
    }

    async fn restore(&self, slug: &Slug) -> Result<bool> {
        let restored = self
            .modify(slug, false, |existing, now| {
                existing.map(|mut record| {
                    record.apply(&ModuleUpdate::new().lifecycle(Lifecycle::Active), now);
                    record
                })
            })
            .await?;
        Ok(restored.is_some())
    }

    async fn toggle(&self, slug: &Slug) -> Result<ModuleRecord> {
        let slug_owned = slug.clone();
        self.modify(slug, true, move |existing, now| {
            Some(match existing {
                Some(mut record) => {
                    let enabled = !record.enabled;
                    record.apply(&ModuleUpdate::new().enabled(enabled), now);
                    record
                }
                None => ModuleRecord::new(slug_owned, now),
            })
        })
        .await?
        .ok_or_else(|| RegistryError::ModuleNotFound {
            slug: slug.to_string(),
        })
    }
}
