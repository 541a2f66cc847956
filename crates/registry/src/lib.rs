//! Persisted module state for the modhost runtime.
//!
//! The registry records, per module slug, whether the module is enabled,
//! which version was installed, where it came from and the catalog metadata
//! captured at install time. Records are soft-deleted, never removed.

pub mod backends;
pub mod error;
pub mod models;
pub mod traits;
pub mod types;

pub use backends::FilesystemRegistry;
#[cfg(feature = "postgres")]
pub use backends::PostgresRegistry;
pub use error::{RegistryError, Result};
pub use models::{DEFAULT_VERSION, ModuleRecord, ModuleUpdate};
pub use traits::RegistryStore;
pub use types::{InstallSource, Lifecycle, Slug};
