//! Registry backend implementations.

pub mod filesystem;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use filesystem::FilesystemRegistry;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRegistry;
