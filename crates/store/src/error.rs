use std::path::PathBuf;

use modhost_registry::RegistryError;
use thiserror::Error;

/// Coarse grouping of failures, used to decide how callers react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any I/O. Never retried.
    InputInvalid,
    /// Catalog or network failure. Surfaced as is; the operator decides.
    RemoteUnavailable,
    /// The local tree or cache disagrees with the request.
    LocalStateConflict,
    /// A write or extraction failed.
    StorageFailure,
    /// The module's own install hook failed after its files were placed.
    PostInstallFailure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InputInvalid => "input_invalid",
            ErrorCategory::RemoteUnavailable => "remote_unavailable",
            ErrorCategory::LocalStateConflict => "local_state_conflict",
            ErrorCategory::StorageFailure => "storage_failure",
            ErrorCategory::PostInstallFailure => "post_install_failure",
        }
    }
}

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Invalid module slug '{slug}'")]
    InvalidSlug { slug: String },

    #[error("Invalid catalog URL '{url}'")]
    InvalidCatalogConfig {
        url: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("Catalog request to '{url}' failed: {reason}")]
    CatalogUnreachable {
        url: String,
        reason: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("Catalog returned malformed data: {reason}")]
    CatalogDataInvalid { reason: String },

    #[error("Module '{slug}' was not found in the catalog or has no archive")]
    ModuleNotFound { slug: String },

    #[error("Module '{slug}' requires a license")]
    LicenseRequired { slug: String },

    #[error("Module '{slug}' is already installed at '{}'", .path.display())]
    AlreadyInstalled { slug: String, path: PathBuf },

    #[error("Download from '{url}' failed: {reason}")]
    DownloadFailed {
        url: String,
        reason: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("Archive from '{url}' exceeds the {limit} byte limit")]
    ArchiveTooLarge { url: String, limit: u64 },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Failed to write '{}'", .path.display())]
    StorageWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract archive into '{}': {reason}", .path.display())]
    ExtractionFailed {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("Install hook for module '{slug}' failed: {reason}")]
    PostInstallFailed { slug: String, reason: String },

    #[error("License key for '{slug}' must be at least {min} characters")]
    LicenseTooShort { slug: String, min: usize },

    #[error("License for '{slug}' was rejected: {reason}")]
    LicenseInvalid { slug: String, reason: String },

    #[error("No cached archive for module '{slug}'")]
    ArchiveNotFound { slug: String },

    #[error("Invalid source URL '{url}'")]
    InvalidSourceUrl {
        url: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error("Archive does not contain the expected folder '{folder}'")]
    MissingExpectedFolder { folder: String },

    #[error("Failed to swap in the new core tree: {reason}")]
    CoreSwapFailed {
        reason: String,
        #[source]
        source: Option<eyre::Report>,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, ModuleError>;

impl ModuleError {
    pub fn category(&self) -> ErrorCategory {
        use ModuleError::*;
        match self {
            InvalidSlug { .. }
            | InvalidCatalogConfig { .. }
            | LicenseRequired { .. }
            | LicenseTooShort { .. }
            | LicenseInvalid { .. }
            | InvalidSourceUrl { .. } => ErrorCategory::InputInvalid,
            CatalogUnreachable { .. }
            | CatalogDataInvalid { .. }
            | DownloadFailed { .. }
            | ArchiveTooLarge { .. }
            | ChecksumMismatch { .. } => ErrorCategory::RemoteUnavailable,
            ModuleNotFound { .. }
            | AlreadyInstalled { .. }
            | ArchiveNotFound { .. }
            | MissingExpectedFolder { .. } => ErrorCategory::LocalStateConflict,
            StorageWriteFailed { .. }
            | ExtractionFailed { .. }
            | CoreSwapFailed { .. }
            | Registry(_) => ErrorCategory::StorageFailure,
            PostInstallFailed { .. } => ErrorCategory::PostInstallFailure,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        use ModuleError::*;
        match self {
            InvalidSlug { .. } => "MODHOST_INPUT_01",
            LicenseTooShort { .. } => "MODHOST_INPUT_02",
            InvalidCatalogConfig { .. } => "MODHOST_CATALOG_01",
            CatalogUnreachable { .. } => "MODHOST_CATALOG_02",
            CatalogDataInvalid { .. } => "MODHOST_CATALOG_03",
            ModuleNotFound { .. } => "MODHOST_INSTALL_01",
            LicenseRequired { .. } => "MODHOST_INSTALL_02",
            AlreadyInstalled { .. } => "MODHOST_INSTALL_03",
            PostInstallFailed { .. } => "MODHOST_INSTALL_04",
            DownloadFailed { .. } => "MODHOST_FETCH_01",
            ArchiveTooLarge { .. } => "MODHOST_FETCH_02",
            ChecksumMismatch { .. } => "MODHOST_FETCH_03",
            StorageWriteFailed { .. } => "MODHOST_STORAGE_01",
            ExtractionFailed { .. } => "MODHOST_STORAGE_02",
            LicenseInvalid { .. } => "MODHOST_LICENSE_01",
            ArchiveNotFound { .. } => "MODHOST_LICENSE_02",
            InvalidSourceUrl { .. } => "MODHOST_UPDATE_01",
            MissingExpectedFolder { .. } => "MODHOST_UPDATE_02",
            CoreSwapFailed { .. } => "MODHOST_UPDATE_03",
            Registry(_) => "MODHOST_REGISTRY_01",
        }
    }

    /// Short human label.
    pub fn short(&self) -> &'static str {
        use ModuleError::*;
        match self {
            InvalidSlug { .. } => "Invalid slug",
            LicenseTooShort { .. } => "License too short",
            InvalidCatalogConfig { .. } => "Invalid catalog URL",
            CatalogUnreachable { .. } => "Catalog unreachable",
            CatalogDataInvalid { .. } => "Catalog data invalid",
            ModuleNotFound { .. } => "Module not found",
            LicenseRequired { .. } => "License required",
            AlreadyInstalled { .. } => "Already installed",
            PostInstallFailed { .. } => "Install hook failed",
            DownloadFailed { .. } => "Download failed",
            ArchiveTooLarge { .. } => "Archive too large",
            ChecksumMismatch { .. } => "Checksum mismatch",
            StorageWriteFailed { .. } => "Write failed",
            ExtractionFailed { .. } => "Extraction failed",
            LicenseInvalid { .. } => "License invalid",
            ArchiveNotFound { .. } => "Archive not found",
            InvalidSourceUrl { .. } => "Invalid source URL",
            MissingExpectedFolder { .. } => "Missing expected folder",
            CoreSwapFailed { .. } => "Core swap failed",
            Registry(_) => "Registry error",
        }
    }

    /// Best-effort remediation hint.
    pub fn recommendation(&self) -> &'static str {
        use ModuleError::*;
        match self {
            InvalidSlug { .. } => "Use only lowercase letters, digits and dashes.",
            LicenseTooShort { .. } => "Check that the full license key was pasted.",
            InvalidCatalogConfig { .. } => "Set catalog.base_url to an absolute http(s) URL.",
            CatalogUnreachable { .. } => {
                "Check network access and the catalog token, then retry."
            }
            CatalogDataInvalid { .. } => "The catalog may be degraded; retry later.",
            ModuleNotFound { .. } => "Check the slug against the catalog listing.",
            LicenseRequired { .. } => "Pass a license key for this module.",
            AlreadyInstalled { .. } => {
                "Remove the existing module directory before reinstalling."
            }
            PostInstallFailed { .. } => {
                "Inspect the module directory and the hook output, then enable it manually."
            }
            DownloadFailed { .. } => "Check that the archive URL is reachable, then retry.",
            ArchiveTooLarge { .. } => "Raise catalog.max_archive_bytes if the archive is trusted.",
            ChecksumMismatch { .. } => "Do not install this archive; report it to the publisher.",
            StorageWriteFailed { .. } => "Check disk space and permissions on the data directory.",
            ExtractionFailed { .. } => "The archive is corrupt or unsafe; contact the publisher.",
            LicenseInvalid { .. } => "Verify the license key with the catalog.",
            ArchiveNotFound { .. } => "Reinstall the module to repopulate the archive cache.",
            InvalidSourceUrl { .. } => "Pass an absolute http(s) URL.",
            MissingExpectedFolder { .. } => "Check core.archive_root against the archive layout.",
            CoreSwapFailed { .. } => "The previous core tree was kept; check disk permissions.",
            Registry(_) => "Check the registry store and its backup file.",
        }
    }

    pub fn http_status(&self) -> u16 {
        use ModuleError::*;
        match self {
            InvalidSlug { .. }
            | LicenseTooShort { .. }
            | InvalidSourceUrl { .. } => 422,
            MissingExpectedFolder { .. } => 400,
            LicenseRequired { .. } | LicenseInvalid { .. } => 403,
            ModuleNotFound { .. } | ArchiveNotFound { .. } => 404,
            AlreadyInstalled { .. } => 409,
            CatalogUnreachable { .. }
            | CatalogDataInvalid { .. }
            | DownloadFailed { .. }
            | ArchiveTooLarge { .. }
            | ChecksumMismatch { .. } => 502,
            InvalidCatalogConfig { .. }
            | StorageWriteFailed { .. }
            | ExtractionFailed { .. }
            | PostInstallFailed { .. }
            | CoreSwapFailed { .. }
            | Registry(_) => 500,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ModuleError::CatalogUnreachable { .. } | ModuleError::DownloadFailed { .. }
        )
    }

    pub fn is_user_error(&self) -> bool {
        self.category() == ErrorCategory::InputInvalid
            || matches!(
                self,
                ModuleError::ModuleNotFound { .. } | ModuleError::AlreadyInstalled { .. }
            )
    }
}
