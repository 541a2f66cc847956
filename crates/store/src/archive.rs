//! Safe extraction of zip and tar.gz archives.
//!
//! Every entry name is validated before anything is written: absolute paths
//! and `..` components fail the whole extraction. Symbolic and hard links
//! are skipped.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, warn};

use crate::error::{ModuleError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from the leading bytes.
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
            Some(ArchiveFormat::Zip)
        } else if head.starts_with(&[0x1f, 0x8b]) {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

/// Turn an archive entry name into a path relative to the destination.
///
/// Returns an empty path for entries that name the root itself.
pub fn sanitize_entry_path(name: &str) -> std::result::Result<PathBuf, String> {
    let mut clean = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(format!("entry '{name}' escapes the destination")),
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("entry '{name}' is an absolute path"));
            }
        }
    }
    Ok(clean)
}

/// Extract the archive at `archive` into `dest`.
///
/// `dest` is created only once every entry name has been validated.
/// Returns the number of regular files written.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize> {
    let fail = |reason: String, source: Option<eyre::Report>| ModuleError::ExtractionFailed {
        path: dest.to_path_buf(),
        reason,
        source,
    };

    let mut head = [0u8; 4];
    let read = File::open(archive)
        .and_then(|mut f| f.read(&mut head))
        .map_err(|e| fail(format!("cannot open '{}'", archive.display()), Some(e.into())))?;

    let format = ArchiveFormat::detect(&head[..read])
        .ok_or_else(|| fail("unrecognised archive format".to_string(), None))?;
    debug!(archive = %archive.display(), ?format, "Extracting archive");

    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest),
    }
    .map_err(|e| match e {
        ExtractError::Unsafe(reason) => fail(reason, None),
        ExtractError::Io(reason, source) => fail(reason, Some(source)),
    })
}

enum ExtractError {
    Unsafe(String),
    Io(String, eyre::Report),
}

fn io_err(context: impl Into<String>) -> impl FnOnce(io::Error) -> ExtractError {
    let context = context.into();
    move |e| ExtractError::Io(context, e.into())
}

fn extract_zip(archive: &Path, dest: &Path) -> std::result::Result<usize, ExtractError> {
    let file = File::open(archive).map_err(io_err("cannot open archive"))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| ExtractError::Io("not a readable zip archive".to_string(), e.into()))?;

    for name in zip.file_names() {
        sanitize_entry_path(name).map_err(ExtractError::Unsafe)?;
    }
    fs::create_dir_all(dest).map_err(io_err(format!("create {}", dest.display())))?;

    let mut files = 0;
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| ExtractError::Io(format!("cannot read entry {index}"), e.into()))?;
        let name = entry.name().to_string();
        let relative = sanitize_entry_path(&name).map_err(ExtractError::Unsafe)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & 0o170000 == 0o120000) {
            warn!(entry = %name, "Skipping symbolic link in archive");
            continue;
        }

        let target = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(io_err(format!("create {}", target.display())))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err(format!("create {}", parent.display())))?;
        }
        let mut out = File::create(&target).map_err(io_err(format!("create {}", target.display())))?;
        io::copy(&mut entry, &mut out).map_err(io_err(format!("write {}", target.display())))?;

        if let Some(mode) = mode {
            apply_mode(&target, mode);
        }
        files += 1;
    }
    Ok(files)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777)) {
        debug!(path = %path.display(), "Could not set file mode: {}", e);
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) {}

fn open_tar(archive: &Path) -> std::result::Result<tar::Archive<GzDecoder<File>>, ExtractError> {
    let file = File::open(archive).map_err(io_err("cannot open archive"))?;
    Ok(tar::Archive::new(GzDecoder::new(file)))
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> std::result::Result<usize, ExtractError> {
    // First pass validates names so an unsafe archive writes nothing.
    let mut tar = open_tar(archive)?;
    for entry in tar.entries().map_err(io_err("not a readable tar.gz archive"))? {
        let entry = entry.map_err(io_err("cannot read tar entry"))?;
        let path = entry.path().map_err(io_err("cannot read entry path"))?;
        sanitize_entry_path(&path.to_string_lossy()).map_err(ExtractError::Unsafe)?;
    }
    fs::create_dir_all(dest).map_err(io_err(format!("create {}", dest.display())))?;

    let mut tar = open_tar(archive)?;
    let mut files = 0;
    for entry in tar.entries().map_err(io_err("not a readable tar.gz archive"))? {
        let mut entry = entry.map_err(io_err("cannot read tar entry"))?;
        let name = entry
            .path()
            .map_err(io_err("cannot read entry path"))?
            .to_string_lossy()
            .into_owned();
        let relative = sanitize_entry_path(&name).map_err(ExtractError::Unsafe)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = dest.join(&relative);
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&target).map_err(io_err(format!("create {}", target.display())))?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(io_err(format!("create {}", parent.display())))?;
            }
            entry
                .unpack(&target)
                .map_err(io_err(format!("write {}", target.display())))?;
            files += 1;
        } else {
            warn!(entry = %name, ?kind, "Skipping non-regular archive entry");
        }
    }
    Ok(files)
}
