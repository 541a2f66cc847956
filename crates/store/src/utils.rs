use std::fs;
use std::io;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

/// Recursively copy the contents of `src` into `dst`, creating `dst`.
///
/// Symbolic links are not followed and not copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<u64> {
    fs::create_dir_all(dst)?;
    let mut copied = 0;

    for entry in WalkDir::new(src).min_depth(1).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Append one line to `path`, creating the file and its parent.
pub async fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{line}\n").as_bytes()).await?;
    file.flush().await
}
