//! Resource copying.
//!
//! Directory resources are copied recursively with symbolic links kept as
//! links. File resources land in a per-category directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use kiln_core::{ResourceCategory, path::is_contained, spec::Resources};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::session::{BuildSession, Inconsistency};

/// Asset processing errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Invalid asset path.
    #[error("invalid asset path: {}", .0.display())]
    InvalidPath(PathBuf),
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// Create a directory and its parents if they don't exist.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Copy a single file, keeping its permissions and modification time.
pub fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    fs::copy(source, dest)?;
    let modified = fs::metadata(source)?.modified()?;
    // Read-only copies cannot be reopened for writing; they keep the copy time.
    if let Err(e) = fs::File::options()
        .write(true)
        .open(dest)
        .and_then(|file| file.set_modified(modified))
    {
        debug!(path = %dest.display(), error = %e, "could not preserve modification time");
    }
    Ok(())
}

/// Recursively copy `source` into `dest`, merging with existing content.
///
/// Returns the number of files and links copied.
pub fn copy_dir(source: &Path, dest: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| AssetError::InvalidPath(entry.path().to_path_buf()))?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            count += 1;
        } else if file_type.is_dir() {
            ensure_dir(&target)?;
        } else {
            copy_file(entry.path(), &target)?;
            count += 1;
        }
    }
    debug!(src = %source.display(), dest = %dest.display(), count, "copied directory");
    Ok(count)
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    let link = fs::read_link(source)?;
    if dest.symlink_metadata().is_ok() {
        fs::remove_file(dest)?;
    }
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    std::os::unix::fs::symlink(link, dest)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, dest: &Path) -> Result<()> {
    if source.is_dir() {
        copy_dir(source, dest).map(|_| ())
    } else {
        copy_file(source, dest)
    }
}

/// Copy declared resources from `source_dir` into `output_dir`.
///
/// A directory goes to `output_dir/<new name or name>`. A file goes to
/// `output_dir/<category>/<name>` when its category is css, font, img or js;
/// other categories, missing sources and names or targets that would leave
/// their directory are reported to the session and skipped. Returns the
/// number of resources copied.
pub fn copy_resources(
    resources: &Resources,
    source_dir: &Path,
    output_dir: &Path,
    session: &BuildSession,
) -> Result<usize> {
    let mut copied = 0;
    for (name, target) in resources {
        if let Some(invalid) = [Some(name), target.as_ref()]
            .into_iter()
            .flatten()
            .find(|path| path.is_empty() || !is_contained(path))
        {
            session.report(Inconsistency::InvalidResourcePath {
                name: invalid.clone(),
            });
            continue;
        }

        let source = source_dir.join(name);
        if source.is_dir() {
            let dest = output_dir.join(target.as_deref().unwrap_or(name));
            copy_dir(&source, &dest)?;
            copied += 1;
        } else if source.is_file() {
            match target.as_deref().and_then(ResourceCategory::parse) {
                Some(category) => {
                    copy_file(&source, &output_dir.join(category.dir_name()).join(name))?;
                    copied += 1;
                }
                None => session.report(Inconsistency::UnknownResourceCategory {
                    path: source,
                    category: target.clone(),
                }),
            }
        } else {
            session.report(Inconsistency::MissingResource { path: source });
        }
    }

    if copied > 0 {
        info!(count = copied, dest = %output_dir.display(), "copied resources");
    }
    Ok(copied)
}
