//! Image discovery
//!
//! Walks a folder tree top-down and collects every file whose extension is
//! one of the supported image types. Order follows the traversal, which is
//! filesystem dependent; callers must not rely on it being sorted.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{CatalogError, Result};

/// Supported image extensions, compared case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 2] = ["png", "jpg"];

/// Check if a path has one of the supported image extensions
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension() {
        Some(extension) => {
            let ext = extension.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

/// Recursively collect image paths under `root`.
///
/// Returns `CatalogError::InvalidFolder` if `root` is not a directory.
/// An empty vector is a valid result. Unreadable entries are skipped with
/// a warning rather than aborting the walk.
pub fn scan(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        warn!(folder = %root.display(), "invalid top level folder");
        return Err(CatalogError::InvalidFolder(root.to_path_buf()));
    }

    debug!(folder = %root.display(), "scanning for images");

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();

        // Symlinks count when they point at a regular file
        if !path.is_file() {
            continue;
        }

        if is_supported_image(path) {
            paths.push(path.to_path_buf());
        }
    }

    if paths.is_empty() {
        warn!(folder = %root.display(), "no images found in folder");
    } else {
        debug!(count = paths.len(), "scan complete");
    }

    Ok(paths)
}
