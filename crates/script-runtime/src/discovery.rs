//! Plugin discovery inside a plugins directory.
//!
//! Every `.smx` file below the base directory is a plugin. Two
//! subdirectory names are reserved and never scanned at any depth:
//! `disabled` and `optional`.

use crate::error::RuntimeResult;
use std::path::Path;
use tracing::{debug, warn};

/// Plugin file extension.
pub const IMAGE_EXTENSION: &str = "smx";

/// Directory names skipped during the scan.
pub const SKIPPED_DIRS: [&str; 2] = ["disabled", "optional"];

/// Discover plugin files below `base`.
///
/// Returned paths are relative to `base`, use `/` as separator and are
/// sorted so load order is stable across platforms.
pub fn discover_images(base: &Path) -> RuntimeResult<Vec<String>> {
    let mut found = Vec::new();
    if !base.is_dir() {
        debug!("Plugins directory {:?} does not exist", base);
        return Ok(found);
    }
    discover_in_directory(base, "", &mut found)?;
    found.sort();
    debug!("Discovered {} plugin files in {:?}", found.len(), base);
    Ok(found)
}

fn discover_in_directory(dir: &Path, prefix: &str, found: &mut Vec<String>) -> RuntimeResult<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read plugins directory {:?}: {}", dir, e);
            return Ok(());
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        let relative = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        };

        if path.is_dir() {
            if SKIPPED_DIRS.contains(&name) {
                debug!("Skipping {:?}", path);
                continue;
            }
            discover_in_directory(&path, &relative, found)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(IMAGE_EXTENSION) {
            found.push(relative);
        }
    }

    Ok(())
}
