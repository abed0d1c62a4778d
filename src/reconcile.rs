use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ExtractError, Result};

/// Remove stale `.sql` files and emptied directories from the output tree.
///
/// Only runs after all extraction units have completed. Hidden entries are
/// never touched or descended into; the root itself is never removed. A
/// failed deletion is logged and the sweep continues, so already-completed
/// extraction is never thrown away over one stubborn file.
pub fn reconcile_tree(root: &Path, keep: &HashSet<PathBuf>) -> Result<()> {
    if !root.is_dir() {
        return Ok(());
    }
    sweep_files(root, keep)?;
    sweep_dirs(root, root)?;
    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|err| ExtractError::FileRead {
        path: dir.to_path_buf(),
        message: err.to_string(),
        source: err,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| ExtractError::FileRead {
            path: dir.to_path_buf(),
            message: err.to_string(),
            source: err,
        })?;
        paths.push(entry.path());
    }
    Ok(paths)
}

fn sweep_files(dir: &Path, keep: &HashSet<PathBuf>) -> Result<()> {
    for path in read_dir(dir)? {
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            sweep_files(&path, keep)?;
        } else if path.extension().is_some_and(|ext| ext == "sql") && !keep.contains(&path) {
            debug!(path = %path.display(), "deleting stale file");
            if let Err(err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %err, "failed to delete stale file");
            }
        }
    }
    Ok(())
}

/// Depth-first removal of emptied directories. Returns whether `dir` ended
/// up empty (hidden entries count as occupants).
fn sweep_dirs(dir: &Path, root: &Path) -> Result<bool> {
    let mut occupied = 0usize;
    for path in read_dir(dir)? {
        if path.is_dir() && !is_hidden(&path) {
            if sweep_dirs(&path, root)? {
                debug!(path = %path.display(), "removing empty directory");
                if let Err(err) = fs::remove_dir(&path) {
                    warn!(path = %path.display(), error = %err, "failed to remove directory");
                    occupied += 1;
                }
            } else {
                occupied += 1;
            }
        } else {
            occupied += 1;
        }
    }
    Ok(occupied == 0 && dir != root)
}
