//! Install root validation

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::error::{InstallError, Result};

/// Create the install root if needed and check it is a usable directory
///
/// Returns the absolute root every later stage works under.
pub fn ensure(path: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| InstallError::InvalidInstallTarget {
        path: path.to_path_buf(),
        reason,
    };

    let root = std::path::absolute(path).map_err(|e| invalid(e.to_string()))?;

    match fs::metadata(&root) {
        Ok(meta) if !meta.is_dir() => return Err(invalid("not a directory".to_string())),
        Ok(_) => {}
        Err(_) => {
            fs::create_dir_all(&root)
                .map_err(|e| invalid(format!("cannot create directory: {e}")))?;
            info!("Created install directory {}", root.display());
        }
    }

    fs::read_dir(&root).map_err(|e| invalid(format!("not readable: {e}")))?;
    tempfile::tempfile_in(&root).map_err(|e| invalid(format!("not writable: {e}")))?;

    info!("Install directory: {}", root.display());
    Ok(root)
}
