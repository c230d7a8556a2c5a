//! Workspace cleanup after packaging

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

/// What a [`clean`] pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub removed_files: usize,
    pub removed_dirs: usize,
    /// Entries that could not be removed; each one was logged
    pub failed: usize,
}

impl CleanupSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Delete everything under `root` except the `preserve` subtree
///
/// Symlinks are removed, never followed. Failures are logged and counted,
/// the walk always continues.
pub fn clean(root: &Path, preserve: &Path) -> CleanupSummary {
    let mut summary = CleanupSummary::default();

    let root = match fs::canonicalize(root) {
        Ok(root) => root,
        Err(e) => {
            warn!("Cannot clean {}: {e}", root.display());
            summary.failed += 1;
            return summary;
        }
    };
    let preserve = canonical_or_absolute(preserve);

    info!(
        "Cleaning {} (keeping {})",
        root.display(),
        preserve.display()
    );
    clean_dir(&root, &preserve, &mut summary);

    info!(
        "Cleanup removed {} files and {} directories ({} failures)",
        summary.removed_files, summary.removed_dirs, summary.failed
    );
    summary
}

fn canonical_or_absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

// `dir` is canonical and children are never reached through a symlink, so
// joined paths stay canonical and compare directly against `preserve`.
fn clean_dir(dir: &Path, preserve: &Path, summary: &mut CleanupSummary) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to list {}: {e}", dir.display());
            summary.failed += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read entry in {}: {e}", dir.display());
                summary.failed += 1;
                continue;
            }
        };
        let path = dir.join(entry.file_name());

        if path == preserve {
            debug!("Keeping {}", path.display());
            continue;
        }

        let file_type = match fs::symlink_metadata(&path) {
            Ok(meta) => meta.file_type(),
            Err(e) => {
                warn!("Failed to stat {}: {e}", path.display());
                summary.failed += 1;
                continue;
            }
        };

        if file_type.is_dir() {
            clean_dir(&path, preserve, summary);
            if preserve.starts_with(&path) {
                continue;
            }
            match fs::remove_dir(&path) {
                Ok(()) => {
                    debug!("Removed directory {}", path.display());
                    summary.removed_dirs += 1;
                }
                Err(e) => {
                    warn!("Failed to remove directory {}: {e}", path.display());
                    summary.failed += 1;
                }
            }
        } else {
            // directory symlinks on Windows need remove_dir
            let removed = fs::remove_file(&path).or_else(|e| {
                if file_type.is_symlink() {
                    fs::remove_dir(&path)
                } else {
                    Err(e)
                }
            });
            match removed {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    summary.removed_files += 1;
                }
                Err(e) => {
                    warn!("Failed to remove {}: {e}", path.display());
                    summary.failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
        walkdir::WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .map(|e| e.unwrap())
            .map(|e| {
                let content = e.file_type().is_file().then(|| fs::read(e.path()).unwrap());
                (e.path().strip_prefix(root).unwrap().to_path_buf(), content)
            })
            .collect()
    }

    fn top_level(root: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn populate(root: &Path) {
        for dir in ["dchess/jre/bin", "runtime/jdk/bin", "chesspieces", "xmls"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("dchess/DChess"), b"launcher").unwrap();
        fs::write(root.join("dchess/jre/bin/java"), b"java").unwrap();
        fs::write(root.join("runtime/jdk/bin/java"), b"java").unwrap();
        fs::write(root.join("chesspieces/kingWhite.png"), b"png").unwrap();
        fs::write(root.join("options.json"), b"{}").unwrap();
        fs::write(root.join("client.jar"), b"jar").unwrap();
    }

    #[test]
    fn test_keeps_only_preserved_subtree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        populate(root);
        let before = snapshot(&root.join("dchess"));

        let summary = clean(root, &root.join("dchess"));

        assert_eq!(top_level(root), vec!["dchess"]);
        assert_eq!(snapshot(&root.join("dchess")), before);
        assert_eq!(summary.removed_files, 4);
        assert_eq!(summary.removed_dirs, 5);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_nested_preserve_keeps_ancestors() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        populate(root);

        let summary = clean(root, &root.join("runtime/jdk"));

        assert_eq!(top_level(root), vec!["runtime"]);
        assert!(root.join("runtime/jdk/bin/java").is_file());
        assert!(summary.is_clean());
    }

    #[test]
    fn test_missing_preserve_removes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        populate(tmp.path());

        let summary = clean(tmp.path(), &tmp.path().join("never-created"));
        assert!(top_level(tmp.path()).is_empty());
        assert!(summary.is_clean());
    }

    #[test]
    fn test_missing_root_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let summary = clean(&tmp.path().join("gone"), &tmp.path().join("gone/dchess"));
        assert_eq!(summary.failed, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_removed_not_followed() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("keep.txt"), b"outside").unwrap();

        let root = tmp.path();
        populate(root);
        std::os::unix::fs::symlink(outside.path(), root.join("outside-link")).unwrap();
        std::os::unix::fs::symlink(root.join("dchess"), root.join("dchess-link")).unwrap();

        let summary = clean(root, &root.join("dchess"));

        assert_eq!(top_level(root), vec!["dchess"]);
        assert_eq!(fs::read(outside.path().join("keep.txt")).unwrap(), b"outside");
        assert!(root.join("dchess/DChess").is_file());
        assert!(summary.is_clean());
    }
}
