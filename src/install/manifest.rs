//! Canonical registry of the resources shipped with the DChess client
//!
//! This module defines the authoritative lists of files the installer stages
//! before running packr. When adding or removing a bundled file, update ONLY
//! the arrays below.

use std::path::PathBuf;

/// How the packr descriptor refers to a staged category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Goes into the bundle's `resources` list
    Content,
    /// Goes onto the bundle's `classpath`
    Library,
}

/// A fixed, named list of resources staged into one directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    /// Category name, also the folder the default bundle keeps these files in
    pub name: &'static str,
    /// Destination directory relative to the install root ("" for the root)
    pub dest_dir: &'static str,
    pub kind: ManifestKind,
    pub entries: &'static [&'static str],
}

/// One resource to stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub logical_name: &'static str,
    pub dest_relative: PathBuf,
}

impl Manifest {
    /// Entries with their destination paths relative to the install root
    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry> + '_ {
        self.entries.iter().map(|name| ManifestEntry {
            logical_name: name,
            dest_relative: PathBuf::from(self.dest_dir).join(name),
        })
    }

    /// Staged into a subdirectory rather than the root itself
    pub fn has_own_dir(&self) -> bool {
        !self.dest_dir.is_empty()
    }
}

/// packr's own jar; copied so it can run, never put on the game classpath
pub const PACKAGER_ARTIFACT: &str = "packr.jar";

/// Descriptor template consumed by packr, rewritten in place
pub const DESCRIPTOR_FILE: &str = "options.json";

/// Name of the launcher packr generates
pub const EXECUTABLE_NAME: &str = "DChess";

/// Default client configuration, the packr template and the app icon
pub const CONTENT_FILES: Manifest = Manifest {
    name: "content",
    dest_dir: "",
    kind: ManifestKind::Content,
    entries: &["config.txt", DESCRIPTOR_FILE, "icon.png"],
};

pub const CHESS_PIECES: Manifest = Manifest {
    name: "chesspieces",
    dest_dir: "chesspieces",
    kind: ManifestKind::Content,
    entries: &[
        "bishopBlack.png",
        "bishopWhite.png",
        "kingBlack.png",
        "kingWhite.png",
        "knightBlack.png",
        "knightWhite.png",
        "pawnBlack.png",
        "pawnWhite.png",
        "queenBlack.png",
        "queenWhite.png",
        "rookBlack.png",
        "rookWhite.png",
    ],
};

/// JavaFX layouts
pub const FXML_FILES: Manifest = Manifest {
    name: "xmls",
    dest_dir: "xmls",
    kind: ManifestKind::Content,
    entries: &["GameBrowser.fxml", "GameEntrance.fxml", "GameScreen.fxml"],
};

/// Client jar, its libraries, and packr itself
pub const LIBRARIES: Manifest = Manifest {
    name: "libs",
    dest_dir: "",
    kind: ManifestKind::Library,
    entries: &[
        "client.jar",
        PACKAGER_ARTIFACT,
        "hamcrest_core_1.3.jar",
        "junit4.jar",
        "netty.jar",
    ],
};

/// Every manifest, in staging order
pub const MANIFESTS: &[Manifest] = &[CHESS_PIECES, FXML_FILES, CONTENT_FILES, LIBRARIES];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_no_duplicate_destinations() {
        let mut seen = HashSet::new();
        for manifest in MANIFESTS {
            for entry in manifest.entries() {
                assert!(
                    seen.insert(entry.dest_relative.clone()),
                    "{} staged twice",
                    entry.dest_relative.display()
                );
            }
        }
        assert_eq!(seen.len(), 23);
    }

    #[test]
    fn test_descriptor_template_is_staged() {
        assert!(CONTENT_FILES.entries.contains(&DESCRIPTOR_FILE));
        assert!(LIBRARIES.entries.contains(&PACKAGER_ARTIFACT));
    }

    #[test]
    fn test_entry_destinations() {
        let first = CHESS_PIECES.entries().next().unwrap();
        assert_eq!(first.dest_relative, PathBuf::from("chesspieces/bishopBlack.png"));

        let config = CONTENT_FILES.entries().next().unwrap();
        assert_eq!(config.dest_relative, PathBuf::from("config.txt"));
        assert!(!CONTENT_FILES.has_own_dir());
    }
}
