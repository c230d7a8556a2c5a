//! Resource staging for the packr bundle
//!
//! Copies every manifest entry from its provider into the install root. Each
//! category directory is created before any of its files are copied, and
//! every file lands through a temporary sibling that is renamed into place,
//! so a failed copy never leaves a truncated file under the final name.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::NamedTempFile;

use super::manifest::{MANIFESTS, Manifest, ManifestKind};
use crate::error::{InstallError, Result};

/// Supplies the bytes of bundled resources by name
pub trait ResourceProvider {
    /// Open `name` for reading; `ResourceNotFound` if it is not bundled
    fn fetch(&self, name: &str) -> Result<Box<dyn Read + '_>>;
}

/// Serves resources from a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    dir: PathBuf,
}

impl DirectoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ResourceProvider for DirectoryProvider {
    fn fetch(&self, name: &str) -> Result<Box<dyn Read + '_>> {
        let path = self.dir.join(name);
        match fs::File::open(&path) {
            Ok(file) => Ok(Box::new(io::BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(InstallError::ResourceNotFound {
                name: path.display().to_string(),
            }),
            Err(e) => Err(InstallError::io(path, e)),
        }
    }
}

/// Serves resources from memory
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(name.into(), bytes.into());
        self
    }
}

impl ResourceProvider for MemoryProvider {
    fn fetch(&self, name: &str) -> Result<Box<dyn Read + '_>> {
        self.files
            .get(name)
            .map(|bytes| Box::new(bytes.as_slice()) as Box<dyn Read + '_>)
            .ok_or_else(|| InstallError::ResourceNotFound {
                name: name.to_string(),
            })
    }
}

/// Manifests paired with the providers that back them
#[derive(Default)]
pub struct ResourceBundle {
    categories: Vec<(Manifest, Box<dyn ResourceProvider + Send>)>,
}

impl ResourceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shipped manifests, each read from `<dir>/<manifest name>/`
    pub fn from_dir(dir: &Path) -> Self {
        MANIFESTS.iter().fold(Self::new(), |bundle, manifest| {
            bundle.with(*manifest, DirectoryProvider::new(dir.join(manifest.name)))
        })
    }

    pub fn with(
        mut self,
        manifest: Manifest,
        provider: impl ResourceProvider + Send + 'static,
    ) -> Self {
        self.categories.push((manifest, Box::new(provider)));
        self
    }

    pub fn manifests(&self) -> impl Iterator<Item = &Manifest> {
        self.categories.iter().map(|(manifest, _)| manifest)
    }
}

impl std::fmt::Debug for ResourceBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.manifests().map(|m| m.name))
            .finish()
    }
}

/// Paths produced by [`stage`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedResources {
    /// Every staged file, in staging order
    pub files: Vec<PathBuf>,
    /// Category directories and root-level content files
    pub top_level: Vec<PathBuf>,
    /// Staged jars
    pub libraries: Vec<PathBuf>,
}

impl StagedResources {
    fn push_top_level(&mut self, path: PathBuf) {
        if !self.top_level.contains(&path) {
            self.top_level.push(path);
        }
    }
}

/// Copy every bundled resource below `destination`, overwriting existing files
pub fn stage(bundle: &ResourceBundle, destination: &Path) -> Result<StagedResources> {
    let mut staged = StagedResources::default();

    for (manifest, provider) in &bundle.categories {
        let category_dir = destination.join(manifest.dest_dir);
        fs::create_dir_all(&category_dir).map_err(|e| InstallError::io(&category_dir, e))?;
        info!(
            "Staging {} ({} files) into {}",
            manifest.name,
            manifest.entries.len(),
            category_dir.display()
        );

        if manifest.has_own_dir() && manifest.kind == ManifestKind::Content {
            staged.push_top_level(category_dir.clone());
        }

        for entry in manifest.entries() {
            let dest = destination.join(&entry.dest_relative);
            let mut source = provider.fetch(entry.logical_name)?;
            let bytes = copy_into_place(&mut source, &dest)?;
            debug!("Staged {} ({bytes} bytes)", dest.display());

            match manifest.kind {
                ManifestKind::Library => staged.libraries.push(dest.clone()),
                ManifestKind::Content if !manifest.has_own_dir() => {
                    staged.push_top_level(dest.clone())
                }
                ManifestKind::Content => {}
            }
            staged.files.push(dest);
        }
    }

    info!("Staged {} resource files", staged.files.len());
    Ok(staged)
}

fn copy_into_place(source: &mut dyn Read, dest: &Path) -> Result<u64> {
    let dir = dest.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| InstallError::io(dir, e))?;
    let bytes = io::copy(source, &mut tmp).map_err(|e| InstallError::io(dest, e))?;
    // temp files are created 0600
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(|e| InstallError::io(dest, e))?;
    }
    tmp.persist(dest)
        .map_err(|e| InstallError::io(dest, e.error))?;
    Ok(bytes)
}
