//! Runtime archive extraction
//!
//! Handles unpacking the downloaded JDK from .zip (Windows) and .tar.gz
//! (Linux, macOS) archives. Both formats are walked through the same
//! [`EntrySource`] interface; the caller picks the format explicitly with
//! [`ArchiveKind`], nothing is sniffed from the stream.

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::{debug, info};
use tar::Archive;
use tokio_util::sync::CancellationToken;
use zip::ZipArchive;

use super::platform::ArchiveKind;
use crate::error::{InstallError, Result};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// What an archive entry turns into on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    Symlink { target: PathBuf },
}

/// One entry of a single-pass archive stream
///
/// `content` is only valid while the visitor runs; it cannot be rewound.
pub struct ArchiveEntry<'a> {
    pub name: String,
    pub kind: EntryKind,
    pub mode: Option<u32>,
    pub content: &'a mut dyn Read,
}

/// Lazily iterates the entries of an archive, in stream order
pub trait EntrySource {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(ArchiveEntry<'_>) -> Result<()>,
    ) -> Result<()>;
}

/// Entries of a zip archive
pub struct ZipEntries<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> ZipEntries<R> {
    pub fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader).map_err(InstallError::corrupt)?;
        Ok(Self { archive })
    }
}

impl<R: Read + Seek> EntrySource for ZipEntries<R> {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(ArchiveEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        for i in 0..self.archive.len() {
            let mut file = self
                .archive
                .by_index(i)
                .map_err(|e| InstallError::corrupt(format!("zip entry {i}: {e}")))?;

            let name = file.name().to_string();
            let kind = if file.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let mode = file.unix_mode();

            visit(ArchiveEntry {
                name,
                kind,
                mode,
                content: &mut file,
            })?;
        }
        Ok(())
    }
}

/// Entries of a gzip-compressed tar stream
pub struct TarGzEntries<R: Read> {
    archive: Archive<GzDecoder<R>>,
}

impl<R: Read> TarGzEntries<R> {
    pub fn new(reader: R) -> Self {
        Self {
            archive: Archive::new(GzDecoder::new(reader)),
        }
    }
}

impl<R: Read> EntrySource for TarGzEntries<R> {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(ArchiveEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        let entries = self.archive.entries().map_err(InstallError::corrupt)?;

        for entry in entries {
            let mut entry = entry.map_err(InstallError::corrupt)?;

            let name = entry
                .path()
                .map_err(InstallError::corrupt)?
                .to_string_lossy()
                .into_owned();
            let entry_type = entry.header().entry_type();
            let mode = entry.header().mode().ok();

            let kind = if entry_type.is_dir() {
                EntryKind::Directory
            } else if entry_type.is_symlink() {
                match entry.link_name() {
                    Ok(Some(target)) => EntryKind::Symlink {
                        target: target.into_owned(),
                    },
                    _ => {
                        return Err(InstallError::corrupt(format!(
                            "symlink {name} has no target"
                        )));
                    }
                }
            } else if entry_type.is_file() || entry_type.is_contiguous() {
                EntryKind::File
            } else {
                debug!("Skipping tar entry {name} of type {entry_type:?}");
                continue;
            };

            visit(ArchiveEntry {
                name,
                kind,
                mode,
                content: &mut entry,
            })?;
        }
        Ok(())
    }
}

/// Extract an archive stream of the given kind into `destination`
///
/// Returns the top-level paths created under `destination`. On failure the
/// entries written so far are left in place.
pub fn extract<R: Read + Seek>(
    reader: R,
    kind: ArchiveKind,
    destination: &Path,
) -> Result<BTreeSet<PathBuf>> {
    extract_cancellable(reader, kind, destination, &CancellationToken::new())
}

/// [`extract`], stopping with `Cancelled` at the next entry once `cancel` fires
pub fn extract_cancellable<R: Read + Seek>(
    reader: R,
    kind: ArchiveKind,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<BTreeSet<PathBuf>> {
    match kind {
        ArchiveKind::Zip => extract_entries(&mut ZipEntries::new(reader)?, destination, cancel),
        ArchiveKind::TarGz => {
            extract_entries(&mut TarGzEntries::new(reader), destination, cancel)
        }
    }
}

/// Extract an archive file on a blocking worker
///
/// The worker checks `cancel` between entries, so once this returns nothing
/// is left writing into `destination`.
pub async fn extract_archive_file(
    archive_path: &Path,
    kind: ArchiveKind,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<BTreeSet<PathBuf>> {
    let archive_path = archive_path.to_path_buf();
    let destination = destination.to_path_buf();
    let cancel = cancel.clone();

    tokio::task::spawn_blocking(move || {
        let file =
            fs::File::open(&archive_path).map_err(|e| InstallError::io(&archive_path, e))?;
        extract_cancellable(io::BufReader::new(file), kind, &destination, &cancel)
    })
    .await?
}

/// Write every entry of `source` below `destination`
///
/// Besides the name check, every write is checked against what is already on
/// disk: the nearest existing ancestor must resolve inside `destination`, and
/// a symlink target may not step back out through an extracted symlink.
pub fn extract_entries(
    source: &mut dyn EntrySource,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<BTreeSet<PathBuf>> {
    fs::create_dir_all(destination).map_err(|e| InstallError::io(destination, e))?;
    let root = fs::canonicalize(destination).map_err(|e| InstallError::io(destination, e))?;

    let mut top_level = BTreeSet::new();
    let mut written = 0usize;

    source.for_each_entry(&mut |entry| {
        if cancel.is_cancelled() {
            return Err(InstallError::Cancelled {
                stage: "extraction",
            });
        }

        let relative = sanitize_entry_path(&entry.name)?;
        let Some(first) = relative.components().next() else {
            debug!("Skipping archive root entry {:?}", entry.name);
            return Ok(());
        };
        let target = destination.join(&relative);
        let rejected = || InstallError::PathTraversalRejected {
            entry: entry.name.clone(),
        };

        if !parent_resolves_inside(&target, &root) {
            return Err(rejected());
        }

        match &entry.kind {
            EntryKind::Directory => {
                debug!("Creating directory {}", target.display());
                fs::create_dir_all(&target).map_err(|e| InstallError::io(&target, e))?;
            }
            EntryKind::File => {
                create_parent(&target)?;
                // replace a previously extracted link instead of writing through it
                remove_symlink(&target)?;
                let bytes = write_entry(entry.content, &target)?;
                debug!("Wrote {} ({bytes} bytes)", target.display());
                if let Some(mode) = entry.mode {
                    apply_mode(&target, mode)?;
                }
            }
            EntryKind::Symlink { target: link } => {
                if !link_stays_inside(destination, &relative, link) {
                    return Err(rejected());
                }
                create_parent(&target)?;
                create_symlink(link, &target)?;
            }
        }

        top_level.insert(destination.join(first));
        written += 1;
        Ok(())
    })?;

    info!(
        "Extracted {written} entries into {} ({} top-level)",
        destination.display(),
        top_level.len()
    );
    Ok(top_level)
}

/// Pick the runtime home out of the extracted top-level entries
///
/// JDK archives wrap everything in one versioned directory; when that is the
/// case it is the home, otherwise the extraction directory itself is.
pub fn runtime_home(top_level: &BTreeSet<PathBuf>, destination: &Path) -> PathBuf {
    match top_level.iter().next() {
        Some(only) if top_level.len() == 1 && only.is_dir() => only.clone(),
        _ => destination.to_path_buf(),
    }
}

/// Turn an archive entry name into a relative path that cannot leave the root
pub fn sanitize_entry_path(name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut relative = PathBuf::new();

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(InstallError::PathTraversalRejected {
                    entry: name.to_string(),
                });
            }
        }
    }
    Ok(relative)
}

/// Whether a symlink placed at `relative` pointing to `link` resolves inside the root
///
/// `..` is only followed lexically when the component it steps back over is
/// not itself a symlink on disk.
fn link_stays_inside(destination: &Path, relative: &Path, link: &Path) -> bool {
    let mut current = destination.join(relative);
    current.pop();
    let mut depth = relative.components().count().saturating_sub(1);

    for component in link.components() {
        match component {
            Component::Normal(part) => {
                current.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 || is_symlink(&current) {
                    return false;
                }
                current.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Whether the nearest existing ancestor of `target` resolves inside `root`
fn parent_resolves_inside(target: &Path, root: &Path) -> bool {
    let Some(existing) = target.ancestors().skip(1).find(|p| p.exists()) else {
        return false;
    };
    fs::canonicalize(existing).is_ok_and(|resolved| resolved.starts_with(root))
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_symlink())
}

fn remove_symlink(path: &Path) -> Result<()> {
    if is_symlink(path) {
        fs::remove_file(path).map_err(|e| InstallError::io(path, e))?;
    }
    Ok(())
}

fn create_parent(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| InstallError::io(parent, e))?;
    }
    Ok(())
}

/// Copy entry content to a fresh file; read errors mean a broken archive,
/// write errors are reported against the target path.
fn write_entry(content: &mut dyn Read, target: &Path) -> Result<u64> {
    let mut file = fs::File::create(target).map_err(|e| InstallError::io(target, e))?;
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = match content.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(InstallError::corrupt(format!(
                    "reading entry for {}: {e}",
                    target.display()
                )));
            }
        };
        file.write_all(&buffer[..n])
            .map_err(|e| InstallError::io(target, e))?;
        total += n as u64;
    }

    file.flush().map_err(|e| InstallError::io(target, e))?;
    Ok(total)
}

#[cfg(unix)]
fn apply_mode(target: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(target, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| InstallError::io(target, e))
}

#[cfg(not(unix))]
fn apply_mode(_target: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(link: &Path, target: &Path) -> Result<()> {
    if fs::symlink_metadata(target).is_ok() {
        fs::remove_file(target).map_err(|e| InstallError::io(target, e))?;
    }
    std::os::unix::fs::symlink(link, target).map_err(|e| InstallError::io(target, e))
}

#[cfg(not(unix))]
fn create_symlink(link: &Path, target: &Path) -> Result<()> {
    debug!(
        "Skipping symlink {} -> {} on this platform",
        target.display(),
        link.display()
    );
    Ok(())
}
