//! DChess installation pipeline
//!
//! Provisions a self-contained DChess bundle into an install root: fetch a
//! JDK for the host, stage the game's resources next to it, describe the
//! bundle for packr, run packr, and leave only its output behind.
//!
//! ## Module Organization
//!
//! - `directory` - Install root validation
//! - `download` - Platform profiles, runtime download and extraction
//! - `manifest` - Fixed lists of bundled resources
//! - `staging` - Copying bundled resources into the root
//! - `descriptor` - packr descriptor generation
//! - `packager` - Running packr as a subprocess
//! - `cleanup` - Removing everything but the packaged output
//! - `context` - Per-run report

pub mod cleanup;
pub mod context;
pub mod descriptor;
pub mod directory;
pub mod download;
pub mod manifest;
pub mod packager;
pub mod staging;

use std::future::Future;
use std::path::{Component, Path, PathBuf};

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::{InstallError, Result};
use context::InstallationContext;
use descriptor::DescriptorInputs;
use download::{ArchiveFetcher, PlatformProfile};
use manifest::{DESCRIPTOR_FILE, EXECUTABLE_NAME};
use packager::{PackagerCommand, PackagerLimits};
use staging::ResourceBundle;

/// Runtime archive name, without extension
pub const ARCHIVE_STEM: &str = "runtime-archive";

/// Directory the runtime archive is unpacked into
pub const RUNTIME_DIR: &str = "runtime";

/// Default name of the packr output directory, the only thing left afterwards
pub const OUTPUT_DIR: &str = "dchess";

/// One configured installation run
pub struct Installer<F> {
    root: PathBuf,
    profile: PlatformProfile,
    fetcher: F,
    resources: ResourceBundle,
    packager: PackagerCommand,
    limits: PackagerLimits,
    output_dir_name: String,
    cancel: CancellationToken,
}

impl<F: ArchiveFetcher> Installer<F> {
    pub fn new(
        root: impl Into<PathBuf>,
        profile: PlatformProfile,
        fetcher: F,
        resources: ResourceBundle,
    ) -> Self {
        Self {
            root: root.into(),
            profile,
            fetcher,
            resources,
            packager: PackagerCommand::default(),
            limits: PackagerLimits::default(),
            output_dir_name: OUTPUT_DIR.to_string(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_packager(mut self, packager: PackagerCommand) -> Self {
        self.packager = packager;
        self
    }

    pub fn with_limits(mut self, limits: PackagerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Name of the packr output directory under the root
    ///
    /// Must be a single plain directory name; [`run`](Self::run) rejects
    /// anything else before touching the root.
    pub fn with_output_dir_name(mut self, name: impl Into<String>) -> Self {
        self.output_dir_name = name.into();
        self
    }

    /// Abort the download, extraction or packr run when `cancel` fires
    ///
    /// Extraction stops at the next archive entry and packr is killed, so no
    /// stage keeps writing into the root after `run` has returned.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn archive_file_name(&self) -> String {
        format!("{ARCHIVE_STEM}.{}", self.profile.archive_kind.extension())
    }

    /// Run every stage in order
    ///
    /// Stops at the first failure and leaves the root as it was at that
    /// point. A packr failure in particular skips cleanup so the staged
    /// workspace can be inspected.
    pub async fn run(mut self) -> Result<InstallationContext> {
        validate_output_dir_name(&self.output_dir_name).map_err(|reason| {
            InstallError::InvalidInstallTarget {
                path: self.root.join(&self.output_dir_name),
                reason,
            }
        })?;
        let root = directory::ensure(&self.root)?;
        let mut ctx = InstallationContext::new(root.clone(), self.profile.clone());

        // Download
        let archive = root.join(self.archive_file_name());
        self.cancellable("download", self.fetcher.fetch(&self.profile.download_url, &archive))
            .await?;
        ctx.archive_path = Some(archive.clone());

        // Extract
        let extract_dir = root.join(RUNTIME_DIR);
        let top_level = download::extract_archive_file(
            &archive,
            self.profile.archive_kind,
            &extract_dir,
            &self.cancel,
        )
        .await?;
        let runtime_dir = download::runtime_home(&top_level, &extract_dir);
        info!("Runtime unpacked at {}", runtime_dir.display());
        ctx.extracted_runtime_dir = Some(runtime_dir.clone());
        remove_archive(&archive).await;

        // Stage and describe
        self.check_cancelled("staging")?;
        let output_dir = root.join(&self.output_dir_name);
        let (staged, descriptor_path) = {
            let resources = std::mem::take(&mut self.resources);
            let root = root.clone();
            let output_dir = output_dir.clone();
            let platform_tag = self.profile.platform_tag.clone();

            tokio::task::spawn_blocking(move || {
                let staged = staging::stage(&resources, &root)?;

                // packr expects its output directory to exist
                std::fs::create_dir_all(&output_dir)
                    .map_err(|e| InstallError::io(&output_dir, e))?;

                let inputs = DescriptorInputs {
                    platform_tag: &platform_tag,
                    runtime_dir: &runtime_dir,
                    executable: EXECUTABLE_NAME,
                    libraries: &staged.libraries,
                    resources: &staged.top_level,
                    output_dir: &output_dir,
                };
                let descriptor_path = descriptor::build(&root.join(DESCRIPTOR_FILE), &inputs)?;
                Ok::<_, InstallError>((staged, descriptor_path))
            })
            .await??
        };
        ctx.staged = Some(staged);
        ctx.descriptor_path = Some(descriptor_path.clone());

        // Package
        let status =
            packager::invoke(&self.packager, &descriptor_path, &root, self.limits, &self.cancel)
                .await?;
        if !status.success() {
            return Err(InstallError::PackagerProcessFailure {
                code: status.code(),
            });
        }
        if !output_dir.is_dir() {
            return Err(InstallError::PackagerOutputMissing { path: output_dir });
        }
        ctx.output_dir = Some(output_dir.clone());

        // Clean
        let summary = {
            let root = root.clone();
            let output_dir = output_dir.clone();
            tokio::task::spawn_blocking(move || cleanup::clean(&root, &output_dir)).await?
        };
        if !summary.is_clean() {
            warn!("{} entries could not be removed from {}", summary.failed, root.display());
        }
        ctx.cleanup = Some(summary);

        info!("DChess installed to {}", output_dir.display());
        Ok(ctx)
    }

    async fn cancellable<T>(
        &self,
        stage: &'static str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            result = work => result,
            _ = self.cancel.cancelled() => Err(InstallError::Cancelled { stage }),
        }
    }

    fn check_cancelled(&self, stage: &'static str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(InstallError::Cancelled { stage });
        }
        Ok(())
    }
}

impl<F> std::fmt::Debug for Installer<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installer")
            .field("root", &self.root)
            .field("profile", &self.profile)
            .field("resources", &self.resources)
            .field("packager", &self.packager)
            .field("limits", &self.limits)
            .field("output_dir_name", &self.output_dir_name)
            .finish_non_exhaustive()
    }
}

/// Check that `name` is one plain directory name, so cleanup keeps exactly
/// that child of the root
pub fn validate_output_dir_name(name: &str) -> std::result::Result<(), String> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(format!(
            "output directory name must be a single directory name, got {name:?}"
        )),
    }
}

async fn remove_archive(archive: &Path) {
    match tokio::fs::remove_file(archive).await {
        Ok(()) => info!("Removed runtime archive {}", archive.display()),
        Err(e) => warn!("Failed to remove runtime archive {}: {e}", archive.display()),
    }
}
