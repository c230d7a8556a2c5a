//! Run report for one installation

use std::path::PathBuf;

use super::cleanup::CleanupSummary;
use super::download::PlatformProfile;
use super::staging::StagedResources;

/// Everything an installation run produced, filled in stage order
///
/// A field is `None` until its stage has completed; nothing is ever cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationContext {
    pub root: PathBuf,
    pub profile: PlatformProfile,
    /// Where the runtime archive was saved; deleted again after extraction
    pub archive_path: Option<PathBuf>,
    pub extracted_runtime_dir: Option<PathBuf>,
    pub staged: Option<StagedResources>,
    pub descriptor_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub cleanup: Option<CleanupSummary>,
}

impl InstallationContext {
    pub fn new(root: PathBuf, profile: PlatformProfile) -> Self {
        Self {
            root,
            profile,
            archive_path: None,
            extracted_runtime_dir: None,
            staged: None,
            descriptor_path: None,
            output_dir: None,
            cleanup: None,
        }
    }

    /// Name of the last stage that completed
    pub fn last_stage(&self) -> &'static str {
        if self.cleanup.is_some() {
            "cleanup"
        } else if self.output_dir.is_some() {
            "packaging"
        } else if self.descriptor_path.is_some() {
            "descriptor"
        } else if self.staged.is_some() {
            "staging"
        } else if self.extracted_runtime_dir.is_some() {
            "extraction"
        } else if self.archive_path.is_some() {
            "download"
        } else {
            "setup"
        }
    }
}
