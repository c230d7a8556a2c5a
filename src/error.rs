//! Error types for the installation pipeline.
//!
//! Every stage reports failures through [`InstallError`]. All variants are
//! fatal to the pipeline; cleanup failures are the one exception and are
//! counted in [`crate::install::cleanup::CleanupSummary`] instead.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the installer library.
pub type Result<T, E = InstallError> = std::result::Result<T, E>;

/// Errors that can occur while provisioning the DChess bundle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstallError {
    /// The host OS is not one of the supported families.
    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },

    /// The install root cannot be used.
    #[error("Invalid install target {}: {reason}", path.display())]
    InvalidInstallTarget { path: PathBuf, reason: String },

    /// Fetching the runtime archive failed.
    #[error("Failed to download {url}: {message}")]
    DownloadFailure { url: String, message: String },

    /// The archive stream could not be decoded.
    #[error("Corrupt archive: {message}")]
    ArchiveCorrupt { message: String },

    /// An archive entry would have been written outside the destination.
    #[error("Archive entry {entry:?} escapes the extraction directory")]
    PathTraversalRejected { entry: String },

    /// Filesystem failure while writing pipeline output.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A bundled manifest entry has no backing content.
    #[error("Bundled resource not found: {name}")]
    ResourceNotFound { name: String },

    /// The descriptor could not be read or written.
    #[error("Descriptor I/O error at {}: {source}", path.display())]
    DescriptorIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The descriptor template is not a JSON object.
    #[error("Malformed descriptor {}: {message}", path.display())]
    MalformedDescriptor { path: PathBuf, message: String },

    /// The packaging tool could not be started.
    #[error("Failed to start packager {program}: {source}")]
    PackagerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The packaging tool exited unsuccessfully.
    #[error("Packager exited with {}", describe_exit(*code))]
    PackagerProcessFailure { code: Option<i32> },

    /// The packaging tool exceeded its time limit and was killed.
    #[error("Packager timed out after {duration:?}")]
    PackagerTimeout { duration: Duration },

    /// The packaging tool reported success without producing its output.
    #[error("Packager finished but output directory {} is missing", path.display())]
    PackagerOutputMissing { path: PathBuf },

    /// The run was cancelled by the user.
    #[error("Installation cancelled during {stage}")]
    Cancelled { stage: &'static str },

    /// A blocking worker task panicked or was aborted.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl InstallError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(message: impl std::fmt::Display) -> Self {
        Self::ArchiveCorrupt {
            message: message.to_string(),
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packager_failure_display() {
        let error = InstallError::PackagerProcessFailure { code: Some(2) };
        assert_eq!(error.to_string(), "Packager exited with code 2");

        let error = InstallError::PackagerProcessFailure { code: None };
        assert!(error.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_traversal_display_names_entry() {
        let error = InstallError::PathTraversalRejected {
            entry: "../evil".to_string(),
        };
        assert!(error.to_string().contains("../evil"));
    }

    #[test]
    fn test_io_keeps_source() {
        use std::error::Error as _;

        let error = InstallError::io(
            "/tmp/x/config.txt",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(error.to_string().contains("/tmp/x/config.txt"));
        assert!(error.source().is_some());
    }
}
