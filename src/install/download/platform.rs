//! Platform detection for runtime archive selection

use once_cell::sync::OnceCell;
use log::debug;

use crate::error::{InstallError, Result};

/// Archive container format of a runtime download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// File extension used when saving the download
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::TarGz => "tar.gz",
        }
    }
}

/// Where to fetch the runtime for one OS family and how packr names it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformProfile {
    pub download_url: String,
    pub archive_kind: ArchiveKind,
    pub platform_tag: String,
}

impl PlatformProfile {
    pub fn new(
        download_url: impl Into<String>,
        archive_kind: ArchiveKind,
        platform_tag: impl Into<String>,
    ) -> Self {
        Self {
            download_url: download_url.into(),
            archive_kind,
            platform_tag: platform_tag.into(),
        }
    }

    /// Same profile, fetched from a mirror
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = url.into();
        self
    }
}

/// Supported host OS families (all 64-bit, Amazon Corretto 8 builds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    Mac,
}

/// Global cache for platform detection (initialized once, used everywhere)
static PLATFORM_CACHE: OnceCell<Platform> = OnceCell::new();

impl Platform {
    /// Detect current platform (cached after first call)
    pub fn detect() -> Result<Self> {
        PLATFORM_CACHE
            .get_or_try_init(|| Self::from_os(std::env::consts::OS))
            .copied()
    }

    /// Map an OS classification (as in `std::env::consts::OS`) to a platform
    pub fn from_os(os: &str) -> Result<Self> {
        let platform = match os {
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            "macos" => Platform::Mac,
            other => {
                return Err(InstallError::UnsupportedPlatform {
                    os: other.to_string(),
                });
            }
        };
        debug!("Resolved OS {os:?} to {platform:?}");
        Ok(platform)
    }

    /// Runtime download profile for this platform
    pub fn profile(&self) -> PlatformProfile {
        match self {
            Platform::Linux => PlatformProfile::new(
                "https://corretto.aws/downloads/latest/amazon-corretto-8-x64-linux-jdk.tar.gz",
                ArchiveKind::TarGz,
                "linux64",
            ),
            Platform::Windows => PlatformProfile::new(
                "https://corretto.aws/downloads/latest/amazon-corretto-8-x64-windows-jdk.zip",
                ArchiveKind::Zip,
                "windows64",
            ),
            Platform::Mac => PlatformProfile::new(
                "https://corretto.aws/downloads/latest/amazon-corretto-8-x64-macos-jdk.tar.gz",
                ArchiveKind::TarGz,
                "mac",
            ),
        }
    }
}

/// Resolve the host platform straight to its profile
pub fn resolve() -> Result<PlatformProfile> {
    Platform::detect().map(|p| p.profile())
}
