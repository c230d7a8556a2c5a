//! Runtime download and archive extraction
//!
//! This module handles picking the JDK build for the host, downloading it and
//! unpacking it into the install root.
//!
//! ## Module Organization
//!
//! - `platform` - Host OS detection and runtime profile selection
//! - `core` - Streaming HTTP download with progress tracking
//! - `extract` - Zip and tar.gz extraction behind one entry interface

pub mod core;
pub mod extract;
pub mod platform;

// Re-export public API
pub use self::core::{ArchiveFetcher, HttpFetcher};
pub use extract::{ArchiveEntry, EntryKind, EntrySource, extract, extract_archive_file, runtime_home};
pub use platform::{ArchiveKind, Platform, PlatformProfile, resolve};
