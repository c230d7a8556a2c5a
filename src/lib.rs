//! DChess installer library
//!
//! Builds a self-contained DChess bundle: downloads a JDK for the host,
//! stages the client resources, runs packr and cleans up after it. The
//! `dchess-install` binary is a thin wrapper around [`install::Installer`].

pub mod config;
pub mod error;
pub mod install;

pub use config::InstallerConfig;
pub use error::{InstallError, Result};
pub use install::Installer;
pub use install::context::InstallationContext;
