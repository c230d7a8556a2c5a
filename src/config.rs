use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, ensure};
use log::info;
use serde::{Deserialize, Serialize};

use crate::install::{OUTPUT_DIR, validate_output_dir_name};
use crate::install::download::core::{DOWNLOAD_CONNECT_TIMEOUT, DOWNLOAD_INACTIVITY_TIMEOUT};
use crate::install::packager::{DEFAULT_PACKAGER_TIMEOUT, PackagerCommand, PackagerLimits};

/// Names a TOML file to load instead of the defaults
pub const CONFIG_ENV: &str = "DCHESS_INSTALLER_CONFIG";
pub const RESOURCES_DIR_ENV: &str = "DCHESS_RESOURCES_DIR";
pub const RUNTIME_URL_ENV: &str = "DCHESS_RUNTIME_URL";
/// Seconds; `0` disables the limit
pub const PACKAGER_TIMEOUT_ENV: &str = "DCHESS_PACKAGER_TIMEOUT";

/// Installer settings (defaults match a stock DChess bundle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Root of the bundled resources, one subdirectory per manifest
    pub resources_dir: PathBuf,
    /// Mirror for the runtime archive; the platform's default when unset
    pub runtime_url: Option<String>,
    /// packr invocation; the descriptor file name is appended
    pub packager_command: Vec<String>,
    /// `0` waits forever
    pub packager_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub output_dir_name: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        let packager = PackagerCommand::default();
        Self {
            resources_dir: PathBuf::from("resources"),
            runtime_url: None,
            packager_command: std::iter::once(packager.program).chain(packager.args).collect(),
            packager_timeout_secs: DEFAULT_PACKAGER_TIMEOUT.as_secs(),
            connect_timeout_secs: DOWNLOAD_CONNECT_TIMEOUT.as_secs(),
            inactivity_timeout_secs: DOWNLOAD_INACTIVITY_TIMEOUT.as_secs(),
            output_dir_name: OUTPUT_DIR.to_string(),
        }
    }
}

impl InstallerConfig {
    /// Defaults, or the file named by `DCHESS_INSTALLER_CONFIG`, then env overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Using config from: {}", path.display());
        Ok(config)
    }

    /// Apply `DCHESS_*` overrides read through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup(RESOURCES_DIR_ENV) {
            self.resources_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(RUNTIME_URL_ENV) {
            self.runtime_url = Some(url);
        }
        if let Some(secs) = lookup(PACKAGER_TIMEOUT_ENV) {
            self.packager_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{PACKAGER_TIMEOUT_ENV} must be whole seconds, got {secs:?}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.packager_command.is_empty(), "packager_command must not be empty");

        validate_output_dir_name(&self.output_dir_name)
            .map_err(|reason| anyhow!("output_dir_name: {reason}"))
    }

    pub fn packager_command(&self) -> Result<PackagerCommand> {
        PackagerCommand::from_argv(&self.packager_command)
            .context("packager_command must not be empty")
    }

    pub fn packager_limits(&self) -> PackagerLimits {
        match self.packager_timeout_secs {
            0 => PackagerLimits::unbounded(),
            secs => PackagerLimits {
                timeout: Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = InstallerConfig::default();
        assert_eq!(config.packager_command, vec!["java", "-jar", "packr.jar"]);
        assert_eq!(config.output_dir_name, "dchess");
        assert_eq!(config.packager_limits().timeout, Some(Duration::from_secs(1800)));
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("installer.toml");
        fs::write(
            &path,
            r#"
resources_dir = "/opt/dchess/resources"
packager_command = ["/usr/bin/java", "-Xmx512m", "-jar", "packr.jar"]
"#,
        )
        .unwrap();

        let config = InstallerConfig::from_file(&path).unwrap();
        assert_eq!(config.resources_dir, PathBuf::from("/opt/dchess/resources"));
        assert_eq!(config.packager_command().unwrap().program, "/usr/bin/java");
        assert_eq!(config.output_dir_name, "dchess");
        assert_eq!(config.inactivity_timeout_secs, 300);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("installer.toml");
        fs::write(&path, "packager_timeout_secs = \"soon\"").unwrap();

        let err = InstallerConfig::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config file"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = InstallerConfig::default();
        config
            .apply_overrides(lookup(&[
                (RESOURCES_DIR_ENV, "/srv/res"),
                (RUNTIME_URL_ENV, "http://mirror.local/jdk.tar.gz"),
                (PACKAGER_TIMEOUT_ENV, "0"),
            ]))
            .unwrap();

        assert_eq!(config.resources_dir, PathBuf::from("/srv/res"));
        assert_eq!(config.runtime_url.as_deref(), Some("http://mirror.local/jdk.tar.gz"));
        assert_eq!(config.packager_limits(), PackagerLimits::unbounded());
    }

    #[test]
    fn test_bad_timeout_override() {
        let mut config = InstallerConfig::default();
        assert!(
            config
                .apply_overrides(lookup(&[(PACKAGER_TIMEOUT_ENV, "ten")]))
                .is_err()
        );
    }

    #[test]
    fn test_output_dir_name_validation() {
        for bad in ["", "..", "a/b", "/abs"] {
            let config = InstallerConfig {
                output_dir_name: bad.to_string(),
                ..InstallerConfig::default()
            };
            assert!(config.validate().is_err(), "{bad:?} accepted");
        }

        let empty_command = InstallerConfig {
            packager_command: vec![],
            ..InstallerConfig::default()
        };
        assert!(empty_command.validate().is_err());
    }
}
