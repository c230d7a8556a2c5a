//! packr descriptor generation
//!
//! The descriptor starts out as the bundled `options.json` template. The
//! installer fills in the fields that depend on this host and run, leaves
//! every other template field untouched, and writes it back in place.

use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use super::manifest::PACKAGER_ARTIFACT;
use crate::error::{InstallError, Result};

/// Run-specific values written into the descriptor
#[derive(Debug, Clone, Copy)]
pub struct DescriptorInputs<'a> {
    pub platform_tag: &'a str,
    pub runtime_dir: &'a Path,
    pub executable: &'a str,
    /// Staged jars; packr's own jar is filtered out of the classpath
    pub libraries: &'a [PathBuf],
    pub resources: &'a [PathBuf],
    pub output_dir: &'a Path,
}

#[derive(Serialize)]
struct PackagerFields<'a> {
    platform: &'a str,
    jdk: &'a Path,
    executable: &'a str,
    classpath: Vec<&'a Path>,
    resources: &'a [PathBuf],
    output: &'a Path,
}

impl<'a> PackagerFields<'a> {
    fn from_inputs(inputs: &DescriptorInputs<'a>) -> Self {
        let classpath = inputs
            .libraries
            .iter()
            .filter(|jar| jar.file_name() != Some(OsStr::new(PACKAGER_ARTIFACT)))
            .map(PathBuf::as_path)
            .collect();

        Self {
            platform: inputs.platform_tag,
            jdk: inputs.runtime_dir,
            executable: inputs.executable,
            classpath,
            resources: inputs.resources,
            output: inputs.output_dir,
        }
    }
}

/// A loaded descriptor document
#[derive(Debug, Clone)]
pub struct Descriptor {
    path: PathBuf,
    document: Map<String, Value>,
}

impl Descriptor {
    /// Parse the template at `path`; the root must be a JSON object
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| InstallError::DescriptorIo {
            path: path.to_path_buf(),
            source,
        })?;

        let malformed = |message: String| InstallError::MalformedDescriptor {
            path: path.to_path_buf(),
            message,
        };

        match serde_json::from_str::<Value>(&raw).map_err(|e| malformed(e.to_string()))? {
            Value::Object(document) => Ok(Self {
                path: path.to_path_buf(),
                document,
            }),
            other => Err(malformed(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
        }
    }

    /// Overwrite the run-specific fields
    pub fn apply(&mut self, inputs: &DescriptorInputs<'_>) -> Result<()> {
        let fields = serde_json::to_value(PackagerFields::from_inputs(inputs)).map_err(|e| {
            InstallError::MalformedDescriptor {
                path: self.path.clone(),
                message: e.to_string(),
            }
        })?;

        if let Value::Object(fields) = fields {
            for (key, value) in fields {
                self.document.insert(key, value);
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the document back to where it was loaded from
    pub fn save(&self) -> Result<()> {
        let io_error = |source| InstallError::DescriptorIo {
            path: self.path.clone(),
            source,
        };

        let dir = self.path.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_error)?;
        serde_json::to_writer(&mut tmp, &self.document).map_err(|e| io_error(e.into()))?;
        tmp.flush().map_err(io_error)?;
        tmp.persist(&self.path).map_err(|e| io_error(e.error))?;
        Ok(())
    }
}

/// Fill the template at `template` for this run and persist it in place
pub fn build(template: &Path, inputs: &DescriptorInputs<'_>) -> Result<PathBuf> {
    let mut descriptor = Descriptor::load(template)?;
    descriptor.apply(inputs)?;
    descriptor.save()?;

    debug!("Descriptor: {}", Value::Object(descriptor.document.clone()));
    info!("Wrote packr descriptor {}", template.display());
    Ok(descriptor.path)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
