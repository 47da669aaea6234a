// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Config file parsing and data types.
//!
//! A config file is deserialized into flat raw mappings that mirror the
//! YAML keys. Each raw environment is then split into the venv builder
//! parameters and the provisioning steps by an explicit conversion, which
//! is also where the version bounds are parsed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::pth::DEFAULT_NEWLINE;
use crate::pyver::{PyVerComparison, VersionError, VersionInfo};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./spec_test.rs"]
mod spec_test;

/// Whether the environment links to or copies the interpreter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum SymlinkMode {
    Yes,
    No,
    /// Copies where possible, symlinks where the platform requires them.
    #[default]
    PlatformDefault,
}

impl From<Option<bool>> for SymlinkMode {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => Self::Yes,
            Some(false) => Self::No,
            None => Self::PlatformDefault,
        }
    }
}

impl From<SymlinkMode> for Option<bool> {
    fn from(mode: SymlinkMode) -> Self {
        match mode {
            SymlinkMode::Yes => Some(true),
            SymlinkMode::No => Some(false),
            SymlinkMode::PlatformDefault => None,
        }
    }
}

/// Parameters handed to `python -m venv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuilderParams {
    pub system_site_packages: bool,
    pub clear: bool,
    pub symlinks: SymlinkMode,
    pub upgrade: bool,
    pub with_pip: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Not supported before Python 3.9.
    pub upgrade_deps: bool,
}

impl Default for BuilderParams {
    fn default() -> Self {
        Self {
            system_site_packages: false,
            clear: false,
            symlinks: SymlinkMode::PlatformDefault,
            upgrade: false,
            with_pip: true,
            prompt: None,
            upgrade_deps: false,
        }
    }
}

/// Steps run in a freshly created environment.
///
/// Relative paths are interpreted relative to the directory containing the
/// config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provisioning {
    /// Install `wheel` before the requirements.
    pub wheel: bool,
    pub install_requirements: bool,
    /// Files passed to `pip install -r`. When unset, a `requirements.txt`
    /// next to the config file is used if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement_files: Option<Vec<String>>,
    /// Upgrade pip before anything else is installed.
    pub upgrade_pip: bool,
    /// Paths registered in the `.pth` file of the site-packages directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pth_paths: Option<Vec<String>>,
    /// Name of the `.pth` file, defaulting to `<directory>.pth`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pth_file: Option<String>,
    pub pth_newline: String,
    /// Append entries even if the `.pth` file already lists them.
    pub pth_ignore_existing_duplicates: bool,
    /// Fail instead of appending if the `.pth` file already exists.
    pub pth_lock_file_exclusive: bool,
}

impl Default for Provisioning {
    fn default() -> Self {
        Self {
            wheel: false,
            install_requirements: true,
            requirement_files: None,
            upgrade_pip: true,
            pth_paths: None,
            pth_file: None,
            pth_newline: default_newline(),
            pth_ignore_existing_duplicates: false,
            pth_lock_file_exclusive: true,
        }
    }
}

/// A single virtual environment to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentSpec {
    /// Where to create the environment.
    pub directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<PyVerComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_version: Option<PyVerComparison>,
    #[serde(flatten)]
    pub params: BuilderParams,
    #[serde(flatten)]
    pub provisioning: Provisioning,
}

impl EnvironmentSpec {
    /// An environment in `directory` with every option at its default.
    pub fn new<S: Into<String>>(directory: S) -> Self {
        Self {
            directory: directory.into(),
            min_version: None,
            max_version: None,
            params: BuilderParams::default(),
            provisioning: Provisioning::default(),
        }
    }

    /// Check both version bounds against the running version.
    pub fn is_pyversion_compatible(&self, current: &VersionInfo) -> bool {
        let min_ok = self
            .min_version
            .is_none_or(|bound| bound.applies_to_current_pyversion(current));
        let max_ok = self
            .max_version
            .is_none_or(|bound| bound.applies_to_current_pyversion(current));
        min_ok && max_ok
    }

    pub fn pth_file_name(&self) -> String {
        match &self.provisioning.pth_file {
            Some(name) => name.clone(),
            None => format!("{}.pth", self.directory),
        }
    }
}

/// The root of a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigRoot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<PyVerComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_version: Option<PyVerComparison>,
    pub venv_configs: Vec<EnvironmentSpec>,

    /// Path to the file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl ConfigRoot {
    /// Parse a config from a YAML string.
    pub fn from_yaml<S: Into<String>>(yaml: S) -> Result<Self> {
        let yaml = yaml.into();
        let raw: RawConfigRoot =
            serde_yaml::from_str(&yaml).map_err(|e| Error::InvalidYaml {
                error: e,
                yaml_content: yaml.clone(),
            })?;
        Self::try_from(raw)
    }

    /// Load a config from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| Error::ReadFailed {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut root = Self::from_yaml(yaml)?;
        root.source_path = Some(path.to_path_buf());
        tracing::debug!("The deserialized config root is {root:?}");
        Ok(root)
    }

    /// Fail with [`Error::PyVersion`] unless the running version lies
    /// within the bounds of this config file.
    pub fn ensure_pyversion_compatible(&self, current: &VersionInfo) -> Result<()> {
        if let Some(min) = &self.min_version {
            if !min.applies_to_current_pyversion(current) {
                return Err(Error::PyVersion(format!(
                    "The minimum required Python version for this configuration file is {min}; the current version is {current}."
                )));
            }
        }
        if let Some(max) = &self.max_version {
            if !max.applies_to_current_pyversion(current) {
                return Err(Error::PyVersion(format!(
                    "The maximum supported Python version for this configuration file is {max}; the current version is {current}."
                )));
            }
        }
        Ok(())
    }
}

/// Parse a YAML `min_version` value.
pub fn de_min_version(
    value: &serde_yaml::Value,
) -> std::result::Result<PyVerComparison, VersionError> {
    PyVerComparison::parse_min_version(version_text(value)?)
}

/// Parse a YAML `max_version` value.
pub fn de_max_version(
    value: &serde_yaml::Value,
) -> std::result::Result<PyVerComparison, VersionError> {
    PyVerComparison::parse_max_version(version_text(value)?)
}

/// Versions must be quoted; `3.10` as a YAML number would silently read as
/// `3.1`.
fn version_text(value: &serde_yaml::Value) -> std::result::Result<&str, VersionError> {
    use serde_yaml::Value;

    let found = match value {
        Value::String(text) => return Ok(text.as_str()),
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    };
    Err(VersionError::NotText {
        found: found.to_string(),
    })
}

fn parse_bounds(
    min_version: Option<serde_yaml::Value>,
    max_version: Option<serde_yaml::Value>,
) -> Result<(Option<PyVerComparison>, Option<PyVerComparison>)> {
    let min = min_version.as_ref().map(de_min_version).transpose()?;
    let max = max_version.as_ref().map(de_max_version).transpose()?;
    Ok((min, max))
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only a missing key is
/// `None`.
fn present_value<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<serde_yaml::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_yaml::Value::deserialize(deserializer).map(Some)
}

fn default_true() -> bool {
    true
}

fn default_newline() -> String {
    DEFAULT_NEWLINE.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfigRoot {
    #[serde(default, deserialize_with = "present_value")]
    min_version: Option<serde_yaml::Value>,
    #[serde(default, deserialize_with = "present_value")]
    max_version: Option<serde_yaml::Value>,
    #[serde(default)]
    venv_configs: Vec<RawEnvironment>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnvironment {
    directory: String,
    #[serde(default, deserialize_with = "present_value")]
    min_version: Option<serde_yaml::Value>,
    #[serde(default, deserialize_with = "present_value")]
    max_version: Option<serde_yaml::Value>,

    #[serde(default)]
    system_site_packages: bool,
    #[serde(default)]
    clear: bool,
    #[serde(default)]
    symlinks: SymlinkMode,
    #[serde(default)]
    upgrade: bool,
    #[serde(default = "default_true")]
    with_pip: bool,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    upgrade_deps: bool,

    #[serde(default)]
    wheel: bool,
    #[serde(default = "default_true")]
    install_requirements: bool,
    #[serde(default)]
    requirement_files: Option<Vec<String>>,
    #[serde(default = "default_true")]
    upgrade_pip: bool,
    #[serde(default)]
    pth_paths: Option<Vec<String>>,
    #[serde(default)]
    pth_file: Option<String>,
    #[serde(default = "default_newline")]
    pth_newline: String,
    #[serde(default)]
    pth_ignore_existing_duplicates: bool,
    #[serde(default = "default_true")]
    pth_lock_file_exclusive: bool,
}

impl TryFrom<RawConfigRoot> for ConfigRoot {
    type Error = Error;

    fn try_from(raw: RawConfigRoot) -> Result<Self> {
        let (min_version, max_version) = parse_bounds(raw.min_version, raw.max_version)?;
        let venv_configs = raw
            .venv_configs
            .into_iter()
            .map(EnvironmentSpec::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            min_version,
            max_version,
            venv_configs,
            source_path: None,
        })
    }
}

impl TryFrom<RawEnvironment> for EnvironmentSpec {
    type Error = Error;

    fn try_from(raw: RawEnvironment) -> Result<Self> {
        let (min_version, max_version) = parse_bounds(raw.min_version, raw.max_version)?;
        Ok(Self {
            directory: raw.directory,
            min_version,
            max_version,
            params: BuilderParams {
                system_site_packages: raw.system_site_packages,
                clear: raw.clear,
                symlinks: raw.symlinks,
                upgrade: raw.upgrade,
                with_pip: raw.with_pip,
                prompt: raw.prompt,
                upgrade_deps: raw.upgrade_deps,
            },
            provisioning: Provisioning {
                wheel: raw.wheel,
                install_requirements: raw.install_requirements,
                requirement_files: raw.requirement_files,
                upgrade_pip: raw.upgrade_pip,
                pth_paths: raw.pth_paths,
                pth_file: raw.pth_file,
                pth_newline: raw.pth_newline,
                pth_ignore_existing_duplicates: raw.pth_ignore_existing_duplicates,
                pth_lock_file_exclusive: raw.pth_lock_file_exclusive,
            },
        })
    }
}
