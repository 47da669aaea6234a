// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Processing of one or more config files in a single run.

use std::path::{Path, PathBuf};

use crate::builder::{EnvBuilder, EnvContext};
use crate::gate::{select_compatible, Gated};
use crate::interpreter::{describe, Interpreter};
use crate::pyver::VersionInfo;
use crate::spec::{ConfigRoot, EnvironmentSpec};
use crate::{path_util, Error, Result};

#[cfg(test)]
#[path = "./orchestrate_test.rs"]
mod orchestrate_test;

/// An environment left alone because of its version bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEnvironment {
    pub conf_path: PathBuf,
    pub index: usize,
    pub directory: String,
}

/// The outcome of [`build_from_files`].
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Environments that were created, in build order.
    pub built: Vec<EnvContext>,
    /// Config files whose own version bounds excluded the interpreter.
    pub skipped_files: Vec<PathBuf>,
    pub skipped_environments: Vec<SkippedEnvironment>,
}

/// What a run would do with one declared environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEnvironment {
    pub index: usize,
    pub directory: String,
    /// Absolute location of the environment.
    pub env_dir: PathBuf,
    /// The command creating the environment, or `None` if it is skipped.
    pub command: Option<String>,
}

/// What a run would do with one config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedFile {
    /// The file's bounds exclude the interpreter.
    Skipped { path: PathBuf, reason: String },
    Load {
        path: PathBuf,
        environments: Vec<PlannedEnvironment>,
    },
}

/// Build every compatible environment declared in `paths`, in order.
///
/// A config file whose version bounds exclude the interpreter is skipped
/// with a warning; every other error aborts the run.
pub fn build_from_files<P: AsRef<Path>>(
    paths: &[P],
    interpreter: &Interpreter,
) -> Result<BuildReport> {
    let mut report = BuildReport::default();

    for path in paths {
        let (path, root) = load_config(path.as_ref())?;
        let Some(gated) = gate_file(&root, interpreter.version())? else {
            report.skipped_files.push(path);
            continue;
        };

        for entry in gated {
            match entry {
                Gated::Build { spec, .. } => {
                    let context = build_environment(&path, spec, interpreter)?;
                    report.built.push(context);
                }
                Gated::Skip { index, spec } => {
                    report.skipped_environments.push(SkippedEnvironment {
                        conf_path: path.clone(),
                        index,
                        directory: spec.directory.clone(),
                    });
                }
            }
        }
    }

    let built = report.built.len();
    match built {
        0 => tracing::warn!("No virtual environments have been set up."),
        1 => tracing::info!("1 compatible virtual environment has been set up."),
        n => tracing::info!("{n} compatible virtual environments have been set up."),
    }
    Ok(report)
}

/// Run the loading and gating of [`build_from_files`] without creating
/// anything.
///
/// Builders are still prepared for compatible environments, so settings
/// the interpreter cannot honor fail here as they would in a real run.
/// Unlike a real run, a file-level version mismatch is reported in the plan
/// instead of being logged.
pub fn plan_from_files<P: AsRef<Path>>(
    paths: &[P],
    interpreter: &Interpreter,
) -> Result<Vec<PlannedFile>> {
    let mut planned = Vec::with_capacity(paths.len());

    for path in paths {
        let (path, root) = load_config(path.as_ref())?;
        let gated = match select_compatible(&root, interpreter.version()) {
            Ok(gated) => gated,
            Err(Error::PyVersion(reason)) => {
                planned.push(PlannedFile::Skipped { path, reason });
                continue;
            }
            Err(err) => return Err(err),
        };

        let conf_dir = path.parent().unwrap_or(Path::new(""));
        let environments = gated
            .into_iter()
            .map(|entry| {
                let spec = entry.spec();
                let env_dir = path_util::resolve_rel_path(conf_dir, Path::new(&spec.directory));
                let command = match entry {
                    Gated::Build { .. } => {
                        let builder = EnvBuilder::new(&path, spec, interpreter)?;
                        Some(describe(&builder.venv_command(&env_dir)))
                    }
                    Gated::Skip { .. } => None,
                };
                Ok(PlannedEnvironment {
                    index: entry.index(),
                    directory: spec.directory.clone(),
                    env_dir,
                    command,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        planned.push(PlannedFile::Load { path, environments });
    }

    Ok(planned)
}

fn load_config(path: &Path) -> Result<(PathBuf, ConfigRoot)> {
    let path = std::path::absolute(path).map_err(|error| Error::PathResolution {
        path: path.to_path_buf(),
        error,
    })?;
    tracing::info!("Loading configuration file {path:?}.");
    let root = ConfigRoot::load(&path)?;
    Ok((path, root))
}

/// Gate a loaded config, turning a file-level version mismatch into a skip.
fn gate_file<'a>(
    root: &'a ConfigRoot,
    current: &VersionInfo,
) -> Result<Option<Vec<Gated<'a>>>> {
    match select_compatible(root, current) {
        Ok(gated) => Ok(Some(gated)),
        Err(Error::PyVersion(reason)) => {
            tracing::warn!("{reason}");
            tracing::warn!("Skipping this config file.");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn build_environment(
    conf_path: &Path,
    spec: &EnvironmentSpec,
    interpreter: &Interpreter,
) -> Result<EnvContext> {
    tracing::info!("Building environment {:?}.", spec.directory);
    tracing::debug!("Building from config {spec:?}.");
    let builder = EnvBuilder::new(conf_path, spec, interpreter)?;
    builder.create(&spec.directory)
}
