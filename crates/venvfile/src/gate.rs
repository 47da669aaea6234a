// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Version gating of config files and the environments they declare.

use crate::pyver::VersionInfo;
use crate::spec::{ConfigRoot, EnvironmentSpec};
use crate::Result;

#[cfg(test)]
#[path = "./gate_test.rs"]
mod gate_test;

/// The gating decision for one declared environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gated<'a> {
    /// Compatible with the running version.
    Build {
        index: usize,
        spec: &'a EnvironmentSpec,
    },
    /// Outside its version bounds; left alone.
    Skip {
        index: usize,
        spec: &'a EnvironmentSpec,
    },
}

impl<'a> Gated<'a> {
    /// Position of the environment in `venv_configs`.
    pub fn index(&self) -> usize {
        match self {
            Self::Build { index, .. } | Self::Skip { index, .. } => *index,
        }
    }

    pub fn spec(&self) -> &'a EnvironmentSpec {
        match self {
            Self::Build { spec, .. } | Self::Skip { spec, .. } => spec,
        }
    }

    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build { .. })
    }
}

/// Decide which environments of `root` to build for `current`.
///
/// The bounds of the config file are checked first, failing with
/// [`crate::Error::PyVersion`]. Each environment is then judged on its own,
/// in declaration order; an incompatible one never stops later ones.
pub fn select_compatible<'a>(
    root: &'a ConfigRoot,
    current: &VersionInfo,
) -> Result<Vec<Gated<'a>>> {
    root.ensure_pyversion_compatible(current)?;

    let gated = root
        .venv_configs
        .iter()
        .enumerate()
        .map(|(index, spec)| {
            if spec.is_pyversion_compatible(current) {
                Gated::Build { index, spec }
            } else {
                tracing::info!(
                    "The environment at index {index} with directory {:?} is incompatible with the current Python version ({current}) and will be skipped.",
                    spec.directory
                );
                Gated::Skip { index, spec }
            }
        })
        .collect();
    Ok(gated)
}
