// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! venvfile - Declarative Python Virtual Environments
//!
//! This crate provides the core library for building Python virtual
//! environments from YAML config files.
//!
//! # Overview
//!
//! A config file declares any number of environments. Each one is created
//! with the `venv` module of a bootstrap interpreter and then provisioned:
//! pip is upgraded, `wheel` and requirement files are installed, and extra
//! import paths are registered in a `.pth` file. Config files and single
//! environments may be restricted to a range of Python versions; anything
//! outside the range is skipped.
//!
//! # Example
//!
//! ```yaml
//! # Only used with Python 3.8 up to, but excluding, 3.14
//! min_version: "3.8"
//! max_version: "3.14"
//!
//! venv_configs:
//!   - directory: venv
//!     requirement_files: [requirements.txt, dev-requirements.txt]
//!     # Relative to this file, written relative to site-packages
//!     pth_paths: [src]
//!   - directory: venv-legacy
//!     max_version: "<=3.9"
//! ```

pub mod builder;
pub mod error;
pub mod gate;
pub mod interpreter;
pub mod orchestrate;
pub mod path_util;
pub mod pth;
pub mod pyver;
pub mod spec;

pub use builder::{EnvBuilder, EnvContext};
pub use error::{Error, Result};
pub use gate::{select_compatible, Gated};
pub use interpreter::Interpreter;
pub use orchestrate::{
    build_from_files, plan_from_files, BuildReport, PlannedEnvironment, PlannedFile,
    SkippedEnvironment,
};
pub use pth::PthMerger;
pub use pyver::{ComparisonOperator, PyVerComparison, ReleaseLevel, VersionError, VersionInfo};
pub use spec::{BuilderParams, ConfigRoot, EnvironmentSpec, Provisioning, SymlinkMode};

/// Requirements file installed when an environment lists none.
pub const REQUIREMENTS_TXT: &str = "requirements.txt";
