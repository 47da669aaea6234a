// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for venvfile operations.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::pyver::VersionError;

/// Convenience Result type with venvfile Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during venvfile operations.
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Invalid YAML in config file
    #[error("Invalid config file: {error}")]
    #[diagnostic(
        code(venvfile::invalid_yaml),
        help("Check the YAML syntax and that every key is a known config field")
    )]
    InvalidYaml {
        #[source]
        error: serde_yaml::Error,
        yaml_content: String,
    },

    /// Failed to read file
    #[error("Failed to read file: {path:?}")]
    #[diagnostic(code(venvfile::read_failed))]
    ReadFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Malformed version literal
    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidVersion(#[from] VersionError),

    /// The config (or one of its environments) does not support the
    /// interpreter's version
    #[error("{0}")]
    #[diagnostic(code(venvfile::python_version))]
    PyVersion(String),

    /// A build parameter was requested that the interpreter cannot honor
    #[error("{0}")]
    #[diagnostic(code(venvfile::unsupported_argument))]
    UnsupportedArgument(String),

    /// Symlinks were disabled, but the platform requires them
    #[error(
        "This version of Python does not support creating virtual environments without using symlinks."
    )]
    #[diagnostic(
        code(venvfile::use_symlinks),
        help("Remove 'symlinks: false' from the config or set it to true")
    )]
    UseSymlinks,

    /// A requirements file listed in the config is missing
    #[error("The requirements file {0:?} was not found.")]
    #[diagnostic(code(venvfile::requirements_not_found))]
    RequirementsNotFound(PathBuf),

    /// No bootstrap interpreter could be located
    #[error("Python not found in PATH (tried: {0})")]
    #[diagnostic(
        code(venvfile::interpreter_not_found),
        help("Install Python or point --python / VENVFILE_PYTHON at an interpreter")
    )]
    InterpreterNotFound(String),

    /// The interpreter produced output we could not understand
    #[error("Failed to probe the Python interpreter: {0}")]
    #[diagnostic(code(venvfile::probe_failed))]
    ProbeFailed(String),

    /// A subprocess could not be started or exited unsuccessfully
    #[error("Command {command} failed: {status}")]
    #[diagnostic(code(venvfile::command_failed))]
    CommandFailed { command: String, status: String },

    /// The site-packages directory of a new environment is unknown
    #[error("Cannot determine site packages directory: {0}")]
    #[diagnostic(code(venvfile::site_dir))]
    SiteDirUnresolved(String),

    /// The `.pth` file could not be opened or updated
    #[error("Failed to update .pth file {path:?}")]
    #[diagnostic(
        code(venvfile::pth_file),
        help("Set 'pth_lock_file_exclusive: false' to append to an existing .pth file")
    )]
    PthFileFailed {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// A path could not be made absolute
    #[error("Failed to resolve path {path:?}")]
    #[diagnostic(code(venvfile::path_resolution))]
    PathResolution {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// IO error passthrough
    #[error(transparent)]
    #[diagnostic(code(venvfile::io_error))]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is an anticipated failure that is reported without
    /// further diagnostics, as opposed to an unexpected one.
    pub fn is_known(&self) -> bool {
        matches!(
            self,
            Self::InvalidYaml { .. }
                | Self::InvalidVersion(_)
                | Self::PyVersion(_)
                | Self::UnsupportedArgument(_)
                | Self::UseSymlinks
                | Self::RequirementsNotFound(_)
        )
    }
}
