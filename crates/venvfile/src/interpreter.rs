// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! The bootstrap Python interpreter that creates the environments.
//!
//! Its `sys.version_info` is the version that config files and
//! environments are gated against.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use crate::pyver::{ReleaseLevel, VersionInfo};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./interpreter_test.rs"]
mod interpreter_test;

#[cfg(target_os = "windows")]
const PYTHON_CANDIDATES: &[&str] = &["python"];

#[cfg(not(target_os = "windows"))]
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

/// Prints the facts we need about the interpreter as a single JSON object.
const PROBE_SCRIPT: &str = "\
import json, sys, venv
required = getattr(venv, 'should_use_symlinks', None)
print(json.dumps({
    'version_info': list(sys.version_info),
    'symlinks_required': bool(required(None)) if required else False,
}))
";

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    version_info: (u32, u32, u32, String, u32),
    symlinks_required: bool,
}

/// A Python interpreter and what it reported about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    executable: PathBuf,
    version: VersionInfo,
    symlinks_required: bool,
}

impl Interpreter {
    pub fn new(executable: PathBuf, version: VersionInfo, symlinks_required: bool) -> Self {
        Self {
            executable,
            version,
            symlinks_required,
        }
    }

    /// Locate and probe the bootstrap interpreter.
    ///
    /// `explicit` may be a path or a command name. Without it, the usual
    /// Python commands are looked up on `PATH`.
    pub fn find(explicit: Option<&Path>) -> Result<Self> {
        let executable = match explicit {
            Some(explicit) => which::which(explicit)
                .map_err(|_| Error::InterpreterNotFound(explicit.display().to_string()))?,
            None => find_bootstrap_python()?,
        };
        tracing::debug!("Using bootstrap interpreter {executable:?}");
        Self::probe(executable)
    }

    /// Ask `executable` for its version and platform capabilities.
    pub fn probe<P: Into<PathBuf>>(executable: P) -> Result<Self> {
        let executable = executable.into();
        let mut cmd = Command::new(&executable);
        cmd.arg("-c").arg(PROBE_SCRIPT);
        let stdout = command_output(&mut cmd)?;
        let (version, symlinks_required) = parse_probe_output(&stdout)?;
        tracing::debug!(%version, symlinks_required, "Probed {executable:?}");
        Ok(Self::new(executable, version, symlinks_required))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// The full `sys.version_info` of the interpreter.
    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    /// Whether environments created by this interpreter must use symlinks.
    pub fn symlinks_required(&self) -> bool {
        self.symlinks_required
    }
}

/// Find a Python interpreter suitable for bootstrapping environments.
fn find_bootstrap_python() -> Result<PathBuf> {
    for candidate in PYTHON_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            return Ok(path);
        }
    }

    Err(Error::InterpreterNotFound(PYTHON_CANDIDATES.join(", ")))
}

fn parse_probe_output(stdout: &str) -> Result<(VersionInfo, bool)> {
    let probe: ProbeOutput = serde_json::from_str(stdout.trim())
        .map_err(|e| Error::ProbeFailed(format!("{e} in output {stdout:?}")))?;
    let (major, minor, micro, level, serial) = probe.version_info;
    let level: ReleaseLevel = level
        .parse()
        .map_err(|_| Error::ProbeFailed(format!("unknown release level {level:?}")))?;
    Ok((
        VersionInfo::full(major, minor, micro, level, serial),
        probe.symlinks_required,
    ))
}

/// Render a command line for messages.
pub(crate) fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `cmd` to completion, failing unless it exits successfully.
pub(crate) fn command_status(cmd: &mut Command) -> Result<()> {
    let command = describe(cmd);
    tracing::debug!("Running {command}");
    let status = cmd.status().map_err(|e| Error::CommandFailed {
        command: command.clone(),
        status: e.to_string(),
    })?;
    if !status.success() {
        return Err(Error::CommandFailed {
            command,
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Run `cmd` to completion and capture its standard output.
pub(crate) fn command_output(cmd: &mut Command) -> Result<String> {
    let command = describe(cmd);
    tracing::debug!("Running {command}");
    let output = cmd.output().map_err(|e| Error::CommandFailed {
        command: command.clone(),
        status: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(Error::CommandFailed {
            command,
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
