// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Creation and provisioning of a single virtual environment.
//!
//! The environment itself is created by running the `venv` module of the
//! bootstrap interpreter. Provisioning then runs the new environment's own
//! interpreter: `pip` for packages and `site` to locate the
//! site-packages directory for the `.pth` file.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::interpreter::{command_output, command_status, Interpreter};
use crate::pth::{open_pth_file, sanitize_pth_path, PthMerger};
use crate::pyver::{ComparisonOperator, PyVerComparison, VersionInfo};
use crate::spec::{EnvironmentSpec, Provisioning, SymlinkMode};
use crate::{path_util, Error, Result, REQUIREMENTS_TXT};

#[cfg(test)]
#[path = "./builder_test.rs"]
mod builder_test;

const FIND_SITE_SCRIPT: &str = "import json, site; print(json.dumps(site.getsitepackages()))";

/// A created virtual environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvContext {
    /// Root directory of the environment.
    pub env_dir: PathBuf,
    /// The environment's Python interpreter.
    pub env_exe: PathBuf,
}

impl EnvContext {
    /// Describe the environment rooted at `env_dir`.
    pub fn from_env_dir<P: Into<PathBuf>>(env_dir: P) -> Self {
        let env_dir = env_dir.into();
        let env_exe = if cfg!(windows) {
            env_dir.join("Scripts").join("python.exe")
        } else {
            env_dir.join("bin").join("python")
        };
        Self { env_dir, env_exe }
    }

    /// Run `pip install` with `args` in the environment.
    pub fn python_m_pip_install<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.env_exe);
        cmd.args(["-m", "pip", "install"]).args(args);
        tracing::info!("Launching pip to install dependencies.");
        command_status(&mut cmd)
    }

    /// Ask the environment for its site-packages directory.
    pub fn find_site_dir(&self) -> Result<PathBuf> {
        let mut cmd = Command::new(&self.env_exe);
        cmd.arg("-c").arg(FIND_SITE_SCRIPT);
        let stdout = command_output(&mut cmd)?;
        let dirs: Vec<String> = serde_json::from_str(stdout.trim()).map_err(|e| {
            Error::SiteDirUnresolved(format!("unexpected output {stdout:?}: {e}"))
        })?;
        tracing::debug!("Got site directories {dirs:?}");
        match dirs.into_iter().next() {
            Some(dir) => Ok(PathBuf::from(dir)),
            None => Err(Error::SiteDirUnresolved(
                "the interpreter reported no site directories".to_string(),
            )),
        }
    }
}

/// Builds one environment described by an [`EnvironmentSpec`].
///
/// All settings are copied out on construction, after they have been
/// checked against the bootstrap interpreter.
#[derive(Debug, Clone)]
pub struct EnvBuilder {
    python: PathBuf,
    conf_dir: PathBuf,

    system_site_packages: bool,
    clear: bool,
    symlinks: bool,
    upgrade: bool,
    with_pip: bool,
    prompt: Option<String>,
    upgrade_deps: bool,

    provisioning: Provisioning,
    pth_file_name: String,
}

impl EnvBuilder {
    /// Prepare a builder for `spec`, declared in the config file at
    /// `conf_path`.
    ///
    /// Fails with [`Error::UseSymlinks`] if copies were requested but the
    /// interpreter requires symlinks, and with [`Error::UnsupportedArgument`]
    /// if `upgrade_deps` is set for an interpreter older than 3.9.
    pub fn new(
        conf_path: &Path,
        spec: &EnvironmentSpec,
        interpreter: &Interpreter,
    ) -> Result<Self> {
        let symlinks = match (spec.params.symlinks, interpreter.symlinks_required()) {
            (SymlinkMode::No, true) => return Err(Error::UseSymlinks),
            (SymlinkMode::Yes, _) | (SymlinkMode::PlatformDefault, true) => true,
            (SymlinkMode::No, false) | (SymlinkMode::PlatformDefault, false) => false,
        };

        let without_upgrade_deps =
            PyVerComparison::new(ComparisonOperator::Le, VersionInfo::major_minor(3, 9));
        if spec.params.upgrade_deps
            && without_upgrade_deps.applies_to_current_pyversion(interpreter.version())
        {
            return Err(Error::UnsupportedArgument(format!(
                "'upgrade_deps' is only available starting from Python 3.9. The parameter was set to {}.",
                spec.params.upgrade_deps
            )));
        }

        let conf_dir = conf_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self {
            python: interpreter.executable().to_path_buf(),
            conf_dir,
            system_site_packages: spec.params.system_site_packages,
            clear: spec.params.clear,
            symlinks,
            upgrade: spec.params.upgrade,
            with_pip: spec.params.with_pip,
            prompt: spec.params.prompt.clone(),
            upgrade_deps: spec.params.upgrade_deps,
            provisioning: spec.provisioning.clone(),
            pth_file_name: spec.pth_file_name(),
        })
    }

    /// Resolve `path` relative to the directory containing the config file.
    pub fn resolve_rel_path<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        path_util::resolve_rel_path(&self.conf_dir, path.as_ref())
    }

    /// Whether the environment will link to the bootstrap interpreter.
    pub fn uses_symlinks(&self) -> bool {
        self.symlinks
    }

    /// The arguments passed to the bootstrap interpreter to create the
    /// environment in `env_dir`.
    pub fn venv_args(&self, env_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-m".into(), "venv".into()];
        if self.system_site_packages {
            args.push("--system-site-packages".into());
        }
        let link_mode = if self.symlinks { "--symlinks" } else { "--copies" };
        args.push(link_mode.into());
        if self.clear {
            args.push("--clear".into());
        }
        if self.upgrade {
            args.push("--upgrade".into());
        }
        if !self.with_pip {
            args.push("--without-pip".into());
        }
        if let Some(prompt) = &self.prompt {
            args.push("--prompt".into());
            args.push(prompt.into());
        }
        if self.upgrade_deps {
            args.push("--upgrade-deps".into());
        }
        args.push(env_dir.as_os_str().to_owned());
        args
    }

    /// The command that creates the environment in `env_dir`.
    pub fn venv_command(&self, env_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.args(self.venv_args(env_dir));
        cmd
    }

    /// Create and provision the environment in `directory`.
    pub fn create<P: AsRef<Path>>(&self, directory: P) -> Result<EnvContext> {
        let env_dir = self.resolve_rel_path(directory);
        tracing::debug!("Creating environment in {env_dir:?}");
        command_status(&mut self.venv_command(&env_dir))?;

        let context = EnvContext::from_env_dir(env_dir);
        self.post_setup(&context)?;
        Ok(context)
    }

    /// Provision a freshly created environment.
    pub fn post_setup(&self, context: &EnvContext) -> Result<()> {
        if self.with_pip {
            if self.provisioning.upgrade_pip {
                tracing::info!("Upgrading pip...");
                context.python_m_pip_install(["--upgrade", "pip"])?;
                tracing::info!("pip upgraded.");
            }
            if self.provisioning.wheel {
                tracing::info!("Installing wheel...");
                context.python_m_pip_install(["wheel"])?;
                tracing::info!("wheel installed.");
            }
            if self.provisioning.install_requirements {
                self.install_requirements(context)?;
            } else {
                tracing::info!("Skipping installation of requirements as requested.");
            }
        } else {
            tracing::info!("Skipping installation of requirements since 'pip' was not installed.");
        }

        self.install_pth(context)?;
        Ok(())
    }

    /// The requirement files to install, as absolute paths.
    ///
    /// An empty result means there is nothing to install.
    pub fn resolve_requirement_files(&self) -> Result<Vec<PathBuf>> {
        match &self.provisioning.requirement_files {
            None => {
                let implicit = self.resolve_rel_path(REQUIREMENTS_TXT);
                if !implicit.is_file() {
                    tracing::info!("No {REQUIREMENTS_TXT:?} found. Skipping installation.");
                    return Ok(Vec::new());
                }
                Ok(vec![implicit])
            }
            Some(files) if files.is_empty() => {
                tracing::info!("No requirement files given.");
                Ok(Vec::new())
            }
            Some(files) => files
                .iter()
                .map(|file| {
                    let path = self.resolve_rel_path(file);
                    if !path.is_file() {
                        return Err(Error::RequirementsNotFound(path));
                    }
                    Ok(path)
                })
                .collect(),
        }
    }

    fn install_requirements(&self, context: &EnvContext) -> Result<()> {
        let files = self.resolve_requirement_files()?;
        if files.is_empty() {
            return Ok(());
        }

        let args = files
            .iter()
            .flat_map(|path| [OsStr::new("-r"), path.as_os_str()]);
        tracing::info!("Installing requirements...");
        context.python_m_pip_install(args)?;
        tracing::info!("Requirements installed.");
        Ok(())
    }

    /// Register the configured paths in the environment's `.pth` file and
    /// return how many entries were written.
    pub fn install_pth(&self, context: &EnvContext) -> Result<usize> {
        let paths = match &self.provisioning.pth_paths {
            Some(paths) if !paths.is_empty() => paths,
            _ => {
                tracing::debug!("No .pth paths specified. Skipping installation.");
                return Ok(0);
            }
        };

        tracing::info!("Setting up .pth file...");
        let site_dir = context.find_site_dir()?;
        let candidates = paths
            .iter()
            .map(|path| sanitize_pth_path(path, &self.conf_dir, &site_dir))
            .collect();

        let file_path = site_dir.join(&self.pth_file_name);
        tracing::debug!("Writing (to) .pth file {file_path:?}");
        let pth_error = |error| Error::PthFileFailed {
            path: file_path.clone(),
            error,
        };
        let mut file = open_pth_file(&file_path, self.provisioning.pth_lock_file_exclusive)
            .map_err(pth_error)?;

        let merger = PthMerger {
            site_dir: &site_dir,
            linesep: &self.provisioning.pth_newline,
            ignore_existing_duplicates: self.provisioning.pth_ignore_existing_duplicates,
        };
        let written = merger.merge(&mut file, candidates).map_err(pth_error)?;
        tracing::info!("Completed.");
        Ok(written)
    }
}
