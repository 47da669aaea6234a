// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! Building the environments of one or more config files.

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use miette::Result;
use venvfile::{Error, Interpreter, PlannedFile};

/// Exit code for anticipated failures.
const EXIT_ABORTED: i32 = -1;

/// Build the virtual environments declared in config files
#[derive(Debug, Args)]
pub struct CmdBuild {
    /// YAML files that contain the environment configs
    #[clap(required = true, value_name = "CONF_FILE")]
    pub conf_files: Vec<PathBuf>,

    /// Python interpreter used to create the environments
    #[clap(long, env = "VENVFILE_PYTHON")]
    pub python: Option<PathBuf>,

    /// Show what would be built without creating anything
    #[clap(long)]
    pub dry_run: bool,
}

impl CmdBuild {
    pub fn run(&mut self) -> Result<i32> {
        let interpreter = Interpreter::find(self.python.as_deref())?;

        let outcome = if self.dry_run {
            venvfile::plan_from_files(&self.conf_files, &interpreter)
                .map(|plan| print_plan(&interpreter, &plan))
        } else {
            venvfile::build_from_files(&self.conf_files, &interpreter).map(|_| ())
        };

        match outcome {
            Ok(()) => Ok(0),
            Err(err) if err.is_known() => {
                // Known failures are reported without a diagnostic report.
                tracing::error!("{err}");
                if matches!(err, Error::UnsupportedArgument(_)) {
                    tracing::error!("The current running version is {}.", interpreter.version());
                }
                tracing::debug!("{err:?}");
                tracing::info!("Aborting.");
                Ok(EXIT_ABORTED)
            }
            Err(err) => {
                tracing::info!("Aborting.");
                Err(err.into())
            }
        }
    }
}

fn print_plan(interpreter: &Interpreter, plan: &[PlannedFile]) {
    println!(
        "{} {} ({})",
        "Interpreter:".bold(),
        interpreter.executable().display(),
        interpreter.version()
    );

    for file in plan {
        println!();
        match file {
            PlannedFile::Skipped { path, reason } => {
                println!("{} {}", "skip".yellow(), path.display());
                println!("  {}", reason.dimmed());
            }
            PlannedFile::Load { path, environments } => {
                println!("{}", path.display().to_string().bold());
                if environments.is_empty() {
                    println!("  (no environments)");
                }
                for env in environments {
                    match &env.command {
                        Some(command) => {
                            println!("  {} [{}] {}", "build".green(), env.index, env.directory);
                            println!("    {}", command.dimmed());
                        }
                        None => {
                            println!(
                                "  {} [{}] {} (incompatible)",
                                "skip".yellow(),
                                env.index,
                                env.directory
                            );
                        }
                    }
                }
            }
        }
    }
}
