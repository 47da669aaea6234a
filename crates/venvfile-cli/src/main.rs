// Copyright (c) Contributors to the venvfile project.
// SPDX-License-Identifier: Apache-2.0

//! venvfile - Declarative Python Virtual Environment Builder CLI

use clap::{Args, Parser};
use miette::Result;

mod cmd_build;

use cmd_build::CmdBuild;


#[derive(Parser)]
#[clap(
    name = "venvfile",
    about = "Create Python virtual environments from config files",
    version,
    after_help = "See also the venv module of the Python standard library."
)]
struct Opt {
    #[clap(flatten)]
    logging: Logging,

    #[clap(flatten)]
    cmd: CmdBuild,
}

#[derive(Args)]
struct Logging {
    /// Increase verbosity (-v, -vv)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[clap(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Logging {
    /// Progress is reported at info level, so that is the default.
    fn level(&self) -> tracing::Level {
        match (self.quiet, self.verbose) {
            (true, _) => tracing::Level::ERROR,
            (false, 0) => tracing::Level::INFO,
            (false, 1) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        }
    }

    fn init(&self) {
        let builder = tracing_subscriber::fmt().with_max_level(self.level());
        if self.verbose == 0 {
            builder.without_time().with_target(false).init();
        } else {
            builder.init();
        }
    }
}

impl Opt {
    fn run(mut self) -> Result<i32> {
        self.logging.init();
        self.cmd.run()
    }
}

fn main() -> Result<()> {
    let opt = Opt::parse();
    let code = opt.run()?;
    std::process::exit(code);
}
