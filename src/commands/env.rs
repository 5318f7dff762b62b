//! # Env Command Implementation
//!
//! Prints the resolved environment of the configuration, of one repository,
//! or of one stage, as shell `export` lines or as ninja variable
//! assignments.

use anyhow::Result;
use clap::Args;

use grip::env::{to_ninja_assignments, to_shell_exports};
use grip::error::Propagate;

use super::Context;

/// Print the resolved environment
#[derive(Args, Debug)]
pub struct EnvArgs {
    /// Print ninja variable assignments instead of shell exports.
    #[arg(long)]
    pub ninja: bool,

    /// Repository whose environment to print.
    #[arg(long, value_name = "REPO")]
    pub repo: Option<String>,

    /// Stage whose environment to print; global unless --repo is given.
    #[arg(long, value_name = "STAGE")]
    pub stage: Option<String>,

    /// Configuration to resolve. Defaults to the configured one.
    #[arg(long, value_name = "CONFIG")]
    pub config: Option<String>,
}

/// Execute the `env` command.
pub fn execute(args: EnvArgs, ctx: &Context) -> Result<()> {
    let ws = ctx.open(args.config.as_deref(), &Propagate)?;
    let pairs = ws.environment(args.repo.as_deref(), args.stage.as_deref())?;
    let text = if args.ninja {
        to_ninja_assignments(&pairs)
    } else {
        to_shell_exports(&pairs)
    };
    print!("{}", text);
    Ok(())
}
