//! # Make Command Implementation
//!
//! Regenerates `.grip/build.ninja` when the configuration changed, then
//! hands the requested targets to `ninja`. Target names are `<repo>.<stage>`
//! for repository stages and `<stage>` for global ones; prefix a name with
//! `revoke.` to forget that it ran, or `force.` to run it again.
//!
//! Every write of the build file clears all stamps; an unchanged file is
//! left alone. `--regenerate` writes it unconditionally, so it clears and
//! redeclares every stamp even when nothing changed.

use std::process::Command;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use log::debug;

use grip::buildplan::BuildPlan;
use grip::defaults;
use grip::error::{Error, Propagate};
use grip::suggestions;

use super::Context;

/// Regenerate the build file and run the build
#[derive(Args, Debug)]
pub struct MakeArgs {
    /// Targets to build. Without targets, every non-action stage is built.
    pub targets: Vec<String>,

    /// Only regenerate the build file.
    #[arg(long)]
    pub generate_only: bool,

    /// Rewrite the build file and clear every stamp, even when unchanged.
    #[arg(long)]
    pub regenerate: bool,

    /// The ninja executable.
    #[arg(long, value_name = "PROGRAM", env = "GRIP_NINJA", default_value = "ninja")]
    pub ninja: String,
}

/// Execute the `make` command.
pub fn execute(args: MakeArgs, ctx: &Context) -> Result<()> {
    let ws = ctx.open(None, &Propagate)?;
    let plan = ws.build_plan()?;
    for target in &args.targets {
        check_target(&plan, target)?;
    }

    let build_file = defaults::build_file_path(ws.root());
    if ws.write_build_file(args.regenerate)? {
        debug!("regenerated {}", build_file.display());
    }
    if args.generate_only {
        println!("{}", build_file.display());
        return Ok(());
    }

    let status = Command::new(&args.ninja)
        .arg("-f")
        .arg(&build_file)
        .args(&args.targets)
        .current_dir(ws.root())
        .status()
        .with_context(|| format!("failed to run '{}'", args.ninja))?;
    if !status.success() {
        bail!("build failed ({})", status);
    }
    Ok(())
}

fn check_target(plan: &BuildPlan, target: &str) -> Result<()> {
    let name = target
        .strip_prefix("revoke.")
        .or_else(|| target.strip_prefix("force."))
        .unwrap_or(target);
    if plan.target_by_name(name).is_some() {
        return Ok(());
    }
    let known: Vec<String> = plan.targets().iter().map(|t| t.name()).collect();
    Err(Error::User {
        message: format!("unknown build target '{}'", target),
        hint: Some(suggestions::unknown_name_hint("targets", name, &known)),
    }
    .into())
}
