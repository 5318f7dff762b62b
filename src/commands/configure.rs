//! # Configure Command Implementation
//!
//! Selects the workspace's configuration, records it in `.grip/local.yaml`,
//! clones every repository the configuration needs and regenerates the
//! build file. Switching an already configured workspace needs `--force`.

use anyhow::Result;
use clap::Args;

use grip::error::Propagate;
use grip::output::emoji;
use grip::vcs::GitProvider;
use grip::workspace::Workspace;

use super::Context;

/// Select a configuration for the workspace
#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Configuration to select. Defaults to the document's default_config.
    pub config: Option<String>,

    /// Switch even when the workspace is configured differently.
    #[arg(long)]
    pub force: bool,

    /// Do not clone missing repositories.
    #[arg(long)]
    pub no_checkout: bool,
}

/// Execute the `configure` command.
pub fn execute(args: ConfigureArgs, ctx: &Context) -> Result<()> {
    let out = ctx.output();
    let root = ctx.root()?;
    let mut ws = Workspace::configure(
        &root,
        args.config.as_deref(),
        args.force,
        ctx.overrides(),
        &Propagate,
    )?;

    if !args.no_checkout {
        for name in ws.checkout(&GitProvider, &Propagate)? {
            println!("{} Cloned {}", emoji(&out, "📥", "[CLONE]"), name);
        }
        ws.save_state()?;
    }
    ws.write_build_file(true)?;

    println!(
        "{} Workspace configured as '{}'",
        emoji(&out, "✅", "[OK]"),
        ws.config_name()
    );
    Ok(())
}
