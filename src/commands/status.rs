//! # Status Command Implementation
//!
//! Reports, per repository of the selected configuration, the checked-out
//! branch, the workflow, and how local `HEAD` relates to the upstream
//! marker. Read-only: nothing is fetched.

use anyhow::Result;
use clap::Args;

use grip::error::Propagate;
use grip::output::{ancestry_marker, OutputConfig};
use grip::vcs::GitProvider;
use grip::workspace::RepoStatus;

use super::Context;

/// Show the state of every repository
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print machine-readable JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Execute the `status` command.
pub fn execute(args: StatusArgs, ctx: &Context) -> Result<()> {
    let ws = ctx.open(None, &Propagate)?;
    let statuses = ws.status(&GitProvider)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    println!("Configuration: {}", ws.config_name());
    let out = ctx.output();
    let width = statuses.iter().map(|s| s.repo.len()).max().unwrap_or(0);
    for status in &statuses {
        println!("{}", format_status(&out, status, width));
    }
    Ok(())
}

fn format_status(out: &OutputConfig, status: &RepoStatus, width: usize) -> String {
    let state = status.ancestry.as_ref().map(|a| a.state);
    let mut line = format!(
        "{} {:<width$}  {} ({})",
        ancestry_marker(out, state),
        status.repo,
        status.current_branch.as_deref().unwrap_or(&status.branch),
        status.workflow,
        width = width
    );
    if !status.checked_out {
        line.push_str("  not checked out");
    } else if let Some(state) = state {
        line.push_str(&format!("  {}", state));
    }
    if let Some(modified) = &status.modified {
        line.push_str(&format!("\n    modified: {}", modified));
    }
    if let Some(problem) = &status.problem {
        line.push_str(&format!("\n    {}", problem));
    }
    line
}
