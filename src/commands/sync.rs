//! # Synchronization Commands
//!
//! `fetch`, `update`, `merge`, `commit` and `publish` apply one workflow
//! action to every checked-out repository of the selected configuration and
//! record the resulting state. Each repository's workflow decides whether
//! the action is legal in its current state.

use anyhow::Result;
use clap::Args;

use grip::error::Propagate;
use grip::output::emoji;
use grip::vcs::GitProvider;
use grip::workspace::SyncAction;

use super::Context;

/// Options shared by the synchronization commands
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Configuration to act on. Defaults to the configured one.
    #[arg(long, value_name = "CONFIG")]
    pub config: Option<String>,
}

/// Commit local modifications
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Commit message.
    #[arg(short, long)]
    pub message: String,

    /// Configuration to act on. Defaults to the configured one.
    #[arg(long, value_name = "CONFIG")]
    pub config: Option<String>,
}

/// Execute a synchronization command.
pub fn execute(args: SyncArgs, action: SyncAction, ctx: &Context) -> Result<()> {
    run(args.config.as_deref(), action, ctx)
}

/// Execute the `commit` command.
pub fn commit(args: CommitArgs, ctx: &Context) -> Result<()> {
    run(args.config.as_deref(), SyncAction::Commit(args.message), ctx)
}

fn run(config: Option<&str>, action: SyncAction, ctx: &Context) -> Result<()> {
    let out = ctx.output();
    let mut ws = ctx.open(config, &Propagate)?;
    let outcomes = ws.sync(&action, &GitProvider)?;
    ws.save_state()?;

    for outcome in outcomes {
        let detail = match (&action, &outcome.changeset) {
            _ if outcome.skipped => "not checked out".to_string(),
            (SyncAction::Commit(_), None) => "nothing to commit".to_string(),
            (_, Some(changeset)) => changeset.chars().take(12).collect(),
            (_, None) => "done".to_string(),
        };
        let marker = if outcome.skipped {
            emoji(&out, "⏭️", "[SKIP]")
        } else {
            emoji(&out, "✅", "[OK]")
        };
        println!("{} {}: {}", marker, outcome.repo, detail);
    }
    Ok(())
}
