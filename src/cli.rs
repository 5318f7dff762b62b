//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, Context};

/// grip - coordinate a tree of repositories as one workspace
#[derive(Parser, Debug)]
#[command(name = "grip")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,

    /// Workspace root. Defaults to the nearest directory at or above the
    /// current one that contains .grip/grip.yaml
    #[arg(long, global = true, value_name = "DIR", env = "GRIP_ROOT")]
    root: Option<PathBuf>,

    /// Let variables of the calling environment override document entries
    #[arg(long, global = true)]
    inherit_env: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Select a configuration, clone its repositories and write the build file
    Configure(commands::configure::ConfigureArgs),

    /// Show branch, workflow and upstream state of every repository
    Status(commands::status::StatusArgs),

    /// Fetch every repository and advance its upstream marker
    Fetch(commands::sync::SyncArgs),

    /// Bring every repository up to its upstream marker
    Update(commands::sync::SyncArgs),

    /// Rebase local work onto the upstream marker
    Merge(commands::sync::SyncArgs),

    /// Commit local modifications in every repository
    Commit(commands::sync::CommitArgs),

    /// Check and push local work upstream
    Publish(commands::sync::SyncArgs),

    /// Regenerate the build file and run ninja
    Make(commands::make::MakeArgs),

    /// Print the resolved environment
    Env(commands::env::EnvArgs),

    /// Describe configurations, repositories and stages
    Doc(commands::doc::DocArgs),

    /// Load, validate and resolve without touching any repository
    Validate(commands::validate::ValidateArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let ctx = Context {
            color: self.color,
            root: self.root,
            inherit_env: self.inherit_env,
        };

        match self.command {
            Commands::Configure(args) => commands::configure::execute(args, &ctx),
            Commands::Status(args) => commands::status::execute(args, &ctx),
            Commands::Fetch(args) => commands::sync::execute(args, grip::workspace::SyncAction::Fetch, &ctx),
            Commands::Update(args) => commands::sync::execute(args, grip::workspace::SyncAction::Update, &ctx),
            Commands::Merge(args) => commands::sync::execute(args, grip::workspace::SyncAction::Merge, &ctx),
            Commands::Commit(args) => commands::sync::commit(args, &ctx),
            Commands::Publish(args) => commands::sync::execute(args, grip::workspace::SyncAction::Publish, &ctx),
            Commands::Make(args) => commands::make::execute(args, &ctx),
            Commands::Env(args) => commands::env::execute(args, &ctx),
            Commands::Doc(args) => commands::doc::execute(args, &ctx),
            Commands::Validate(args) => commands::validate::execute(args, &ctx),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // A logger may already be installed when running under a test harness.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}
