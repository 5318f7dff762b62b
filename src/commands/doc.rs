//! # Doc Command Implementation
//!
//! Describes the workspace: its configurations, the repositories of the
//! selected configuration and their stages. References that cannot be
//! resolved are shown empty with a warning instead of failing, so the
//! command stays useful while a document is being written.

use std::fmt::Write as _;

use anyhow::Result;
use clap::Args;

use grip::descriptor::{ConfigurationDescriptor, GripDescriptor};
use grip::descriptor::stage::StageDescriptor;
use grip::error::Substitute;

use super::Context;

/// Describe configurations, repositories and stages
#[derive(Args, Debug)]
pub struct DocArgs {
    /// Configuration to describe. Defaults to the configured one.
    pub config: Option<String>,
}

/// Execute the `doc` command.
pub fn execute(args: DocArgs, ctx: &Context) -> Result<()> {
    let ws = ctx.open(args.config.as_deref(), &Substitute::new(""))?;
    print!("{}", render(ws.descriptor(), ws.configuration()?)?);
    Ok(())
}

fn render(grip: &GripDescriptor, config: &ConfigurationDescriptor) -> Result<String> {
    let mut out = String::new();
    writeln!(out, "{}", grip.name)?;
    if let Some(doc) = &grip.doc {
        writeln!(out, "  {}", doc.trim())?;
    }

    writeln!(out, "\nConfigurations:")?;
    for name in &grip.config_names {
        let mut line = format!("  {}", name);
        if *name == grip.default_config {
            line.push_str(" (default)");
        }
        if *name == config.name {
            line.push_str(" *");
            if let Some(doc) = &config.doc {
                line.push_str(&format!(" - {}", doc.trim()));
            }
        }
        writeln!(out, "{}", line)?;
    }

    writeln!(out, "\nRepositories in '{}':", config.name)?;
    for repo in config.repos.values() {
        writeln!(out, "  {}", repo.name)?;
        if let Some(doc) = &repo.doc {
            writeln!(out, "    {}", doc.trim())?;
        }
        if let Some(resolved) = &repo.resolved {
            if let Some(url) = &resolved.url {
                writeln!(out, "    url: {}", url)?;
            }
            writeln!(out, "    branch: {}", resolved.branch)?;
            writeln!(out, "    path: {}", resolved.relative_path)?;
            writeln!(out, "    workflow: {}", resolved.workflow)?;
        }
        for stage in repo.stages.values() {
            render_stage(&mut out, stage, "    ")?;
        }
    }

    if !config.stages.is_empty() {
        writeln!(out, "\nGlobal stages:")?;
        for stage in config.stages.values() {
            render_stage(&mut out, stage, "  ")?;
        }
    }
    Ok(out)
}

fn render_stage(out: &mut String, stage: &StageDescriptor, indent: &str) -> std::fmt::Result {
    let mut line = format!("{}{}", indent, stage.stage_ref());
    if stage.action {
        line.push_str(" [action]");
    }
    if let Some(doc) = &stage.doc {
        line.push_str(&format!(" - {}", doc.trim()));
    }
    writeln!(out, "{}", line)?;
    if !stage.requires.is_empty() {
        let requires: Vec<String> = stage.requires.iter().map(ToString::to_string).collect();
        writeln!(out, "{}  requires: {}", indent, requires.join(", "))?;
    }
    if let Some(satisfies) = &stage.satisfies {
        writeln!(out, "{}  satisfies: {}", indent, satisfies)?;
    }
    Ok(())
}
