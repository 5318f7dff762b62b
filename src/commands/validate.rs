//! # Validate Command Implementation
//!
//! Loads the workspace document, then validates and resolves one
//! configuration (or every declared one) and compiles its build plan,
//! without touching any repository. Recoverable problems are collected so
//! that a single run reports all of them; the exit status is that of the
//! first problem found.

use anyhow::Result;
use clap::Args;

use grip::defaults;
use grip::descriptor::GripDescriptor;
use grip::document;
use grip::error::{Collect, Error};
use grip::output::{emoji, OutputConfig};
use grip::workspace::Workspace;

use super::Context;

/// Validate the workspace document
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration to validate. Defaults to every declared configuration.
    pub config: Option<String>,
}

/// Execute the `validate` command.
pub fn execute(args: ValidateArgs, ctx: &Context) -> Result<()> {
    let out = ctx.output();
    let root = ctx.root()?;
    let names = match args.config {
        Some(name) => vec![name],
        None => {
            // Problems found here are reported again per configuration.
            let listing = Collect::new();
            let raw = document::from_file(defaults::document_path(&root))?;
            let record = document::load_with(&raw, &listing)?;
            GripDescriptor::build(&record, &root, &listing)?.config_names
        }
    };

    let mut first: Option<Error> = None;
    for name in &names {
        let errors = validate_config(ctx, &root, name);
        if errors.is_empty() {
            println!("{} {}", emoji(&out, "✅", "[OK]"), name);
            continue;
        }
        report(&out, name, &errors);
        if first.is_none() {
            first = errors.into_iter().next();
        }
    }

    match first {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn validate_config(ctx: &Context, root: &std::path::Path, name: &str) -> Vec<Error> {
    let collect = Collect::new();
    let result = Workspace::open(root, Some(name), ctx.overrides(), &collect)
        .and_then(|ws| ws.build_plan().map(|_| ()));
    let mut errors = collect.into_errors();
    if let Err(error) = result {
        errors.push(error);
    }
    errors
}

fn report(out: &OutputConfig, name: &str, errors: &[Error]) {
    println!(
        "{} {}: {} problem{}",
        emoji(out, "❌", "[ERR]"),
        name,
        errors.len(),
        if errors.len() == 1 { "" } else { "s" }
    );
    for error in errors {
        println!("  - {}", error);
    }
}
