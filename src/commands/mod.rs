//! # CLI Command Implementations
//!
//! One module per subcommand of `grip`. Each defines a `clap` `Args` struct
//! and an `execute` function that calls into the `grip` library.
//! [`Context`] carries the global options every command shares.

pub mod completions;
pub mod configure;
pub mod doc;
pub mod env;
pub mod make;
pub mod status;
pub mod sync;
pub mod validate;

use std::path::PathBuf;

use anyhow::Result;

use grip::defaults;
use grip::env::Overrides;
use grip::error::{Error, ErrorHandler};
use grip::output::OutputConfig;
use grip::suggestions;
use grip::workspace::{self, Workspace};

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub color: String,
    pub root: Option<PathBuf>,
    pub inherit_env: bool,
}

impl Context {
    pub fn output(&self) -> OutputConfig {
        OutputConfig::from_env_and_flag(&self.color)
    }

    /// The workspace root: `--root` when given, else found by searching
    /// upward from the current directory.
    pub fn root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => {
                if !defaults::document_path(root).is_file() {
                    return Err(Error::User {
                        message: format!("{} is not a grip workspace", root.display()),
                        hint: Some(suggestions::workspace_not_found_hint()),
                    }
                    .into());
                }
                Ok(root.clone())
            }
            None => Ok(workspace::locate(&std::env::current_dir()?)?),
        }
    }

    /// Process environment as overrides, when `--inherit-env` was given.
    pub fn overrides(&self) -> Option<Overrides> {
        self.inherit_env.then(|| std::env::vars().collect())
    }

    pub fn open(&self, config: Option<&str>, handler: &dyn ErrorHandler) -> Result<Workspace> {
        let root = self.root()?;
        Ok(Workspace::open(&root, config, self.overrides(), handler)?)
    }
}
