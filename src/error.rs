//! # Error Handling
//!
//! This module defines the error taxonomy shared by every part of `grip`,
//! built on `thiserror`, together with the injectable [`ErrorHandler`] that
//! decides whether a recoverable condition aborts the invocation or is
//! replaced by a substitute value.
//!
//! ## Key Components
//!
//! - **`Error`**: every failure the library can report. The first six
//!   variants form the user-facing taxonomy (schema, configuration,
//!   repository descriptor, environment resolution, workflow, user). The
//!   `Internal` variant marks a broken assumption and never reaches a handler.
//!   The remaining variants wrap I/O, parsing and `git` failures.
//!
//! - **`ErrorHandler`**: a recovery policy. [`Propagate`] aborts on the first
//!   error, [`Substitute`] logs a warning and continues with a fixed value,
//!   and [`Collect`] records every error so that a whole document can be
//!   checked in one pass.
//!
//! - **`Result<T>`**: alias for `std::result::Result<T, Error>`.

use std::cell::RefCell;

use log::warn;
use thiserror::Error;

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!("\n  hint: {}", h))
        .unwrap_or_default()
}

/// Main error type for grip operations
#[derive(Error, Debug)]
pub enum Error {
    /// The document does not match its declared schema: a wrong value type,
    /// an unexpected key, or a malformed list element.
    #[error("Schema error at '{path}': {message}")]
    Schema { path: String, message: String },

    /// The document is well formed but semantically wrong, e.g. an unknown
    /// default configuration or a dependency on an undeclared stage.
    #[error("Configuration error: {message}{}", hint_suffix(hint))]
    Configuration {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A repository descriptor is invalid, including an unknown workflow.
    #[error("Repository descriptor error for '{repo}': {message}")]
    RepoDesc { repo: String, message: String },

    /// An environment reference could not be resolved, or references form a
    /// cycle.
    #[error("Environment resolution error in {scope} for '{key}': {message}")]
    EnvironmentResolution {
        scope: String,
        key: String,
        message: String,
    },

    /// A synchronization action is illegal in the repository's current state.
    #[error("Workflow error for '{repo}' ({workflow}): {message}{}", hint_suffix(hint))]
    Workflow {
        repo: String,
        workflow: String,
        message: String,
        /// Optional hint describing how to get out of the current state
        hint: Option<String>,
    },

    /// The operator asked for something unsafe.
    #[error("{message}{}", hint_suffix(hint))]
    User {
        message: String,
        /// Optional hint describing the safe alternative
        hint: Option<String>,
    },

    /// An internal assumption was violated. Never passed to an
    /// [`ErrorHandler`].
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// A `git` invocation failed.
    #[error("Git command failed in {path}: {command} - {stderr}")]
    GitCommand {
        command: String,
        path: String,
        stderr: String,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An invalid regular expression.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// The state store could not be read.
    #[error("State file parsing error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// The state store could not be written.
    #[error("State file serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Process exit status for this class of error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Schema { .. } => 3,
            Error::Configuration { .. } => 4,
            Error::RepoDesc { .. } => 5,
            Error::EnvironmentResolution { .. } => 6,
            Error::Workflow { .. } => 7,
            Error::User { .. } => 8,
            Error::Internal { .. } => 70,
            _ => 1,
        }
    }

    /// Whether this error belongs to the recoverable taxonomy and may be
    /// offered to an [`ErrorHandler`].
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Schema { .. }
                | Error::Configuration { .. }
                | Error::RepoDesc { .. }
                | Error::EnvironmentResolution { .. }
                | Error::Workflow { .. }
                | Error::User { .. }
        )
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Recovery policy for the recoverable error taxonomy.
///
/// `recover` either returns the error (aborting the operation) or a
/// replacement value. Callers that have no use for a value ignore it and
/// carry on.
pub trait ErrorHandler {
    fn recover(&self, error: Error) -> Result<String>;
}

/// Route `error` through `handler`, bypassing it for errors outside the
/// recoverable taxonomy.
pub(crate) fn raise(handler: &dyn ErrorHandler, error: Error) -> Result<String> {
    if error.is_recoverable() {
        handler.recover(error)
    } else {
        Err(error)
    }
}

/// Abort on the first error.
#[derive(Debug, Default, Clone, Copy)]
pub struct Propagate;

impl ErrorHandler for Propagate {
    fn recover(&self, error: Error) -> Result<String> {
        Err(error)
    }
}

/// Log a warning and continue with a fixed replacement value.
#[derive(Debug, Clone)]
pub struct Substitute {
    value: String,
}

impl Substitute {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl ErrorHandler for Substitute {
    fn recover(&self, error: Error) -> Result<String> {
        warn!("{}; continuing with {:?}", error, self.value);
        Ok(self.value.clone())
    }
}

/// Record every error and continue with an empty value.
#[derive(Debug, Default)]
pub struct Collect {
    errors: RefCell<Vec<Error>>,
}

impl Collect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.borrow().is_empty()
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors.into_inner()
    }
}

impl ErrorHandler for Collect {
    fn recover(&self, error: Error) -> Result<String> {
        self.errors.borrow_mut().push(error);
        Ok(String::new())
    }
}
