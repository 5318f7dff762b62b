//! The grip document: concrete schemas and YAML parsing.
//!
//! ```yaml
//! name: demo
//! default_config: dev
//! configs: [dev, ci]
//! base_repos: [core]
//! stages: [build]
//! workflow: readonly
//! env:
//!   PREFIX: "@GRIP_ROOT_PATH@/install"
//! repo:
//!   core:
//!     url: https://example.com/core.git
//!     stage:
//!       build: { exec: make, requires: [fetch-deps] }
//!       fetch-deps: { exec: ./deps.sh }
//! config:
//!   ci:
//!     repos: [extra]
//!     core: { branch: release }
//! ```

use std::path::Path;

use serde_yaml::Value as YamlValue;

use crate::error::{ErrorHandler, Result};
use crate::schema::{self, Record, Schema, ValueKind};

/// An environment block: any key, string values.
pub fn env_schema() -> Schema {
    Schema::new().wildcard(ValueKind::str())
}

pub fn stage_schema() -> Schema {
    Schema::new()
        .fixed("wd", ValueKind::str())
        .fixed("exec", ValueKind::str())
        .fixed("env", ValueKind::nested(env_schema()))
        .fixed("requires", ValueKind::str_list())
        .fixed("satisfies", ValueKind::str())
        .fixed("doc", ValueKind::str())
        .fixed("action", ValueKind::bool())
}

fn stage_map_schema() -> Schema {
    Schema::new().wildcard(ValueKind::nested(stage_schema()))
}

pub fn repo_schema() -> Schema {
    Schema::new()
        .fixed("url", ValueKind::str())
        .fixed("branch", ValueKind::str())
        .fixed("path", ValueKind::str())
        .fixed("shallow", ValueKind::bool())
        .fixed("workflow", ValueKind::str())
        .fixed("doc", ValueKind::str())
        .fixed("env", ValueKind::nested(env_schema()))
        .fixed("stage", ValueKind::nested(stage_map_schema()))
}

/// A configuration fragment. Keys that are not fixed attributes name a
/// repository whose fields this configuration overrides.
pub fn config_schema() -> Schema {
    Schema::new()
        .fixed("repos", ValueKind::str_list())
        .fixed("doc", ValueKind::str())
        .fixed("env", ValueKind::nested(env_schema()))
        .fixed("stage", ValueKind::nested(stage_map_schema()))
        .wildcard(ValueKind::nested(repo_schema()))
}

pub fn root_schema() -> Schema {
    Schema::new()
        .fixed("name", ValueKind::str())
        .fixed("doc", ValueKind::str())
        .fixed("default_config", ValueKind::str())
        .fixed("configs", ValueKind::str_list())
        .fixed("base_repos", ValueKind::str_list())
        .fixed("stages", ValueKind::str_list())
        .fixed("workflow", ValueKind::str())
        .fixed("env", ValueKind::nested(env_schema()))
        .fixed(
            "repo",
            ValueKind::nested(Schema::new().wildcard(ValueKind::nested(repo_schema()))),
        )
        .fixed("stage", ValueKind::nested(stage_map_schema()))
        .fixed(
            "config",
            ValueKind::nested(Schema::new().wildcard(ValueKind::nested(config_schema()))),
        )
}

/// Parse YAML text into an untyped tree.
pub fn parse(text: &str) -> Result<YamlValue> {
    Ok(serde_yaml::from_str(text)?)
}

/// Parse a YAML file into an untyped tree.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<YamlValue> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

/// Validate an untyped root document against [`root_schema`].
pub fn load(raw: &YamlValue) -> Result<Record> {
    schema::load(&root_schema(), raw)
}

/// [`load`], routing schema errors through `handler`.
pub fn load_with(raw: &YamlValue, handler: &dyn ErrorHandler) -> Result<Record> {
    schema::load_with(&root_schema(), raw, handler)
}

/// Validate an untyped repository fragment against [`repo_schema`].
pub fn load_repo_fragment(raw: &YamlValue, handler: &dyn ErrorHandler) -> Result<Record> {
    schema::load_with(&repo_schema(), raw, handler)
}
