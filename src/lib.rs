//! # grip
//!
//! This library coordinates a tree of independently-versioned repositories
//! as one workspace. It is designed to be used by the `grip` command-line
//! tool, but the descriptor model, environment resolver and build plan
//! compiler work on their own as well.
//!
//! ## Quick Example
//!
//! ```
//! use std::path::Path;
//!
//! use grip::buildplan::BuildPlan;
//! use grip::descriptor::GripDescriptor;
//! use grip::document;
//! use grip::error::Propagate;
//!
//! let raw = document::parse(r#"
//! name: demo
//! repo:
//!   core:
//!     url: https://example.com/core.git
//!     stage:
//!       build: { exec: "make -C @GRIP_REPO_PATH@" }
//! "#).unwrap();
//! let record = document::load(&raw).unwrap();
//!
//! let mut grip = GripDescriptor::build(&record, Path::new("/work"), &Propagate).unwrap();
//! let config = grip.prepare("default", None, &Propagate).unwrap();
//!
//! let plan = BuildPlan::compile(config, Path::new("/work/.grip/stamps")).unwrap();
//! let build = plan.target_by_name("core.build").unwrap();
//! assert_eq!(build.command.as_deref(), Some("make -C /work/core"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Schema Loader (`schema`, `document`)**: validates the YAML document
//!   against typed schemas and yields ordered [`schema::Record`]s.
//! - **Environment Resolver (`env`)**: a tree of scopes whose values may
//!   reference each other as `@NAME@`, resolved to a fixed point.
//! - **Descriptor Model (`descriptor`)**: repositories, stages and
//!   configurations. Each configuration clones the base descriptors and
//!   applies its own overrides, then is validated and resolved.
//! - **Build Plan Compiler (`buildplan`)**: turns the stage dependency graph
//!   into a ninja build file with per-stage stamps.
//! - **Workflow State Machine (`workflow`, `vcs`)**: classifies each
//!   repository against its upstream and applies `fetch`, `update`,
//!   `merge`, `commit` and `push` under the repository's workflow.
//!
//! ## Execution Flow
//!
//! [`workspace::Workspace`] drives a command:
//!
//! 1.  **Load**: parse `.grip/grip.yaml` and build the descriptors.
//! 2.  **Prepare**: configure, validate and resolve the selected
//!     configuration to learn where each repository lives.
//! 3.  **Merge**: fold every checked-out repository's own `grip.yaml` into
//!     the document and prepare again.
//! 4.  **Act**: compile the build plan, or run a workflow action per
//!     repository and record the outcome in `.grip/state.toml`.

pub mod buildplan;
pub mod defaults;
pub mod descriptor;
pub mod document;
pub mod env;
pub mod error;
pub mod location;
pub mod output;
pub mod schema;
pub mod state;
pub mod suggestions;
pub mod vcs;
pub mod workflow;
pub mod workspace;

#[cfg(test)]
mod env_proptest;
