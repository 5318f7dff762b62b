//! Shared test utilities for integration and E2E tests.
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = GripFixture::new().with_document(documents::SCENARIO);
//! fixture.command().arg("validate").assert().success();
//! ```

use assert_fs::prelude::*;
use std::path::Path;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use super::documents;
    pub use super::GripFixture;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;
}

/// Workspace documents used across tests.
#[allow(dead_code)]
pub mod documents {
    /// One repository with two dependent stages.
    pub const MINIMAL: &str = r#"
name: minimal
repo:
  core:
    url: https://example.com/core.git
    stage:
      build: {exec: make}
      test: {exec: make check, requires: [build]}
"#;

    /// Two configurations, repository overrides, global stages and an action.
    pub const SCENARIO: &str = r#"
name: scenario
doc: A workspace with two configurations
configs: [dev, ci]
default_config: dev
base_repos: [core]
stages: [install, all]
workflow: single
env:
  PREFIX: "@GRIP_ROOT_PATH@/install"
  CFLAGS: -O2
repo:
  core:
    url: https://example.com/core.git
    env:
      SRC: "@GRIP_REPO_PATH@/src"
    stage:
      build:
        exec: make -C @SRC@ CFLAGS=@CFLAGS@
        requires: [configure]
      configure:
        exec: ./configure --prefix=@PREFIX@
      install:
        exec: make install
        requires: [build]
  tools:
    url: git@example.com:tools.git
    branch: develop
    stage:
      install:
        exec: cp bin/* @PREFIX@/bin
        satisfies: install
stage:
  all:
    requires: [install]
    action: true
config:
  ci:
    doc: Continuous integration
    repos: [tools]
    env:
      CFLAGS: -O0 -g
    core:
      branch: release
"#;

    /// `default_config` names a configuration that is not declared.
    pub const MISSING_DEFAULT: &str = r#"
name: broken
configs: [dev]
default_config: prod
repo:
  core: {url: https://example.com/core.git}
"#;

    /// A stage cycle.
    pub const CYCLE: &str = r#"
name: cyclic
repo:
  core:
    url: https://example.com/core.git
    stage:
      a: {requires: [b]}
      b: {requires: [a]}
"#;

    /// A reference to a variable nobody defines.
    pub const UNDEFINED_REFERENCE: &str = r#"
name: undefined
repo:
  core:
    url: https://example.com/@NOWHERE@/core.git
    doc: Core sources
"#;
}

/// A temporary workspace root with a `.grip/grip.yaml` document.
pub struct GripFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl GripFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write the workspace document.
    pub fn with_document(self, content: &str) -> Self {
        self.temp_dir
            .child(".grip/grip.yaml")
            .write_str(content)
            .expect("Failed to write document");
        self
    }

    /// Create a checked-out repository directory holding its own `grip.yaml`.
    pub fn with_repo_fragment(self, repo: &str, content: &str) -> Self {
        self.temp_dir
            .child(repo)
            .child("grip.yaml")
            .write_str(content)
            .expect("Failed to write repository fragment");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// The `grip` binary pointed at this workspace, without colours.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("grip");
        cmd.current_dir(self.path())
            .env_remove("GRIP_ROOT")
            .env_remove("RUST_LOG")
            .arg("--color")
            .arg("never");
        cmd
    }
}

impl Default for GripFixture {
    fn default() -> Self {
        Self::new()
    }
}
