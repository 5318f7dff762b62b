//! Default values and on-disk layout of a grip workspace.
//!
//! This module provides centralized names and paths used across the library
//! and the commands, ensuring consistency and avoiding duplication.
//!
//! ```text
//! <root>/
//!   .grip/
//!     grip.yaml      workspace document
//!     local.yaml     selected configuration
//!     state.toml     per-repository synchronization state
//!     build.ninja    generated build file
//!     stamps/        stage completion markers
//!   <repo path>/
//!     grip.yaml      optional repository fragment
//! ```

use std::path::{Path, PathBuf};

/// Directory holding grip's own files, relative to the workspace root.
pub const GRIP_DIR: &str = ".grip";
pub const DOCUMENT_FILE: &str = "grip.yaml";
pub const LOCAL_CONFIG_FILE: &str = "local.yaml";
pub const STATE_FILE: &str = "state.toml";
pub const BUILD_FILE: &str = "build.ninja";
pub const STAMP_DIR: &str = "stamps";
/// Repository-local fragment, relative to the repository checkout.
pub const REPO_FRAGMENT_FILE: &str = "grip.yaml";

/// Configuration name used when a document declares none.
pub const DEFAULT_CONFIG: &str = "default";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_WORKFLOW: &str = "readonly";
pub const UPSTREAM_REMOTE: &str = "origin";

/// Environment variable naming the workspace root, consulted by the CLI.
pub const ROOT_ENV_VAR: &str = "GRIP_ROOT";

// Built-in environment keys.
pub const GRIP_ROOT_PATH: &str = "GRIP_ROOT_PATH";
pub const GRIP_ROOT_NAME: &str = "GRIP_ROOT_NAME";
pub const GRIP_CONFIG: &str = "GRIP_CONFIG";
pub const GRIP_REPO: &str = "GRIP_REPO";
pub const GRIP_REPO_PATH: &str = "GRIP_REPO_PATH";
pub const GRIP_STAGE: &str = "GRIP_STAGE";

pub fn grip_dir(root: &Path) -> PathBuf {
    root.join(GRIP_DIR)
}

pub fn document_path(root: &Path) -> PathBuf {
    grip_dir(root).join(DOCUMENT_FILE)
}

pub fn local_config_path(root: &Path) -> PathBuf {
    grip_dir(root).join(LOCAL_CONFIG_FILE)
}

pub fn state_path(root: &Path) -> PathBuf {
    grip_dir(root).join(STATE_FILE)
}

pub fn build_file_path(root: &Path) -> PathBuf {
    grip_dir(root).join(BUILD_FILE)
}

pub fn stamp_dir(root: &Path) -> PathBuf {
    grip_dir(root).join(STAMP_DIR)
}

/// Walk up from `start` to the first directory containing a workspace
/// document.
pub fn find_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| document_path(dir).is_file())
        .map(Path::to_path_buf)
}
