//! Persisted per-repository synchronization state.
//!
//! Stored as TOML, one table per configuration and one sub-table per
//! repository:
//!
//! ```toml
//! [ci.core]
//! changeset = "3f2a..."
//! branch = "main"
//! depth = 1
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    #[serde(default)]
    pub changeset: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

/// All recorded states, keyed by configuration then repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateStore {
    configs: BTreeMap<String, BTreeMap<String, RepoState>>,
}

impl StateStore {
    /// Load the store; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no state file at {}", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }

    pub fn get(&self, config: &str, repo: &str) -> Option<&RepoState> {
        self.configs.get(config)?.get(repo)
    }

    /// State for `repo` in `config`, created empty on first reference.
    pub fn entry(&mut self, config: &str, repo: &str) -> &mut RepoState {
        self.configs
            .entry(config.to_string())
            .or_default()
            .entry(repo.to_string())
            .or_default()
    }

    /// Record the outcome of a successful synchronization action.
    pub fn update(&mut self, config: &str, repo: &str, changeset: &str, branch: &str, depth: Option<u32>) {
        let state = self.entry(config, repo);
        state.changeset = changeset.to_string();
        state.branch = branch.to_string();
        state.depth = depth;
    }

    pub fn repos(&self, config: &str) -> impl Iterator<Item = (&String, &RepoState)> {
        self.configs.get(config).into_iter().flatten()
    }
}
