//! Repository descriptors.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::defaults::{GRIP_REPO, GRIP_REPO_PATH, GRIP_ROOT_PATH};
use crate::descriptor::stage::StageDescriptor;
use crate::env::{EnvTree, ScopeId};
use crate::error::Result;
use crate::location::RepoLocation;
use crate::schema::Record;

/// Fully substituted repository fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRepo {
    pub url: Option<String>,
    pub location: Option<RepoLocation>,
    pub branch: String,
    /// Checkout path relative to the workspace root.
    pub relative_path: String,
    /// Absolute checkout path.
    pub path: PathBuf,
    pub shallow: bool,
    pub workflow: String,
}

#[derive(Debug, Clone)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub url: Option<String>,
    pub branch: Option<String>,
    pub path: Option<String>,
    pub shallow: Option<bool>,
    pub workflow: Option<String>,
    pub doc: Option<String>,
    pub env: ScopeId,
    pub stages: BTreeMap<String, StageDescriptor>,
    pub resolved: Option<ResolvedRepo>,
}

impl RepositoryDescriptor {
    /// The unconfigured descriptor declared under `repo:` in the document.
    pub fn from_record(
        name: &str,
        record: &Record,
        tree: &mut EnvTree,
        parent: ScopeId,
    ) -> Result<Self> {
        let env = tree.add_scope(format!("repo {}", name), Some(parent));
        let mut repo = Self {
            name: name.to_string(),
            url: None,
            branch: None,
            path: None,
            shallow: None,
            workflow: None,
            doc: None,
            env,
            stages: BTreeMap::new(),
            resolved: None,
        };
        repo.overlay_fields(record);
        if let Some(env_record) = record.record("env") {
            tree.add_record(env, env_record)?;
        }
        if let Some(stages) = record.record("stage") {
            for (stage_name, value) in stages.dynamic() {
                let stage = StageDescriptor::from_record(
                    stage_name,
                    Some(name),
                    value.as_record(),
                    tree,
                    env,
                )?;
                repo.stages.insert(stage_name.clone(), stage);
            }
        }
        Ok(repo)
    }

    fn overlay_fields(&mut self, record: &Record) {
        let text = |key: &str| record.str(key).map(str::to_string);
        if let Some(url) = text("url") {
            self.url = Some(url);
        }
        if let Some(branch) = text("branch") {
            self.branch = Some(branch);
        }
        if let Some(path) = text("path") {
            self.path = Some(path);
        }
        if let Some(workflow) = text("workflow") {
            self.workflow = Some(workflow);
        }
        if let Some(doc) = text("doc") {
            self.doc = Some(doc);
        }
        if let Some(shallow) = record.bool("shallow") {
            self.shallow = Some(shallow);
        }
    }

    /// Clone this descriptor for a configuration whose scope is `parent`,
    /// then overlay the fields the configuration's fragment for this
    /// repository sets. Unset fields keep the base value.
    pub fn configured(
        &self,
        overrides: Option<&Record>,
        tree: &mut EnvTree,
        parent: ScopeId,
    ) -> Result<Self> {
        let mut repo = Self {
            stages: BTreeMap::new(),
            resolved: None,
            ..self.clone()
        };
        if let Some(overrides) = overrides {
            repo.overlay_fields(overrides);
        }

        repo.env = tree.add_scope(format!("repo {}", self.name), Some(parent));
        tree.add(repo.env, GRIP_REPO, &self.name)?;
        tree.add(
            repo.env,
            GRIP_REPO_PATH,
            &format!("@{}@/{}", GRIP_ROOT_PATH, repo.path_template()),
        )?;
        tree.copy_entries(self.env, repo.env)?;
        if let Some(env_record) = overrides.and_then(|r| r.record("env")) {
            tree.add_record(repo.env, env_record)?;
        }

        let stage_overrides = overrides.and_then(|r| r.record("stage"));
        let override_for = |name: &str| {
            stage_overrides
                .and_then(|stages| stages.dynamic_entry(name))
                .and_then(|value| value.as_record())
        };
        for (name, base) in &self.stages {
            let stage = base.configured(Some(&self.name), tree, repo.env, override_for(name))?;
            repo.stages.insert(name.clone(), stage);
        }
        if let Some(stages) = stage_overrides {
            for (name, value) in stages.dynamic() {
                if !repo.stages.contains_key(name) {
                    let stage = StageDescriptor::from_record(
                        name,
                        Some(&self.name),
                        value.as_record(),
                        tree,
                        repo.env,
                    )?;
                    repo.stages.insert(name.clone(), stage);
                }
            }
        }
        Ok(repo)
    }

    /// Checkout path template, relative to the workspace root.
    pub fn path_template(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }

    pub fn workflow_name<'a>(&'a self, default: &'a str) -> &'a str {
        self.workflow.as_deref().unwrap_or(default)
    }
}
