//! Stage descriptors and the references between them.

use std::fmt;
use std::path::PathBuf;

use crate::defaults::GRIP_STAGE;
use crate::env::{EnvTree, ScopeId};
use crate::error::{Error, Result};
use crate::schema::Record;

/// Identity of a stage within a configuration: owning repository (none for
/// global stages) plus stage name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageRef {
    pub repo: Option<String>,
    pub stage: String,
}

impl StageRef {
    pub fn global(stage: impl Into<String>) -> Self {
        Self {
            repo: None,
            stage: stage.into(),
        }
    }

    pub fn local(repo: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            repo: Some(repo.into()),
            stage: stage.into(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.repo.is_none()
    }
}

impl fmt::Display for StageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repo {
            Some(repo) => write!(f, "{}.{}", repo, self.stage),
            None => write!(f, "{}", self.stage),
        }
    }
}

/// How a dependency was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyKind {
    /// `name`: a stage of the same repository, else a global stage.
    Local(String),
    /// `.name`: a stage of the same repository only.
    LocalForced(String),
    /// `repo.name`: a stage of another repository.
    Qualified { repo: String, stage: String },
}

/// A `requires` or `satisfies` entry. The target is filled in by
/// configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDependency {
    raw: String,
    kind: DependencyKind,
    target: Option<StageRef>,
}

impl StageDependency {
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = || Error::Configuration {
            message: format!("malformed stage reference '{}'", raw),
            hint: Some("Use 'stage', '.stage' or 'repo.stage'".to_string()),
        };
        let kind = if let Some(name) = raw.strip_prefix('.') {
            DependencyKind::LocalForced(name.to_string())
        } else if let Some((repo, stage)) = raw.split_once('.') {
            if repo.is_empty() {
                return Err(malformed());
            }
            DependencyKind::Qualified {
                repo: repo.to_string(),
                stage: stage.to_string(),
            }
        } else {
            DependencyKind::Local(raw.to_string())
        };
        let stage = match &kind {
            DependencyKind::Local(s) | DependencyKind::LocalForced(s) => s,
            DependencyKind::Qualified { stage, .. } => stage,
        };
        if stage.is_empty() || stage.contains('.') {
            return Err(malformed());
        }
        Ok(Self {
            raw: raw.to_string(),
            kind,
            target: None,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    pub fn target(&self) -> Option<&StageRef> {
        self.target.as_ref()
    }

    pub(crate) fn set_target(&mut self, target: Option<StageRef>) {
        self.target = target;
    }
}

impl fmt::Display for StageDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Fully substituted stage fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    pub wd: PathBuf,
    pub exec: Option<String>,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub name: String,
    pub repo: Option<String>,
    pub wd: Option<String>,
    pub exec: Option<String>,
    pub env: ScopeId,
    pub requires: Vec<StageDependency>,
    pub satisfies: Option<StageDependency>,
    pub doc: Option<String>,
    pub action: bool,
    pub resolved: Option<ResolvedStage>,
}

impl StageDescriptor {
    /// An empty stage with its own scope under `parent`.
    pub fn new(name: &str, repo: Option<&str>, tree: &mut EnvTree, parent: ScopeId) -> Result<Self> {
        let stage_ref = StageRef {
            repo: repo.map(str::to_string),
            stage: name.to_string(),
        };
        let env = tree.add_scope(format!("stage {}", stage_ref), Some(parent));
        tree.add(env, GRIP_STAGE, name)?;
        Ok(Self {
            name: name.to_string(),
            repo: repo.map(str::to_string),
            wd: None,
            exec: None,
            env,
            requires: Vec::new(),
            satisfies: None,
            doc: None,
            action: false,
            resolved: None,
        })
    }

    /// A stage built from a document fragment.
    pub fn from_record(
        name: &str,
        repo: Option<&str>,
        record: Option<&Record>,
        tree: &mut EnvTree,
        parent: ScopeId,
    ) -> Result<Self> {
        let mut stage = Self::new(name, repo, tree, parent)?;
        if let Some(record) = record {
            stage.overlay(record, tree)?;
        }
        Ok(stage)
    }

    /// Replace every field that `record` sets explicitly.
    pub fn overlay(&mut self, record: &Record, tree: &mut EnvTree) -> Result<()> {
        if let Some(wd) = record.str("wd") {
            self.wd = Some(wd.to_string());
        }
        if let Some(exec) = record.str("exec") {
            self.exec = Some(exec.to_string());
        }
        if let Some(doc) = record.str("doc") {
            self.doc = Some(doc.to_string());
        }
        if let Some(action) = record.bool("action") {
            self.action = action;
        }
        if let Some(requires) = record.str_list("requires") {
            self.requires = requires
                .iter()
                .map(|raw| StageDependency::parse(raw))
                .collect::<Result<_>>()?;
        }
        if let Some(satisfies) = record.str("satisfies") {
            self.satisfies = Some(StageDependency::parse(satisfies)?);
        }
        if let Some(env) = record.record("env") {
            tree.add_record(self.env, env)?;
        }
        Ok(())
    }

    /// Clone this stage into a new scope under `parent`, then overlay the
    /// fields `overrides` sets. The source is left untouched.
    pub fn configured(
        &self,
        repo: Option<&str>,
        tree: &mut EnvTree,
        parent: ScopeId,
        overrides: Option<&Record>,
    ) -> Result<Self> {
        let scope_name = tree.scope(self.env).name().to_string();
        let env = tree.add_scope(scope_name, Some(parent));
        tree.copy_entries(self.env, env)?;
        let mut stage = Self {
            name: self.name.clone(),
            repo: repo.map(str::to_string),
            wd: self.wd.clone(),
            exec: self.exec.clone(),
            env,
            requires: self.requires.clone(),
            satisfies: self.satisfies.clone(),
            doc: self.doc.clone(),
            action: self.action,
            resolved: None,
        };
        for dep in stage.requires.iter_mut().chain(stage.satisfies.iter_mut()) {
            dep.set_target(None);
        }
        if let Some(overrides) = overrides {
            stage.overlay(overrides, tree)?;
        }
        Ok(stage)
    }

    pub fn stage_ref(&self) -> StageRef {
        StageRef {
            repo: self.repo.clone(),
            stage: self.name.clone(),
        }
    }
}
