//! # Workspace
//!
//! Ties the pieces together for one workspace root: loads the document,
//! builds and resolves the selected configuration, persists state, and
//! drives workflows across repositories.
//!
//! ## Two-pass load
//!
//! The first pass reads `.grip/grip.yaml` alone, which is enough to learn
//! which repositories the configuration selects and where they are checked
//! out. The second pass merges each checked-out repository's own
//! `grip.yaml` into the document and builds, validates and resolves again.
//! Repositories that are not checked out yet simply contribute nothing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::buildplan::BuildPlan;
use crate::defaults;
use crate::descriptor::merge::merge_repo_fragment;
use crate::descriptor::{ConfigurationDescriptor, GripDescriptor, ResolvedRepo};
use crate::document;
use crate::env::Overrides;
use crate::error::{raise, Collect, Error, ErrorHandler, Propagate, Result};
use crate::location::RepoLocation;
use crate::state::StateStore;
use crate::suggestions;
use crate::vcs::{Changeset, TreeStatus, VcsProvider};
use crate::workflow::{self, Ancestry, RepoContext};

/// Contents of `.grip/local.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    pub config: String,
}

/// A synchronization action applied to every repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Fetch,
    Update,
    Merge,
    Commit(String),
    Publish,
}

impl SyncAction {
    fn label(&self) -> &'static str {
        match self {
            SyncAction::Fetch => "fetch",
            SyncAction::Update => "update",
            SyncAction::Merge => "merge",
            SyncAction::Commit(_) => "commit",
            SyncAction::Publish => "publish",
        }
    }
}

/// Outcome of a synchronization action for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub repo: String,
    pub changeset: Option<Changeset>,
    pub skipped: bool,
}

/// What `grip status` reports for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    pub repo: String,
    pub path: PathBuf,
    pub branch: String,
    pub workflow: String,
    pub checked_out: bool,
    pub current_branch: Option<String>,
    pub ancestry: Option<Ancestry>,
    pub modified: Option<String>,
    pub problem: Option<String>,
}

/// Find the workspace root at or above `start`.
pub fn locate(start: &Path) -> Result<PathBuf> {
    defaults::find_root(start).ok_or_else(|| Error::User {
        message: format!("no grip workspace found at or above {}", start.display()),
        hint: Some(suggestions::workspace_not_found_hint()),
    })
}

/// Configuration recorded in `.grip/local.yaml`, if any.
pub fn selected_config(root: &Path) -> Result<Option<String>> {
    let path = defaults::local_config_path(root);
    match fs::read_to_string(&path) {
        Ok(text) => {
            let local: LocalConfig = serde_yaml::from_str(&text)?;
            Ok(Some(local.config))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_selected_config(root: &Path, config: &str) -> Result<()> {
    let path = defaults::local_config_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = serde_yaml::to_string(&LocalConfig {
        config: config.to_string(),
    })?;
    fs::write(path, text)?;
    Ok(())
}

/// Build, validate and resolve `config` from the workspace document and any
/// checked-out repository fragments.
fn load_descriptor(
    root: &Path,
    requested: Option<&str>,
    overrides: Option<&Overrides>,
    handler: &dyn ErrorHandler,
) -> Result<(GripDescriptor, String)> {
    let mut raw = document::from_file(defaults::document_path(root))?;

    // First pass: the root document alone, only to locate checkouts.
    // Whatever it cannot resolve may come from a fragment, so problems are
    // left to the second pass.
    let deferred = Collect::new();
    let record = document::load_with(&raw, &deferred)?;
    let mut first = GripDescriptor::build(&record, root, &deferred)?;
    let config = match requested {
        Some(name) => name.to_string(),
        None => selected_config(root)?.unwrap_or_else(|| first.default_config.clone()),
    };
    if deferred.is_empty() {
        for (name, path) in first.checkout_paths(&config, overrides, &deferred)? {
            let path = path.join(defaults::REPO_FRAGMENT_FILE);
            if path.is_file() {
                merge_fragment_file(&mut raw, &name, &path, handler)?;
            }
        }
    }
    let unresolved = deferred.into_errors().len();
    if unresolved > 0 {
        debug!("first pass left {} problem(s) for the merged document", unresolved);
    }

    let record = document::load_with(&raw, handler)?;
    let mut descriptor = GripDescriptor::build(&record, root, handler)?;
    descriptor.prepare(&config, overrides, handler)?;
    Ok((descriptor, config))
}

/// Validate the fragment at `path` and merge it into `repo.<name>`. A
/// fragment with schema problems is reported and left out.
fn merge_fragment_file(raw: &mut serde_yaml::Value, name: &str, path: &Path, handler: &dyn ErrorHandler) -> Result<()> {
    debug!("merging fragment {}", path.display());
    let fragment = document::from_file(path)?;
    let problems = Collect::new();
    document::load_repo_fragment(&fragment, &problems)?;
    if problems.is_empty() {
        return merge_repo_fragment(raw, name, &fragment, handler);
    }
    for problem in problems.into_errors() {
        raise(handler, problem)?;
    }
    Ok(())
}

/// A loaded workspace with one selected configuration.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    config: String,
    descriptor: GripDescriptor,
    state: StateStore,
    overrides: Option<Overrides>,
}

impl Workspace {
    /// Load the workspace at `root`. Without `requested`, the configuration
    /// recorded by `configure` is used, else the document's default.
    pub fn open(
        root: &Path,
        requested: Option<&str>,
        overrides: Option<Overrides>,
        handler: &dyn ErrorHandler,
    ) -> Result<Self> {
        let (descriptor, config) = load_descriptor(root, requested, overrides.as_ref(), handler)?;
        let state = StateStore::load(&defaults::state_path(root))?;
        info!("opened workspace {} ({})", root.display(), config);
        Ok(Self {
            root: root.to_path_buf(),
            config,
            descriptor,
            state,
            overrides,
        })
    }

    /// Select a configuration and record it in `.grip/local.yaml`.
    ///
    /// Switching an already configured workspace to a different
    /// configuration requires `force`.
    pub fn configure(
        root: &Path,
        requested: Option<&str>,
        force: bool,
        overrides: Option<Overrides>,
        handler: &dyn ErrorHandler,
    ) -> Result<Self> {
        let current = selected_config(root)?;
        let name = match requested {
            Some(name) => name.to_string(),
            None => {
                // Problems are reported when the workspace is opened below.
                let deferred = Collect::new();
                let record = document::load_with(&document::from_file(defaults::document_path(root))?, &deferred)?;
                GripDescriptor::build(&record, root, &deferred)?.default_config
            }
        };

        if let Some(current) = current.as_deref() {
            if current != name && !force {
                return Err(Error::User {
                    message: format!(
                        "workspace is already configured as '{}'; refusing to switch to '{}'",
                        current, name
                    ),
                    hint: Some("Pass --force to reconfigure".to_string()),
                });
            }
        }

        let workspace = Self::open(root, Some(&name), overrides, handler)?;
        write_selected_config(root, &name)?;
        info!("configured workspace as '{}'", name);
        Ok(workspace)
    }

    /// Rebuild descriptors, picking up newly checked-out fragments.
    pub fn reload(&mut self, handler: &dyn ErrorHandler) -> Result<()> {
        let (descriptor, _) = load_descriptor(&self.root, Some(&self.config), self.overrides.as_ref(), handler)?;
        self.descriptor = descriptor;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_name(&self) -> &str {
        &self.config
    }

    pub fn descriptor(&self) -> &GripDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn configuration(&self) -> Result<&ConfigurationDescriptor> {
        self.descriptor
            .config(&self.config)
            .ok_or_else(|| Error::internal(format!("configuration '{}' not loaded", self.config)))
    }

    fn resolved_repos(&self) -> Result<Vec<ResolvedRepoRef>> {
        self.configuration()?
            .repos
            .values()
            .map(|repo| {
                repo.resolved
                    .clone()
                    .map(|resolved| ResolvedRepoRef {
                        name: repo.name.clone(),
                        resolved,
                    })
                    .ok_or_else(|| Error::internal(format!("repository '{}' not resolved", repo.name)))
            })
            .collect()
    }

    /// Relative local locations are taken relative to the workspace root.
    fn clone_source(&self, location: &RepoLocation) -> RepoLocation {
        match location {
            RepoLocation::Local(path) if path.is_relative() => RepoLocation::Local(self.root.join(path)),
            other => other.clone(),
        }
    }

    /// Clone every selected repository that is not checked out yet, then
    /// reload so their fragments take part. Returns the cloned names.
    pub fn checkout(&mut self, provider: &dyn VcsProvider, handler: &dyn ErrorHandler) -> Result<Vec<String>> {
        let mut cloned = Vec::new();
        for repo in self.resolved_repos()? {
            if provider.exists(&repo.resolved.path) {
                debug!("{} already checked out", repo.name);
                continue;
            }
            let location = repo.resolved.location.as_ref().ok_or_else(|| Error::Configuration {
                message: format!("repository '{}' has no url and is not checked out", repo.name),
                hint: Some(format!("Set 'repo.{}.url'", repo.name)),
            })?;
            let source = self.clone_source(location);
            info!("cloning {} from {}", repo.name, source);
            let vcs = provider.clone_repo(&source, &repo.resolved.branch, &repo.resolved.path, repo.resolved.shallow)?;
            let head = vcs.head()?;
            let depth = vcs.depth()?;
            self.state
                .update(&self.config, &repo.name, &head, &repo.resolved.branch, depth);
            cloned.push(repo.name);
        }
        if !cloned.is_empty() {
            self.reload(handler)?;
        }
        Ok(cloned)
    }

    /// Apply `action` to every checked-out repository using its workflow.
    ///
    /// Fetches run in parallel; the first failure is returned once all have
    /// finished. Other actions run one repository at a time and stop at the
    /// first failure. State is recorded for every repository that succeeded.
    pub fn sync(&mut self, action: &SyncAction, provider: &dyn VcsProvider) -> Result<Vec<SyncOutcome>> {
        self.sync_with(action, provider, &Propagate)
    }

    /// [`sync`](Self::sync), raising workflow refusals through `handler`.
    /// A repository whose action was refused and recovered is left as it was.
    pub fn sync_with(
        &mut self,
        action: &SyncAction,
        provider: &dyn VcsProvider,
        handler: &dyn ErrorHandler,
    ) -> Result<Vec<SyncOutcome>> {
        let repos = self.resolved_repos()?;
        let run = |repo: &ResolvedRepoRef, handler: &dyn ErrorHandler| -> Result<(SyncOutcome, Option<(Changeset, Option<u32>)>)> {
            if !provider.exists(&repo.resolved.path) {
                warn!("{} is not checked out; skipping {}", repo.name, action.label());
                return Ok((
                    SyncOutcome {
                        repo: repo.name.clone(),
                        changeset: None,
                        skipped: true,
                    },
                    None,
                ));
            }
            let workflow = workflow::lookup(&repo.resolved.workflow).ok_or_else(|| Error::RepoDesc {
                repo: repo.name.clone(),
                message: format!("unknown workflow '{}'", repo.resolved.workflow),
            })?;
            let vcs = provider.open(&repo.resolved.path)?;
            let ctx = RepoContext::new(&repo.name, &repo.resolved.branch, vcs.as_ref()).with_handler(handler);
            let changeset = match action {
                SyncAction::Fetch => Some(workflow.fetch(&ctx)?),
                SyncAction::Update => {
                    workflow.update(&ctx)?;
                    None
                }
                SyncAction::Merge => {
                    workflow.merge(&ctx)?;
                    None
                }
                SyncAction::Commit(message) => workflow.commit(&ctx, message)?,
                SyncAction::Publish => {
                    workflow.push(&ctx)?;
                    None
                }
            };
            let head = vcs.head()?;
            let depth = vcs.depth()?;
            Ok((
                SyncOutcome {
                    repo: repo.name.clone(),
                    changeset,
                    skipped: false,
                },
                Some((head, depth)),
            ))
        };

        let results: Vec<(String, String, Result<_>)> = match action {
            // Fetching never refuses.
            SyncAction::Fetch => repos
                .par_iter()
                .map(|repo| (repo.name.clone(), repo.resolved.branch.clone(), run(repo, &Propagate)))
                .collect(),
            _ => {
                let mut results = Vec::new();
                for repo in &repos {
                    let result = run(repo, handler);
                    let failed = result.is_err();
                    results.push((repo.name.clone(), repo.resolved.branch.clone(), result));
                    if failed {
                        break;
                    }
                }
                results
            }
        };

        let mut first_error = None;
        let mut outcomes = Vec::new();
        for (name, branch, result) in results {
            match result {
                Ok((outcome, recorded)) => {
                    if let Some((head, depth)) = recorded {
                        self.state.update(&self.config, &name, &head, &branch, depth);
                    }
                    outcomes.push(outcome);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => {
                // Keep what succeeded before reporting the failure.
                self.save_state()?;
                Err(e)
            }
            None => Ok(outcomes),
        }
    }

    /// Ancestry and working tree summary for every selected repository.
    pub fn status(&self, provider: &dyn VcsProvider) -> Result<Vec<RepoStatus>> {
        let mut statuses = Vec::new();
        for repo in self.resolved_repos()? {
            let mut status = RepoStatus {
                repo: repo.name.clone(),
                path: repo.resolved.path.clone(),
                branch: repo.resolved.branch.clone(),
                workflow: repo.resolved.workflow.clone(),
                checked_out: provider.exists(&repo.resolved.path),
                current_branch: None,
                ancestry: None,
                modified: None,
                problem: None,
            };
            if status.checked_out {
                let vcs = provider.open(&repo.resolved.path)?;
                status.current_branch = vcs.current_branch()?;
                let tree: TreeStatus = vcs.status()?;
                if !tree.is_clean() {
                    status.modified = Some(tree.describe());
                }
                match RepoContext::new(&repo.name, &repo.resolved.branch, vcs.as_ref()).ancestry() {
                    Ok(ancestry) => status.ancestry = Some(ancestry),
                    Err(e @ Error::Workflow { .. }) => status.problem = Some(e.to_string()),
                    Err(e) => return Err(e),
                }
            }
            statuses.push(status);
        }
        Ok(statuses)
    }

    pub fn build_plan(&self) -> Result<BuildPlan> {
        BuildPlan::compile(self.configuration()?, &defaults::stamp_dir(&self.root))
    }

    /// Write `.grip/build.ninja` when its content would change, or always
    /// with `force`. Returns whether the file was written.
    pub fn write_build_file(&self, force: bool) -> Result<bool> {
        let plan = self.build_plan()?;
        let path = defaults::build_file_path(&self.root);
        if !force {
            if let Ok(existing) = fs::read_to_string(&path) {
                if existing == plan.to_ninja()? {
                    debug!("{} is up to date", path.display());
                    return Ok(false);
                }
            }
        }
        plan.write(&path)?;
        Ok(true)
    }

    /// Flattened environment of the configuration, a repository, or a stage.
    pub fn environment(&self, repo: Option<&str>, stage: Option<&str>) -> Result<Vec<(String, String)>> {
        let config = self.configuration()?;
        let tree = self.descriptor.tree();
        let unknown = |what: &str, plural: &str, name: &str, known: Vec<&String>| Error::User {
            message: format!("unknown {} '{}' in configuration '{}'", what, name, config.name),
            hint: Some(suggestions::unknown_name_hint(plural, name, &known)),
        };
        match (repo, stage) {
            (None, None) => Ok(tree.as_ordered_pairs(config.env, true)),
            (Some(repo_name), stage_name) => {
                let repo = config
                    .repos
                    .get(repo_name)
                    .ok_or_else(|| unknown("repository", "repositories", repo_name, config.repos.keys().collect()))?;
                match stage_name {
                    None => Ok(tree.as_ordered_pairs(repo.env, true)),
                    Some(stage_name) => {
                        let stage = repo
                            .stages
                            .get(stage_name)
                            .ok_or_else(|| unknown("stage", "stages", stage_name, repo.stages.keys().collect()))?;
                        Ok(tree.as_ordered_pairs(stage.env, true))
                    }
                }
            }
            (None, Some(stage_name)) => {
                let stage = config
                    .stages
                    .get(stage_name)
                    .ok_or_else(|| unknown("global stage", "global stages", stage_name, config.stages.keys().collect()))?;
                Ok(tree.as_ordered_pairs(stage.env, true))
            }
        }
    }

    pub fn save_state(&self) -> Result<()> {
        self.state.save(&defaults::state_path(&self.root))
    }

    /// Recorded state per repository for the selected configuration.
    pub fn recorded_state(&self) -> BTreeMap<String, crate::state::RepoState> {
        self.state
            .repos(&self.config)
            .map(|(name, state)| (name.clone(), state.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct ResolvedRepoRef {
    name: String,
    resolved: ResolvedRepo,
}
