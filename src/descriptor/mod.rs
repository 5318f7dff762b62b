//! # Descriptor Model
//!
//! Builds the repository, stage and configuration object graph from a loaded
//! document [`Record`], validates it for one selected configuration, and
//! drives the environment resolver over every scope.
//!
//! ## Inheritance
//!
//! The document declares unconfigured ("base") repositories and global
//! stages. Selecting a configuration clones each included base descriptor
//! into fresh scopes and overlays only the fields the configuration's
//! fragment sets explicitly; everything else falls through to the base.
//! Sources are never mutated, so every configuration can be built from the
//! same [`GripDescriptor`].
//!
//! Scopes are chained `root -> config -> repo -> stage`, with global stages
//! hanging directly off the configuration scope.
//!
//! ## Validation
//!
//! Stage visibility depends on which repositories a configuration includes,
//! so dependency references are checked per configuration, never against the
//! whole document. See [`GripDescriptor::validate`].

pub mod merge;
pub mod repo;
pub mod stage;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::Regex;

pub use repo::{RepositoryDescriptor, ResolvedRepo};
pub use stage::{DependencyKind, ResolvedStage, StageDependency, StageDescriptor, StageRef};

use crate::defaults::{
    DEFAULT_BRANCH, DEFAULT_CONFIG, DEFAULT_WORKFLOW, GRIP_CONFIG, GRIP_ROOT_NAME, GRIP_ROOT_PATH,
};
use crate::env::{EnvTree, Overrides, ScopeId};
use crate::error::{raise, Error, ErrorHandler, Result};
use crate::location::RepoLocation;
use crate::schema::Record;
use crate::suggestions;
use crate::workflow;

/// Names of workspaces, configurations and repositories.
const IDENTIFIER: &str = r"^[A-Za-z0-9_]+$";
/// Stage names additionally allow `-`.
const STAGE_IDENTIFIER: &str = r"^[A-Za-z0-9_-]+$";

/// Dependency edges between stages: each stage maps to the stages it
/// depends on.
pub type DependencyGraph = BTreeMap<StageRef, Vec<StageRef>>;

/// One selected way of assembling the workspace.
#[derive(Debug, Clone)]
pub struct ConfigurationDescriptor {
    pub name: String,
    pub doc: Option<String>,
    pub env: ScopeId,
    pub repos: BTreeMap<String, RepositoryDescriptor>,
    /// Global stages of this configuration.
    pub stages: BTreeMap<String, StageDescriptor>,
    stray_overrides: Vec<String>,
    validated: bool,
    resolved: bool,
}

impl ConfigurationDescriptor {
    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn repo(&self, name: &str) -> Option<&RepositoryDescriptor> {
        self.repos.get(name)
    }

    pub fn stage(&self, stage_ref: &StageRef) -> Option<&StageDescriptor> {
        match &stage_ref.repo {
            Some(repo) => self.repos.get(repo)?.stages.get(&stage_ref.stage),
            None => self.stages.get(&stage_ref.stage),
        }
    }

    /// Repository stages in repository order, then global stages.
    pub fn all_stages(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.repos
            .values()
            .flat_map(|repo| repo.stages.values())
            .chain(self.stages.values())
    }

    /// Dependency edges of a validated configuration.
    ///
    /// `requires` entries become direct edges. A global stage additionally
    /// depends on every repository stage of the same name and on every stage
    /// that `satisfies` it. An unresolved reference is an internal error.
    pub fn dependency_graph(&self) -> Result<DependencyGraph> {
        self.edges(true)
    }

    fn edges(&self, strict: bool) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for stage in self.all_stages() {
            let mut deps = Vec::new();
            for dep in &stage.requires {
                match dep.target() {
                    Some(target) => deps.push(target.clone()),
                    None if strict => {
                        return Err(Error::internal(format!(
                            "stage '{}' has unresolved dependency '{}'",
                            stage.stage_ref(),
                            dep
                        )))
                    }
                    None => {}
                }
            }
            if stage.repo.is_none() {
                for repo in self.repos.values() {
                    if repo.stages.contains_key(&stage.name) {
                        deps.push(StageRef::local(&repo.name, &stage.name));
                    }
                }
            }
            graph.insert(stage.stage_ref(), deps);
        }

        for stage in self.all_stages() {
            let Some(dep) = &stage.satisfies else {
                continue;
            };
            match dep.target() {
                Some(target) => {
                    let deps = graph.get_mut(target).ok_or_else(|| {
                        Error::internal(format!("'{}' satisfies unknown stage '{}'", stage.stage_ref(), target))
                    })?;
                    deps.push(stage.stage_ref());
                }
                None if strict => {
                    return Err(Error::internal(format!(
                        "stage '{}' has unresolved satisfies '{}'",
                        stage.stage_ref(),
                        dep
                    )))
                }
                None => {}
            }
        }

        for deps in graph.values_mut() {
            let mut seen = BTreeSet::new();
            deps.retain(|d| seen.insert(d.clone()));
        }
        Ok(graph)
    }
}

/// Find a dependency cycle, returned as the path that closes it
/// (`a -> b -> a` yields `[a, b, a]`).
pub fn find_cycle(graph: &DependencyGraph) -> Option<Vec<StageRef>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Active,
        Done,
    }

    fn visit(
        node: &StageRef,
        graph: &DependencyGraph,
        marks: &mut BTreeMap<StageRef, Mark>,
        path: &mut Vec<StageRef>,
    ) -> Option<Vec<StageRef>> {
        match marks.get(node) {
            Some(Mark::Done) => return None,
            Some(Mark::Active) => {
                let start = path.iter().position(|n| n == node).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(node.clone());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(node.clone(), Mark::Active);
        path.push(node.clone());
        for dep in graph.get(node).into_iter().flatten() {
            if let Some(cycle) = visit(dep, graph, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks.insert(node.clone(), Mark::Done);
        None
    }

    let mut marks = BTreeMap::new();
    let mut path = Vec::new();
    graph
        .keys()
        .find_map(|node| visit(node, graph, &mut marks, &mut path))
}

/// Which stage names a configuration can see.
struct Visibility {
    repos: BTreeMap<String, BTreeSet<String>>,
    globals: BTreeSet<String>,
}

impl Visibility {
    fn of(config: &ConfigurationDescriptor) -> Self {
        Self {
            repos: config
                .repos
                .iter()
                .map(|(name, repo)| (name.clone(), repo.stages.keys().cloned().collect()))
                .collect(),
            globals: config.stages.keys().cloned().collect(),
        }
    }

    fn requires(&self, owner: Option<&str>, kind: &DependencyKind, config: &str) -> std::result::Result<StageRef, String> {
        match kind {
            DependencyKind::Local(name) => {
                if let Some(repo) = owner {
                    if self.repos.get(repo).is_some_and(|s| s.contains(name)) {
                        return Ok(StageRef::local(repo, name));
                    }
                }
                if self.globals.contains(name) {
                    Ok(StageRef::global(name))
                } else {
                    Err(format!("no stage named '{}' in configuration '{}'", name, config))
                }
            }
            DependencyKind::LocalForced(name) => match owner {
                Some(repo) if self.repos.get(repo).is_some_and(|s| s.contains(name)) => {
                    Ok(StageRef::local(repo, name))
                }
                Some(repo) => Err(format!("repository '{}' has no stage '{}'", repo, name)),
                None => Err("a global stage has no local stages".to_string()),
            },
            DependencyKind::Qualified { repo, stage } => match self.repos.get(repo) {
                None => Err(format!(
                    "repository '{}' is not part of configuration '{}'",
                    repo, config
                )),
                Some(stages) if stages.contains(stage) => Ok(StageRef::local(repo, stage)),
                Some(_) => Err(format!("repository '{}' has no stage '{}'", repo, stage)),
            },
        }
    }

    fn satisfies(&self, kind: &DependencyKind) -> std::result::Result<StageRef, String> {
        match kind {
            DependencyKind::Local(name) if self.globals.contains(name) => Ok(StageRef::global(name)),
            DependencyKind::Local(name) => Err(format!("no global stage named '{}'", name)),
            _ => Err("only a global stage can be satisfied".to_string()),
        }
    }
}

/// The root descriptor: every repository and global stage the document
/// declares, plus the configurations built from them so far.
#[derive(Debug, Clone)]
pub struct GripDescriptor {
    pub name: String,
    pub doc: Option<String>,
    pub default_config: String,
    pub config_names: Vec<String>,
    pub base_repos: Vec<String>,
    /// Unconfigured repositories.
    pub repos: BTreeMap<String, RepositoryDescriptor>,
    pub stage_names: Vec<String>,
    pub workflow: String,
    pub env: ScopeId,
    pub root_path: PathBuf,
    global_stages: BTreeMap<String, StageDescriptor>,
    config_fragments: BTreeMap<String, Record>,
    configs: BTreeMap<String, ConfigurationDescriptor>,
    tree: EnvTree,
}

impl GripDescriptor {
    /// Build the unconfigured descriptor tree from a loaded document.
    ///
    /// Document-level consistency is checked here, before any repository is
    /// looked at: the default configuration must be declared, `base_repos`
    /// must name declared repositories, and `config:` may only carry
    /// fragments for declared configurations.
    pub fn build(record: &Record, root_path: &Path, handler: &dyn ErrorHandler) -> Result<Self> {
        let name = record
            .str("name")
            .map(str::to_string)
            .or_else(|| {
                root_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "grip".to_string());

        let fragments: Vec<(String, Record)> = record
            .record("config")
            .map(|configs| {
                configs
                    .dynamic()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_record().cloned().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();

        let config_names = match record.str_list("configs") {
            Some(names) if !names.is_empty() => names,
            _ if !fragments.is_empty() => fragments.iter().map(|(k, _)| k.clone()).collect(),
            _ => vec![DEFAULT_CONFIG.to_string()],
        };
        let default_config = record
            .str("default_config")
            .map(str::to_string)
            .unwrap_or_else(|| config_names[0].clone());
        if !config_names.contains(&default_config) {
            raise(
                handler,
                Error::Configuration {
                    message: format!("default configuration '{}' is not declared", default_config),
                    hint: Some(suggestions::unknown_name_hint("configurations", &default_config, &config_names)),
                },
            )?;
        }

        let repo_records: Vec<(String, Record)> = record
            .record("repo")
            .map(|repos| {
                repos
                    .dynamic()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_record().cloned().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();

        let base_repos = record
            .str_list("base_repos")
            .unwrap_or_else(|| repo_records.iter().map(|(k, _)| k.clone()).collect());
        for base in &base_repos {
            if !repo_records.iter().any(|(k, _)| k == base) {
                raise(
                    handler,
                    Error::Configuration {
                        message: format!("base repository '{}' is not declared", base),
                        hint: Some(format!("Add a 'repo.{}' entry", base)),
                    },
                )?;
            }
        }

        let mut config_fragments = BTreeMap::new();
        for (config, fragment) in fragments {
            if !config_names.contains(&config) {
                raise(
                    handler,
                    Error::Configuration {
                        message: format!("fragment for undeclared configuration '{}'", config),
                        hint: Some("Add it to 'configs'".to_string()),
                    },
                )?;
                continue;
            }
            config_fragments.insert(config, fragment);
        }

        let mut tree = EnvTree::new();
        let env = tree.add_scope("root", None);
        tree.add(env, GRIP_ROOT_PATH, &root_path.to_string_lossy())?;
        tree.add(env, GRIP_ROOT_NAME, &name)?;
        if let Some(env_record) = record.record("env") {
            tree.add_record(env, env_record)?;
        }

        let mut repos = BTreeMap::new();
        for (repo_name, repo_record) in &repo_records {
            let repo = RepositoryDescriptor::from_record(repo_name, repo_record, &mut tree, env)?;
            repos.insert(repo_name.clone(), repo);
        }

        let mut stage_names = record.str_list("stages").unwrap_or_default();
        let stage_fragments = record.record("stage");
        if let Some(fragments) = stage_fragments {
            for (stage_name, _) in fragments.dynamic() {
                if !stage_names.contains(stage_name) {
                    stage_names.push(stage_name.clone());
                }
            }
        }
        let mut global_stages = BTreeMap::new();
        for stage_name in &stage_names {
            let fragment = stage_fragments
                .and_then(|f| f.dynamic_entry(stage_name))
                .and_then(|v| v.as_record());
            let stage = StageDescriptor::from_record(stage_name, None, fragment, &mut tree, env)?;
            global_stages.insert(stage_name.clone(), stage);
        }

        debug!(
            "built descriptor '{}': {} repositories, {} global stages, configurations {:?}",
            name,
            repos.len(),
            global_stages.len(),
            config_names
        );

        Ok(Self {
            name,
            doc: record.str("doc").map(str::to_string),
            default_config,
            config_names,
            base_repos,
            repos,
            stage_names,
            workflow: record
                .str("workflow")
                .unwrap_or(DEFAULT_WORKFLOW)
                .to_string(),
            env,
            root_path: root_path.to_path_buf(),
            global_stages,
            config_fragments,
            configs: BTreeMap::new(),
            tree,
        })
    }

    pub fn tree(&self) -> &EnvTree {
        &self.tree
    }

    pub fn config(&self, name: &str) -> Option<&ConfigurationDescriptor> {
        self.configs.get(name)
    }

    /// Repositories `name` includes, without building the configuration.
    pub fn selected_repos(&self, name: &str) -> Result<Vec<String>> {
        self.check_declared(name)?;
        let mut selected = self.base_repos.clone();
        let extra = self
            .config_fragments
            .get(name)
            .and_then(|f| f.str_list("repos"))
            .unwrap_or_default();
        for repo in extra {
            if !selected.contains(&repo) {
                selected.push(repo);
            }
        }
        Ok(selected)
    }

    fn check_declared(&self, name: &str) -> Result<()> {
        if self.config_names.iter().any(|c| c == name) {
            Ok(())
        } else {
            Err(Error::Configuration {
                message: format!("unknown configuration '{}'", name),
                hint: Some(suggestions::unknown_name_hint("configurations", name, &self.config_names)),
            })
        }
    }

    /// Build the descriptor for configuration `name` if not built yet.
    pub fn configure(&mut self, name: &str, handler: &dyn ErrorHandler) -> Result<&ConfigurationDescriptor> {
        if !self.configs.contains_key(name) {
            let config = self.build_configuration(name, handler)?;
            self.configs.insert(name.to_string(), config);
        }
        self.configs
            .get(name)
            .ok_or_else(|| Error::internal(format!("configuration '{}' vanished", name)))
    }

    /// Checkout paths of the repositories configuration `name` selects.
    ///
    /// Only repository scopes and path templates are resolved; nothing is
    /// validated. References that do not resolve go through `handler`,
    /// which leaves this descriptor unfit for [`prepare`](Self::prepare).
    /// Used to find repository fragments before the merged document exists.
    pub fn checkout_paths(
        &mut self,
        name: &str,
        overrides: Option<&Overrides>,
        handler: &dyn ErrorHandler,
    ) -> Result<Vec<(String, PathBuf)>> {
        self.configure(name, handler)?;
        let config = self
            .configs
            .get(name)
            .ok_or_else(|| Error::internal(format!("configuration '{}' not built", name)))?;
        let mut paths = Vec::with_capacity(config.repos.len());
        for repo in config.repos.values() {
            self.tree.resolve(repo.env, overrides, handler)?;
            let relative = self
                .tree
                .expand(repo.env, "path", repo.path_template(), overrides, handler)?;
            paths.push((repo.name.clone(), self.root_path.join(relative)));
        }
        Ok(paths)
    }

    fn build_configuration(&mut self, name: &str, handler: &dyn ErrorHandler) -> Result<ConfigurationDescriptor> {
        let selected = self.selected_repos(name)?;
        let fragment = self.config_fragments.get(name);
        let tree = &mut self.tree;

        let env = tree.add_scope(format!("config {}", name), Some(self.env));
        tree.add(env, GRIP_CONFIG, name)?;
        if let Some(env_record) = fragment.and_then(|f| f.record("env")) {
            tree.add_record(env, env_record)?;
        }

        let repo_override = |repo: &str| {
            fragment
                .and_then(|f| f.dynamic_entry(repo))
                .and_then(|v| v.as_record())
        };

        let mut repos = BTreeMap::new();
        for repo_name in &selected {
            match self.repos.get(repo_name) {
                Some(base) => {
                    let repo = base.configured(repo_override(repo_name), tree, env)?;
                    repos.insert(repo_name.clone(), repo);
                }
                None => {
                    raise(
                        handler,
                        Error::Configuration {
                            message: format!(
                                "configuration '{}' includes undeclared repository '{}'",
                                name, repo_name
                            ),
                            hint: Some(format!("Add a 'repo.{}' entry", repo_name)),
                        },
                    )?;
                }
            }
        }

        let stray_overrides = fragment
            .map(|f| {
                f.dynamic()
                    .iter()
                    .map(|(k, _)| k.clone())
                    .filter(|k| !repos.contains_key(k))
                    .collect()
            })
            .unwrap_or_default();

        let stage_fragments = fragment.and_then(|f| f.record("stage"));
        let stage_override = |stage: &str| {
            stage_fragments
                .and_then(|f| f.dynamic_entry(stage))
                .and_then(|v| v.as_record())
        };
        let mut stages = BTreeMap::new();
        for (stage_name, base) in &self.global_stages {
            let stage = base.configured(None, tree, env, stage_override(stage_name))?;
            stages.insert(stage_name.clone(), stage);
        }
        if let Some(fragments) = stage_fragments {
            for (stage_name, value) in fragments.dynamic() {
                if !stages.contains_key(stage_name) {
                    let stage = StageDescriptor::from_record(stage_name, None, value.as_record(), tree, env)?;
                    stages.insert(stage_name.clone(), stage);
                }
            }
        }

        info!(
            "configuration '{}': repositories {:?}",
            name,
            repos.keys().collect::<Vec<_>>()
        );

        Ok(ConfigurationDescriptor {
            name: name.to_string(),
            doc: fragment.and_then(|f| f.str("doc")).map(str::to_string),
            env,
            repos,
            stages,
            stray_overrides,
            validated: false,
            resolved: false,
        })
    }

    /// Validate configuration `name`, building it first if needed.
    ///
    /// Checks identifier syntax, that the configuration only overrides
    /// repositories it includes, that every workflow is known, that every
    /// `requires` and `satisfies` entry resolves within this configuration,
    /// and that stage dependencies are acyclic. Resolved targets are recorded
    /// on each [`StageDependency`].
    pub fn validate(&mut self, name: &str, handler: &dyn ErrorHandler) -> Result<()> {
        self.configure(name, handler)?;
        let default_workflow = self.workflow.clone();
        let config = self
            .configs
            .get_mut(name)
            .ok_or_else(|| Error::internal(format!("configuration '{}' not built", name)))?;
        validate_configuration(config, &default_workflow, handler)
    }

    /// Resolve every scope of configuration `name` and substitute the
    /// repository and stage templates.
    pub fn resolve(&mut self, name: &str, overrides: Option<&Overrides>, handler: &dyn ErrorHandler) -> Result<()> {
        let config = self
            .configs
            .get_mut(name)
            .ok_or_else(|| Error::internal(format!("configuration '{}' not built", name)))?;
        if !config.validated {
            return Err(Error::internal(format!(
                "configuration '{}' resolved before validation",
                name
            )));
        }
        if config.resolved {
            return Ok(());
        }
        let resolver = Resolver {
            tree: &mut self.tree,
            root_path: &self.root_path,
            default_workflow: &self.workflow,
            overrides,
            handler,
        };
        resolver.configuration(config)
    }

    /// Configure, validate and resolve `name` in one step.
    pub fn prepare(&mut self, name: &str, overrides: Option<&Overrides>, handler: &dyn ErrorHandler) -> Result<&ConfigurationDescriptor> {
        self.validate(name, handler)?;
        self.resolve(name, overrides, handler)?;
        self.config(name)
            .ok_or_else(|| Error::internal(format!("configuration '{}' not built", name)))
    }
}

fn validate_configuration(
    config: &mut ConfigurationDescriptor,
    default_workflow: &str,
    handler: &dyn ErrorHandler,
) -> Result<()> {
    let identifier = Regex::new(IDENTIFIER)?;
    let stage_identifier = Regex::new(STAGE_IDENTIFIER)?;

    if !identifier.is_match(&config.name) {
        raise(handler, Error::configuration(format!("invalid configuration name '{}'", config.name)))?;
    }

    for stray in &config.stray_overrides {
        raise(
            handler,
            Error::Configuration {
                message: format!(
                    "configuration '{}' overrides repository '{}' which it does not include",
                    config.name, stray
                ),
                hint: Some("Add the repository to 'base_repos' or the configuration's 'repos'".to_string()),
            },
        )?;
    }

    for repo in config.repos.values() {
        if !identifier.is_match(&repo.name) {
            raise(
                handler,
                Error::RepoDesc {
                    repo: repo.name.clone(),
                    message: "invalid repository name (letters, digits and '_' only)".to_string(),
                },
            )?;
        }
        let workflow_name = repo.workflow_name(default_workflow);
        if workflow::lookup(workflow_name).is_none() {
            raise(
                handler,
                Error::RepoDesc {
                    repo: repo.name.clone(),
                    message: format!(
                        "unknown workflow '{}' (known: {})",
                        workflow_name,
                        workflow::names().join(", ")
                    ),
                },
            )?;
        }
    }

    let visibility = Visibility::of(config);
    let config_name = config.name.clone();
    let stages = config
        .repos
        .values_mut()
        .flat_map(|repo| repo.stages.values_mut())
        .chain(config.stages.values_mut());
    for stage in stages {
        let owner = stage.stage_ref();
        if !stage_identifier.is_match(&stage.name) {
            raise(handler, Error::configuration(format!("invalid stage name '{}'", owner)))?;
        }
        for dep in stage.requires.iter_mut() {
            match visibility.requires(owner.repo.as_deref(), dep.kind(), &config_name) {
                Ok(target) => dep.set_target(Some(target)),
                Err(reason) => {
                    dep.set_target(None);
                    raise(
                        handler,
                        Error::configuration(format!(
                            "stage '{}' requires '{}': {}",
                            owner, dep, reason
                        )),
                    )?;
                }
            }
        }
        if let Some(dep) = stage.satisfies.as_mut() {
            match visibility.satisfies(dep.kind()) {
                Ok(target) => dep.set_target(Some(target)),
                Err(reason) => {
                    dep.set_target(None);
                    raise(
                        handler,
                        Error::configuration(format!(
                            "stage '{}' satisfies '{}': {}",
                            owner, dep, reason
                        )),
                    )?;
                }
            }
        }
    }

    let graph = config.edges(false)?;
    if let Some(cycle) = find_cycle(&graph) {
        let path: Vec<String> = cycle.iter().map(StageRef::to_string).collect();
        raise(
            handler,
            Error::configuration(format!("stage dependency cycle: {}", path.join(" -> "))),
        )?;
    }

    config.validated = true;
    Ok(())
}

struct Resolver<'a> {
    tree: &'a mut EnvTree,
    root_path: &'a Path,
    default_workflow: &'a str,
    overrides: Option<&'a Overrides>,
    handler: &'a dyn ErrorHandler,
}

impl Resolver<'_> {
    fn configuration(mut self, config: &mut ConfigurationDescriptor) -> Result<()> {
        self.tree.resolve(config.env, self.overrides, self.handler)?;
        for repo in config.repos.values_mut() {
            self.repo(repo)?;
        }
        let root = self.root_path.to_path_buf();
        for stage in config.stages.values_mut() {
            self.stage(stage, &root)?;
        }
        config.resolved = true;
        Ok(())
    }

    fn expand(&self, scope: ScopeId, what: &str, template: &str) -> Result<String> {
        self.tree.expand(scope, what, template, self.overrides, self.handler)
    }

    fn repo(&mut self, repo: &mut RepositoryDescriptor) -> Result<()> {
        self.tree.resolve(repo.env, self.overrides, self.handler)?;

        let url = match &repo.url {
            Some(template) => Some(self.expand(repo.env, "url", template)?),
            None => None,
        };
        let location = match url.as_deref().map(RepoLocation::parse) {
            Some(Ok(location)) => Some(location),
            Some(Err(e)) => {
                raise(self.handler, e)?;
                None
            }
            None => None,
        };
        let branch = self.expand(repo.env, "branch", repo.branch.as_deref().unwrap_or(DEFAULT_BRANCH))?;
        let relative_path = self.expand(repo.env, "path", repo.path_template())?;
        let path = self.root_path.join(&relative_path);

        for stage in repo.stages.values_mut() {
            self.stage(stage, &path)?;
        }

        repo.resolved = Some(ResolvedRepo {
            url,
            location,
            branch,
            relative_path,
            path,
            shallow: repo.shallow.unwrap_or(false),
            workflow: repo.workflow_name(self.default_workflow).to_string(),
        });
        Ok(())
    }

    fn stage(&mut self, stage: &mut StageDescriptor, base: &Path) -> Result<()> {
        self.tree.resolve(stage.env, self.overrides, self.handler)?;
        let wd = match &stage.wd {
            Some(template) => {
                let wd = PathBuf::from(self.expand(stage.env, "wd", template)?);
                if wd.is_absolute() {
                    wd
                } else {
                    base.join(wd)
                }
            }
            None => base.to_path_buf(),
        };
        let exec = match &stage.exec {
            Some(template) => Some(self.expand(stage.env, "exec", template)?),
            None => None,
        };
        stage.resolved = Some(ResolvedStage {
            wd,
            exec,
            env: self.tree.as_ordered_pairs(stage.env, true),
        });
        Ok(())
    }
}
