//! # Build Plan Compiler
//!
//! Turns the validated, resolved stages of one configuration into a
//! dependency-ordered list of [`Target`]s and renders them as a ninja build
//! file.
//!
//! Every stage gets a completion stamp under the stamp directory
//! (`<repo>/<stage>.stamp`, or `<stage>.stamp` for global stages) unless it
//! is an action, which has no stamp and always runs. Each stage also gets
//! `revoke.<target>` (delete the stamp) and `force.<target>` (delete the
//! stamp and run again). When stage A satisfies global stage G, revoking or
//! forcing G revokes or forces A as well.
//!
//! ```text
//! build /ws/.grip/stamps/core/build.stamp: grip_stage /ws/.grip/stamps/core/fetch-deps.stamp
//!   name = core.build
//!   wd = /ws/core
//!   envs = GRIP_REPO=core ...
//!   exec = make
//!   stamp = /ws/.grip/stamps/core/build.stamp
//! build core.build: phony /ws/.grip/stamps/core/build.stamp
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::descriptor::{ConfigurationDescriptor, DependencyGraph, StageRef};
use crate::env::shell_quote;
use crate::error::{Error, Result};

/// One build target per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub stage: StageRef,
    /// Completion marker, `None` for actions.
    pub stamp: Option<PathBuf>,
    /// Stages this target depends on.
    pub deps: Vec<StageRef>,
    /// Stages whose `satisfies` names this one.
    pub satisfied_by: Vec<StageRef>,
    pub wd: PathBuf,
    pub env: Vec<(String, String)>,
    pub command: Option<String>,
    pub doc: Option<String>,
}

impl Target {
    pub fn name(&self) -> String {
        self.stage.to_string()
    }

    pub fn is_action(&self) -> bool {
        self.stamp.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    config: String,
    stamp_dir: PathBuf,
    targets: Vec<Target>,
    index: HashMap<StageRef, usize>,
}

/// Stamp file of `stage` under `stamp_dir`.
pub fn stamp_path(stamp_dir: &Path, stage: &StageRef) -> PathBuf {
    match &stage.repo {
        Some(repo) => stamp_dir.join(repo).join(format!("{}.stamp", stage.stage)),
        None => stamp_dir.join(format!("{}.stamp", stage.stage)),
    }
}

/// Escape a path for a ninja `build` line.
pub fn escape_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '$' => out.push_str("$$"),
            ' ' => out.push_str("$ "),
            ':' => out.push_str("$:"),
            '\n' => out.push_str("$\n"),
            c => out.push(c),
        }
    }
    out
}

/// Escape a ninja variable value.
pub fn escape_value(value: &str) -> String {
    value.replace('$', "$$").replace('\n', "$\n")
}

/// Join a multi-line command into one shell line.
fn one_line(command: &str) -> String {
    command
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" && ")
}

/// Post-order walk so that every target follows its dependencies.
fn dependency_order(graph: &DependencyGraph) -> Result<Vec<StageRef>> {
    fn visit(
        node: &StageRef,
        graph: &DependencyGraph,
        visiting: &mut BTreeSet<StageRef>,
        done: &mut BTreeSet<StageRef>,
        order: &mut Vec<StageRef>,
    ) -> Result<()> {
        if done.contains(node) {
            return Ok(());
        }
        if !visiting.insert(node.clone()) {
            return Err(Error::internal(format!(
                "dependency cycle through '{}' survived validation",
                node
            )));
        }
        let deps = graph
            .get(node)
            .ok_or_else(|| Error::internal(format!("unknown stage '{}' in dependency graph", node)))?;
        for dep in deps {
            visit(dep, graph, visiting, done, order)?;
        }
        visiting.remove(node);
        done.insert(node.clone());
        order.push(node.clone());
        Ok(())
    }

    let mut visiting = BTreeSet::new();
    let mut done = BTreeSet::new();
    let mut order = Vec::with_capacity(graph.len());
    for node in graph.keys() {
        visit(node, graph, &mut visiting, &mut done, &mut order)?;
    }
    Ok(order)
}

impl BuildPlan {
    /// Compile the stages of a validated and resolved configuration.
    ///
    /// The configuration must have passed validation: any dependency that
    /// does not resolve here is an internal error.
    pub fn compile(config: &ConfigurationDescriptor, stamp_dir: &Path) -> Result<Self> {
        if !config.is_resolved() {
            return Err(Error::internal(format!(
                "configuration '{}' compiled before resolution",
                config.name
            )));
        }
        let graph = config.dependency_graph()?;
        let order = dependency_order(&graph)?;

        let mut satisfied_by: BTreeMap<StageRef, Vec<StageRef>> = BTreeMap::new();
        for stage in config.all_stages() {
            if let Some(target) = stage.satisfies.as_ref().and_then(|d| d.target()) {
                satisfied_by
                    .entry(target.clone())
                    .or_default()
                    .push(stage.stage_ref());
            }
        }

        let mut targets = Vec::with_capacity(order.len());
        let mut index = HashMap::new();
        for stage_ref in order {
            let stage = config
                .stage(&stage_ref)
                .ok_or_else(|| Error::internal(format!("unknown stage '{}'", stage_ref)))?;
            let resolved = stage
                .resolved
                .as_ref()
                .ok_or_else(|| Error::internal(format!("stage '{}' is not resolved", stage_ref)))?;
            let target = Target {
                stamp: (!stage.action).then(|| stamp_path(stamp_dir, &stage_ref)),
                deps: graph.get(&stage_ref).cloned().unwrap_or_default(),
                satisfied_by: satisfied_by.remove(&stage_ref).unwrap_or_default(),
                wd: resolved.wd.clone(),
                env: resolved.env.clone(),
                command: resolved.exec.as_deref().map(one_line).filter(|c| !c.is_empty()),
                doc: stage.doc.clone(),
                stage: stage_ref,
            };
            index.insert(target.stage.clone(), targets.len());
            targets.push(target);
        }

        debug!("compiled {} targets for '{}'", targets.len(), config.name);
        Ok(Self {
            config: config.name.clone(),
            stamp_dir: stamp_dir.to_path_buf(),
            targets,
            index,
        })
    }

    pub fn config(&self) -> &str {
        &self.config
    }

    /// Targets in dependency order.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn target(&self, stage: &StageRef) -> Option<&Target> {
        self.index.get(stage).map(|&i| &self.targets[i])
    }

    pub fn target_by_name(&self, name: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.name() == name)
    }

    /// Ninja input standing for completion of `stage`: its stamp, or the
    /// target name for an action.
    fn input(&self, stage: &StageRef) -> Result<String> {
        let target = self
            .target(stage)
            .ok_or_else(|| Error::internal(format!("no target for '{}'", stage)))?;
        Ok(match &target.stamp {
            Some(stamp) => escape_path(&stamp.to_string_lossy()),
            None => escape_path(&target.name()),
        })
    }

    /// Render the plan as a ninja build file.
    pub fn to_ninja(&self) -> Result<String> {
        let mut out = String::new();
        let _ = writeln!(out, "# Generated by grip for configuration '{}'. Do not edit.", self.config);
        out.push_str(RULES);

        for target in &self.targets {
            let name = target.name();
            let inputs = target
                .deps
                .iter()
                .map(|dep| self.input(dep))
                .collect::<Result<Vec<_>>>()?;
            let inputs = if inputs.is_empty() {
                String::new()
            } else {
                format!(" {}", inputs.join(" "))
            };
            let exec = target.command.as_deref().unwrap_or("true");
            let envs: Vec<String> = target
                .env
                .iter()
                .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
                .collect();

            out.push('\n');
            if let Some(doc) = &target.doc {
                let _ = writeln!(out, "# {}: {}", name, doc.lines().next().unwrap_or_default());
            }
            let vars = |out: &mut String| {
                let _ = writeln!(out, "  name = {}", escape_value(&name));
                let _ = writeln!(out, "  wd = {}", escape_value(&shell_quote(&target.wd.to_string_lossy())));
                let _ = writeln!(out, "  envs = {}", escape_value(&envs.join(" ")));
                let _ = writeln!(out, "  exec = {}", escape_value(&shell_quote(exec)));
            };

            match &target.stamp {
                Some(stamp) => {
                    let stamp_text = stamp.to_string_lossy();
                    let stamp_out = escape_path(&stamp_text);
                    let stamp_var = escape_value(&shell_quote(&stamp_text));
                    let rule = if target.command.is_some() {
                        "grip_stage"
                    } else {
                        "grip_stamp"
                    };
                    let _ = writeln!(out, "build {}: {}{}", stamp_out, rule, inputs);
                    vars(&mut out);
                    let _ = writeln!(out, "  stamp = {}", stamp_var);
                    let _ = writeln!(out, "build {}: phony {}", escape_path(&name), stamp_out);

                    let _ = writeln!(
                        out,
                        "build {}: grip_revoke{}",
                        escape_path(&format!("revoke.{}", name)),
                        self.meta_inputs("revoke", &target.satisfied_by)
                    );
                    let _ = writeln!(out, "  stamp = {}", stamp_var);

                    let _ = writeln!(
                        out,
                        "build {}: grip_force{}{}",
                        escape_path(&format!("force.{}", name)),
                        self.meta_inputs("force", &target.satisfied_by),
                        if inputs.is_empty() {
                            String::new()
                        } else {
                            format!(" ||{}", inputs)
                        }
                    );
                    vars(&mut out);
                    let _ = writeln!(out, "  stamp = {}", stamp_var);
                }
                None => {
                    let _ = writeln!(out, "build {}: grip_action{}", escape_path(&name), inputs);
                    vars(&mut out);
                    let _ = writeln!(
                        out,
                        "build {}: phony{}",
                        escape_path(&format!("revoke.{}", name)),
                        self.meta_inputs("revoke", &target.satisfied_by)
                    );
                    let _ = writeln!(
                        out,
                        "build {}: phony {}{}",
                        escape_path(&format!("force.{}", name)),
                        escape_path(&name),
                        self.meta_inputs("force", &target.satisfied_by)
                    );
                }
            }
        }

        let defaults: Vec<String> = self
            .targets
            .iter()
            .filter(|t| !t.is_action())
            .map(|t| escape_path(&t.name()))
            .collect();
        if !defaults.is_empty() {
            let _ = writeln!(out, "\ndefault {}", defaults.join(" "));
        }
        Ok(out)
    }

    fn meta_inputs(&self, prefix: &str, stages: &[StageRef]) -> String {
        if stages.is_empty() {
            return String::new();
        }
        let names: Vec<String> = stages
            .iter()
            .map(|s| escape_path(&format!("{}.{}", prefix, s)))
            .collect();
        format!(" | {}", names.join(" "))
    }

    /// Remove every stamp this plan declares.
    pub fn clear_stamps(&self) -> Result<()> {
        for stamp in self.targets.iter().filter_map(|t| t.stamp.as_ref()) {
            match fs::remove_file(stamp) {
                Ok(()) => debug!("removed stale stamp {}", stamp.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Clear stamps, prepare stamp directories and write the build file.
    pub fn write(&self, build_file: &Path) -> Result<()> {
        let content = self.to_ninja()?;
        self.clear_stamps()?;
        for dir in self
            .targets
            .iter()
            .filter_map(|t| t.stamp.as_ref().and_then(|s| s.parent()))
            .collect::<BTreeSet<_>>()
        {
            fs::create_dir_all(dir)?;
        }
        fs::create_dir_all(&self.stamp_dir)?;
        if let Some(parent) = build_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(build_file, content)?;
        info!("wrote {} ({} targets)", build_file.display(), self.targets.len());
        Ok(())
    }
}

const RULES: &str = r#"ninja_required_version = 1.3

rule grip_stage
  command = cd $wd && env $envs sh -c $exec && touch $stamp
  description = $name

rule grip_stamp
  command = touch $stamp
  description = $name

rule grip_action
  command = cd $wd && env $envs sh -c $exec
  description = $name

rule grip_revoke
  command = rm -f $stamp
  description = revoke $stamp

rule grip_force
  command = rm -f $stamp && cd $wd && env $envs sh -c $exec && touch $stamp
  description = force $name
"#;
