//! Version-control collaborator.
//!
//! The workflow state machine only needs a handful of facts and actions from
//! a repository; they are expressed by the [`Vcs`] trait so that workflows
//! can be exercised against in-memory doubles. [`GitRepo`] implements it by
//! running the system `git` binary, which automatically picks up:
//! - SSH keys from ~/.ssh/
//! - Git credential helpers
//! - Any authentication configured in ~/.gitconfig

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use log::{debug, trace};

use crate::defaults::UPSTREAM_REMOTE;
use crate::error::{Error, Result};
use crate::location::RepoLocation;

/// A commit identifier.
pub type Changeset = String;

/// Remote-tracking ref used as the upstream marker for `branch`.
pub fn upstream_ref(branch: &str) -> String {
    format!("refs/remotes/{}/{}", UPSTREAM_REMOTE, branch)
}

/// Working tree modifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStatus {
    /// Paths with staged or unstaged changes to tracked files.
    pub tracked: Vec<String>,
    pub untracked: Vec<String>,
}

impl TreeStatus {
    pub fn is_clean(&self) -> bool {
        self.tracked.is_empty() && self.untracked.is_empty()
    }

    pub fn has_tracked_changes(&self) -> bool {
        !self.tracked.is_empty()
    }

    /// Short human-readable summary, e.g. `2 modified (a, b); 1 untracked (c)`.
    pub fn describe(&self) -> String {
        fn part(label: &str, paths: &[String]) -> Option<String> {
            if paths.is_empty() {
                return None;
            }
            let shown: Vec<&str> = paths.iter().take(3).map(String::as_str).collect();
            let more = if paths.len() > shown.len() { ", ..." } else { "" };
            Some(format!("{} {} ({}{})", paths.len(), label, shown.join(", "), more))
        }
        let parts: Vec<String> = [part("modified", &self.tracked), part("untracked", &self.untracked)]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            "clean".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Parse `git status --porcelain=v1` output.
pub fn parse_porcelain(output: &str) -> TreeStatus {
    let mut status = TreeStatus::default();
    for line in output.lines() {
        if line.len() < 4 {
            continue;
        }
        let (code, path) = line.split_at(3);
        let path = path.to_string();
        if code.starts_with("??") {
            status.untracked.push(path);
        } else if !code.starts_with("!!") {
            status.tracked.push(path);
        }
    }
    status
}

/// Operations the workflows need from a checked-out repository.
pub trait Vcs: Send {
    fn path(&self) -> &Path;

    /// Changeset of `HEAD`.
    fn head(&self) -> Result<Changeset>;

    /// Checked-out branch, `None` when `HEAD` is detached.
    fn current_branch(&self) -> Result<Option<String>>;

    /// Changeset a reference points at, `None` when it does not exist.
    fn changeset(&self, reference: &str) -> Result<Option<Changeset>>;

    /// Most recent common ancestor of two references.
    fn merge_base(&self, a: &str, b: &str) -> Result<Option<Changeset>>;

    fn status(&self) -> Result<TreeStatus>;

    /// Fetch `branch` from `remote` and return the fetched changeset.
    /// Leaves local branches and tracking refs alone.
    fn fetch(&self, remote: &str, branch: &str) -> Result<Changeset>;

    /// Rebase the current branch onto `onto`.
    fn rebase(&self, onto: &str) -> Result<()>;

    /// Push `source` to `branch` on `remote`.
    fn push(&self, remote: &str, source: &str, branch: &str, dry_run: bool) -> Result<()>;

    /// Point `reference` at `changeset`.
    fn set_ref(&self, reference: &str, changeset: &str) -> Result<()>;

    /// Commit every tracked modification and return the new changeset.
    fn commit(&self, message: &str) -> Result<Changeset>;

    /// History depth of a shallow clone, `None` for a full clone.
    fn depth(&self) -> Result<Option<u32>>;
}

/// Opens and clones repositories.
pub trait VcsProvider: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn Vcs>>;

    fn clone_repo(
        &self,
        location: &RepoLocation,
        branch: &str,
        path: &Path,
        shallow: bool,
    ) -> Result<Box<dyn Vcs>>;

    /// Whether `path` holds a checkout.
    fn exists(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }
}

/// A repository driven through the `git` command line.
#[derive(Debug, Clone)]
pub struct GitRepo {
    path: PathBuf,
}

fn command_line(args: &[&str]) -> String {
    format!("git {}", args.join(" "))
}

impl GitRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn output(&self, args: &[&str]) -> Result<Output> {
        trace!("{}: {}", self.path.display(), command_line(args));
        Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| Error::GitCommand {
                command: command_line(args),
                path: self.path.display().to_string(),
                stderr: e.to_string(),
            })
    }

    fn failure(&self, args: &[&str], output: &Output) -> Error {
        Error::GitCommand {
            command: command_line(args),
            path: self.path.display().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Run git and return trimmed stdout, failing on a non-zero exit.
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(self.failure(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run git where exit status 1 means "no answer" rather than failure.
    fn query(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self.output(args)?;
        match output.status.code() {
            Some(0) => Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string())),
            Some(1) => Ok(None),
            _ => Err(self.failure(args, &output)),
        }
    }
}

impl Vcs for GitRepo {
    fn path(&self) -> &Path {
        &self.path
    }

    fn head(&self) -> Result<Changeset> {
        self.run(&["rev-parse", "HEAD"])
    }

    fn current_branch(&self) -> Result<Option<String>> {
        self.query(&["symbolic-ref", "--quiet", "--short", "HEAD"])
    }

    fn changeset(&self, reference: &str) -> Result<Option<Changeset>> {
        let spec = format!("{}^{{commit}}", reference);
        self.query(&["rev-parse", "--verify", "--quiet", &spec])
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<Option<Changeset>> {
        self.query(&["merge-base", a, b])
    }

    fn status(&self) -> Result<TreeStatus> {
        let args = ["status", "--porcelain=v1", "--untracked-files=normal"];
        let output = self.output(&args)?;
        if !output.status.success() {
            return Err(self.failure(&args, &output));
        }
        // Not trimmed: the leading status column is significant.
        Ok(parse_porcelain(&String::from_utf8_lossy(&output.stdout)))
    }

    fn fetch(&self, remote: &str, branch: &str) -> Result<Changeset> {
        debug!("fetching {} {} in {}", remote, branch, self.path.display());
        self.run(&["fetch", "--quiet", remote, branch])?;
        self.run(&["rev-parse", "FETCH_HEAD"])
    }

    fn rebase(&self, onto: &str) -> Result<()> {
        let args = ["rebase", "--quiet", onto];
        let output = self.output(&args)?;
        if output.status.success() {
            return Ok(());
        }
        let error = self.failure(&args, &output);
        // Leave the checkout as it was before the attempt.
        let _ = self.output(&["rebase", "--abort"]);
        Err(error)
    }

    fn push(&self, remote: &str, source: &str, branch: &str, dry_run: bool) -> Result<()> {
        let refspec = format!("{}:refs/heads/{}", source, branch);
        let mut args = vec!["push", "--quiet"];
        if dry_run {
            args.push("--dry-run");
        }
        args.push(remote);
        args.push(&refspec);
        self.run(&args).map(|_| ())
    }

    fn set_ref(&self, reference: &str, changeset: &str) -> Result<()> {
        self.run(&["update-ref", reference, changeset]).map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<Changeset> {
        self.run(&["commit", "--quiet", "--all", "-m", message])?;
        self.head()
    }

    fn depth(&self) -> Result<Option<u32>> {
        if self.run(&["rev-parse", "--is-shallow-repository"])? != "true" {
            return Ok(None);
        }
        let count = self.run(&["rev-list", "--count", "HEAD"])?;
        count
            .parse()
            .map(Some)
            .map_err(|_| Error::internal(format!("unexpected commit count '{}'", count)))
    }
}

/// [`VcsProvider`] backed by the `git` command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitProvider;

impl VcsProvider for GitProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn Vcs>> {
        if !self.exists(path) {
            return Err(Error::GitCommand {
                command: "open".to_string(),
                path: path.display().to_string(),
                stderr: "not a git checkout".to_string(),
            });
        }
        Ok(Box::new(GitRepo::new(path)))
    }

    fn clone_repo(
        &self,
        location: &RepoLocation,
        branch: &str,
        path: &Path,
        shallow: bool,
    ) -> Result<Box<dyn Vcs>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let source = location.to_string();
        let target = path.to_string_lossy();
        let mut args = vec!["clone", "--quiet", "--branch", branch];
        if shallow {
            args.push("--depth=1");
        }
        args.push(&source);
        args.push(&target);

        debug!("cloning {} ({}) into {}", source, branch, path.display());
        let output = Command::new("git")
            .args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| Error::GitCommand {
                command: command_line(&args),
                path: path.display().to_string(),
                stderr: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = if stderr.contains("Authentication failed")
                || stderr.contains("Permission denied")
                || stderr.contains("Could not read from remote repository")
            {
                format!(
                    "Authentication failed. Make sure you have access to the repository \
                    (SSH key in ssh-agent or git credentials configured).\n{}",
                    stderr.trim()
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::GitCommand {
                command: command_line(&args),
                path: path.display().to_string(),
                stderr,
            });
        }

        Ok(Box::new(GitRepo::new(path)))
    }
}

/// In-memory repository double with a commit graph.
#[cfg(test)]
pub(crate) mod mock {
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::path::{Path, PathBuf};

    use super::{Changeset, TreeStatus, Vcs};
    use crate::error::{Error, Result};

    #[derive(Debug, Default)]
    pub struct MockState {
        pub parents: HashMap<String, Vec<String>>,
        pub head: String,
        pub branch: Option<String>,
        pub refs: HashMap<String, String>,
        /// Branch heads on the remote.
        pub remote: HashMap<String, String>,
        pub status: TreeStatus,
        pub pushes: Vec<(String, bool)>,
        pub rebases: Vec<String>,
        counter: u32,
    }

    #[derive(Debug)]
    pub struct MockVcs {
        path: PathBuf,
        pub state: RefCell<MockState>,
    }

    impl MockVcs {
        /// A repository on `main` whose history is `root`, with `origin/main`
        /// at `root`.
        pub fn new() -> Self {
            let mut state = MockState {
                head: "root".to_string(),
                branch: Some("main".to_string()),
                ..MockState::default()
            };
            state.parents.insert("root".to_string(), Vec::new());
            state
                .refs
                .insert(super::upstream_ref("main"), "root".to_string());
            state.remote.insert("main".to_string(), "root".to_string());
            Self {
                path: PathBuf::from("/mock"),
                state: RefCell::new(state),
            }
        }

        /// Add a commit on top of `parent` without moving anything.
        pub fn add_commit(&self, id: &str, parent: &str) {
            self.state
                .borrow_mut()
                .parents
                .insert(id.to_string(), vec![parent.to_string()]);
        }

        pub fn set_head(&self, id: &str) {
            self.state.borrow_mut().head = id.to_string();
        }

        pub fn set_upstream(&self, id: &str) {
            self.state
                .borrow_mut()
                .refs
                .insert(super::upstream_ref("main"), id.to_string());
        }

        pub fn set_remote(&self, id: &str) {
            self.state
                .borrow_mut()
                .remote
                .insert("main".to_string(), id.to_string());
        }

        pub fn upstream(&self) -> String {
            self.state.borrow().refs[&super::upstream_ref("main")].clone()
        }

        pub fn head_id(&self) -> String {
            self.state.borrow().head.clone()
        }

        fn ancestors(state: &MockState, id: &str) -> Vec<String> {
            let mut seen = HashSet::new();
            let mut order = Vec::new();
            let mut queue = VecDeque::from([id.to_string()]);
            while let Some(next) = queue.pop_front() {
                if !seen.insert(next.clone()) {
                    continue;
                }
                for parent in state.parents.get(&next).into_iter().flatten() {
                    queue.push_back(parent.clone());
                }
                order.push(next);
            }
            order
        }

        fn lookup(state: &MockState, reference: &str) -> Option<String> {
            if reference == "HEAD" {
                return Some(state.head.clone());
            }
            if let Some(id) = state.refs.get(reference) {
                return Some(id.clone());
            }
            state
                .parents
                .contains_key(reference)
                .then(|| reference.to_string())
        }
    }

    impl Vcs for MockVcs {
        fn path(&self) -> &Path {
            &self.path
        }

        fn head(&self) -> Result<Changeset> {
            Ok(self.state.borrow().head.clone())
        }

        fn current_branch(&self) -> Result<Option<String>> {
            Ok(self.state.borrow().branch.clone())
        }

        fn changeset(&self, reference: &str) -> Result<Option<Changeset>> {
            Ok(Self::lookup(&self.state.borrow(), reference))
        }

        fn merge_base(&self, a: &str, b: &str) -> Result<Option<Changeset>> {
            let state = self.state.borrow();
            let (Some(a), Some(b)) = (Self::lookup(&state, a), Self::lookup(&state, b)) else {
                return Ok(None);
            };
            let from_a: HashSet<String> = Self::ancestors(&state, &a).into_iter().collect();
            Ok(Self::ancestors(&state, &b)
                .into_iter()
                .find(|id| from_a.contains(id)))
        }

        fn status(&self) -> Result<TreeStatus> {
            Ok(self.state.borrow().status.clone())
        }

        fn fetch(&self, _remote: &str, branch: &str) -> Result<Changeset> {
            let state = self.state.borrow();
            state.remote.get(branch).cloned().ok_or_else(|| Error::GitCommand {
                command: "fetch".to_string(),
                path: "/mock".to_string(),
                stderr: format!("no branch {}", branch),
            })
        }

        fn rebase(&self, onto: &str) -> Result<()> {
            let mut state = self.state.borrow_mut();
            let onto = Self::lookup(&state, onto).ok_or_else(|| Error::internal("unknown rebase target"))?;
            state.rebases.push(onto.clone());
            if Self::ancestors(&state, &onto).contains(&state.head) {
                state.head = onto;
            } else if !Self::ancestors(&state, &state.head).contains(&onto) {
                state.counter += 1;
                let id = format!("rebased{}", state.counter);
                state.parents.insert(id.clone(), vec![onto]);
                state.head = id;
            }
            Ok(())
        }

        fn push(&self, _remote: &str, source: &str, branch: &str, dry_run: bool) -> Result<()> {
            let mut state = self.state.borrow_mut();
            let source = Self::lookup(&state, source).ok_or_else(|| Error::internal("unknown push source"))?;
            state.pushes.push((source.clone(), dry_run));
            if !dry_run {
                state.remote.insert(branch.to_string(), source);
            }
            Ok(())
        }

        fn set_ref(&self, reference: &str, changeset: &str) -> Result<()> {
            self.state
                .borrow_mut()
                .refs
                .insert(reference.to_string(), changeset.to_string());
            Ok(())
        }

        fn commit(&self, _message: &str) -> Result<Changeset> {
            let mut state = self.state.borrow_mut();
            state.counter += 1;
            let id = format!("commit{}", state.counter);
            let parent = state.head.clone();
            state.parents.insert(id.clone(), vec![parent]);
            state.head = id.clone();
            state.status = TreeStatus::default();
            Ok(id)
        }

        fn depth(&self) -> Result<Option<u32>> {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_ref() {
        assert_eq!(upstream_ref("main"), "refs/remotes/origin/main");
    }

    #[test]
    fn test_parse_porcelain() {
        let status = parse_porcelain(" M src/lib.rs\nA  new.rs\n?? scratch.txt\n!! target/\n");
        assert_eq!(status.tracked, vec!["src/lib.rs", "new.rs"]);
        assert_eq!(status.untracked, vec!["scratch.txt"]);
        assert!(!status.is_clean());
        assert!(status.has_tracked_changes());
    }

    #[test]
    fn test_parse_porcelain_clean() {
        let status = parse_porcelain("");
        assert!(status.is_clean());
        assert_eq!(status.describe(), "clean");
    }

    #[test]
    fn test_describe_truncates() {
        let status = TreeStatus {
            tracked: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            untracked: vec!["e".into()],
        };
        assert_eq!(status.describe(), "4 modified (a, b, c, ...); 1 untracked (e)");
    }

    #[test]
    fn test_open_rejects_non_checkout() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            GitProvider.open(temp.path()),
            Err(Error::GitCommand { .. })
        ));
    }
}
