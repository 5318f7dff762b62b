//! Workflows against real `git` repositories.
//!
//! Each test creates a bare upstream repository, a seed clone that plays the
//! part of another developer, and a workspace whose document points at the
//! upstream. Requires `git` on PATH.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use grip::error::{Error, Propagate};
use grip::vcs::{GitProvider, Vcs, VcsProvider};
use grip::workflow::AncestryState;
use grip::workspace::{SyncAction, Workspace};
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .output()
        .expect("git must be installed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn set_identity() {
    std::env::set_var("GIT_AUTHOR_NAME", "Test");
    std::env::set_var("GIT_AUTHOR_EMAIL", "test@example.com");
    std::env::set_var("GIT_COMMITTER_NAME", "Test");
    std::env::set_var("GIT_COMMITTER_EMAIL", "test@example.com");
}

struct Setup {
    _temp: TempDir,
    upstream: PathBuf,
    seed: PathBuf,
    root: PathBuf,
}

impl Setup {
    fn new(workflow: &str) -> Self {
        set_identity();
        let temp = TempDir::new().unwrap();
        let upstream = temp.path().join("upstream.git");
        let seed = temp.path().join("seed");
        let root = temp.path().join("ws");

        git(temp.path(), &["init", "--quiet", "--bare", "upstream.git"]);
        git(temp.path(), &["clone", "--quiet", "upstream.git", "seed"]);
        git(&seed, &["checkout", "--quiet", "-b", "main"]);
        fs::write(seed.join("README"), "one\n").unwrap();
        git(&seed, &["add", "README"]);
        git(&seed, &["commit", "--quiet", "-m", "initial"]);
        git(&seed, &["push", "--quiet", "origin", "main"]);

        fs::create_dir_all(root.join(".grip")).unwrap();
        fs::write(
            root.join(".grip/grip.yaml"),
            format!(
                "name: it\nworkflow: {}\nrepo:\n  core:\n    url: {}\n    stage:\n      build: {{exec: make}}\n",
                workflow,
                upstream.display()
            ),
        )
        .unwrap();

        Self {
            _temp: temp,
            upstream,
            seed,
            root,
        }
    }

    fn upstream_commit(&self, file: &str, text: &str) -> String {
        fs::write(self.seed.join(file), text).unwrap();
        git(&self.seed, &["add", file]);
        git(&self.seed, &["commit", "--quiet", "-m", file]);
        git(&self.seed, &["push", "--quiet", "origin", "main"]);
        git(&self.seed, &["rev-parse", "HEAD"])
    }

    fn checkout(&self) -> Workspace {
        let mut ws = Workspace::configure(&self.root, None, false, None, &Propagate).unwrap();
        assert_eq!(ws.checkout(&GitProvider, &Propagate).unwrap(), vec!["core"]);
        ws
    }

    fn core(&self) -> PathBuf {
        self.root.join("core")
    }

    fn state(&self, ws: &Workspace) -> AncestryState {
        let statuses = ws.status(&GitProvider).unwrap();
        statuses[0].ancestry.as_ref().unwrap().state
    }
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_single_workflow_round_trip() {
    let setup = Setup::new("single");
    let mut ws = setup.checkout();
    assert_eq!(setup.state(&ws), AncestryState::Equal);

    let remote_head = setup.upstream_commit("NEWS", "news\n");
    ws.sync(&SyncAction::Fetch, &GitProvider).unwrap();
    assert_eq!(setup.state(&ws), AncestryState::Behind);

    ws.sync(&SyncAction::Update, &GitProvider).unwrap();
    assert_eq!(setup.state(&ws), AncestryState::Equal);
    assert_eq!(git(&setup.core(), &["rev-parse", "HEAD"]), remote_head);

    fs::write(setup.core().join("README"), "two\n").unwrap();
    let outcomes = ws.sync(&SyncAction::Commit("local".to_string()), &GitProvider).unwrap();
    let committed = outcomes[0].changeset.clone().expect("a commit");
    assert_eq!(setup.state(&ws), AncestryState::Ahead);

    ws.sync(&SyncAction::Publish, &GitProvider).unwrap();
    assert_eq!(setup.state(&ws), AncestryState::Equal);
    assert_eq!(
        git(&setup.upstream, &["rev-parse", "refs/heads/main"]),
        committed
    );

    ws.save_state().unwrap();
    let state = fs::read_to_string(setup.root.join(".grip/state.toml")).unwrap();
    assert!(state.contains("[default.core]"));
    assert!(state.contains(&committed));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_single_workflow_rebases_local_work() {
    let setup = Setup::new("single");
    let mut ws = setup.checkout();

    fs::write(setup.core().join("LOCAL"), "mine\n").unwrap();
    git(&setup.core(), &["add", "LOCAL"]);
    git(&setup.core(), &["commit", "--quiet", "-m", "local"]);
    let remote_head = setup.upstream_commit("REMOTE", "theirs\n");

    ws.sync(&SyncAction::Fetch, &GitProvider).unwrap();
    assert_eq!(setup.state(&ws), AncestryState::Diverged);

    ws.sync(&SyncAction::Merge, &GitProvider).unwrap();
    assert_eq!(setup.state(&ws), AncestryState::Ahead);
    let vcs = GitProvider.open(&setup.core()).unwrap();
    assert_eq!(vcs.merge_base("HEAD", &remote_head).unwrap(), Some(remote_head));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_readonly_workflow_refuses_local_changes() {
    let setup = Setup::new("readonly");
    let mut ws = setup.checkout();

    setup.upstream_commit("NEWS", "news\n");
    ws.sync(&SyncAction::Fetch, &GitProvider).unwrap();
    fs::write(setup.core().join("README"), "edited\n").unwrap();

    let err = ws.sync(&SyncAction::Update, &GitProvider).unwrap_err();
    assert!(matches!(err, Error::Workflow { .. }));
    assert_eq!(err.exit_code(), 7);

    let err = ws.sync(&SyncAction::Publish, &GitProvider).unwrap_err();
    assert!(matches!(err, Error::Workflow { .. }));

    git(&setup.core(), &["checkout", "--quiet", "--", "README"]);
    ws.sync(&SyncAction::Update, &GitProvider).unwrap();
    assert_eq!(setup.state(&ws), AncestryState::Equal);
}
