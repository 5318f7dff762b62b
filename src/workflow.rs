//! # Workflow State Machine
//!
//! A repository's relationship to its upstream is classified from three
//! changesets: local `HEAD` (L), the upstream marker (U) and their merge base
//! (C). Every workflow decision branches on the resulting [`AncestryState`].
//!
//! | state      | condition                 |
//! |------------|---------------------------|
//! | `Equal`    | L == U                    |
//! | `Ahead`    | C == U, L != U            |
//! | `Behind`   | C == L, L != U            |
//! | `Diverged` | L != C and U != C         |
//!
//! Two workflows are provided: `readonly` (the checkout follows upstream and
//! never carries local changes) and `single` (local work is rebased onto
//! upstream and pushed to the same branch). A refused action is raised
//! through the context's [`ErrorHandler`]; when the handler recovers, the
//! action is skipped for that repository. Side effects stay within the
//! working branch and its upstream marker; local history is never
//! force-rewritten.

use std::fmt;

use log::{debug, info};
use serde::Serialize;

use crate::defaults::UPSTREAM_REMOTE;
use crate::error::{raise, Error, ErrorHandler, Propagate, Result};
use crate::vcs::{upstream_ref, Changeset, Vcs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AncestryState {
    Equal,
    Ahead,
    Behind,
    Diverged,
}

impl fmt::Display for AncestryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AncestryState::Equal => "up to date",
            AncestryState::Ahead => "ahead",
            AncestryState::Behind => "behind",
            AncestryState::Diverged => "diverged",
        };
        f.write_str(text)
    }
}

/// Classify local changeset `local` against `upstream`, given their common
/// ancestor `common`.
pub fn classify(local: &str, upstream: &str, common: &str) -> AncestryState {
    if local == upstream {
        AncestryState::Equal
    } else if common == upstream {
        AncestryState::Ahead
    } else if common == local {
        AncestryState::Behind
    } else {
        AncestryState::Diverged
    }
}

/// The three changesets and their classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ancestry {
    pub local: Changeset,
    pub upstream: Changeset,
    pub common: Option<Changeset>,
    pub state: AncestryState,
}

/// A repository as seen by a workflow.
pub struct RepoContext<'a> {
    pub repo: &'a str,
    pub branch: &'a str,
    pub vcs: &'a dyn Vcs,
    handler: &'a dyn ErrorHandler,
}

impl<'a> RepoContext<'a> {
    /// A context whose refusals abort the action.
    pub fn new(repo: &'a str, branch: &'a str, vcs: &'a dyn Vcs) -> Self {
        Self {
            repo,
            branch,
            vcs,
            handler: &Propagate,
        }
    }

    pub fn with_handler(mut self, handler: &'a dyn ErrorHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn upstream_ref(&self) -> String {
        upstream_ref(self.branch)
    }

    /// Current ancestry, using the merge base as common ancestor.
    pub fn ancestry(&self) -> Result<Ancestry> {
        let upstream_ref = self.upstream_ref();
        let local = self.vcs.head()?;
        let upstream = self.vcs.changeset(&upstream_ref)?.ok_or_else(|| Error::Workflow {
            repo: self.repo.to_string(),
            workflow: "-".to_string(),
            message: format!("upstream marker '{}' does not exist", upstream_ref),
            hint: Some("Run 'grip fetch' first".to_string()),
        })?;
        let common = self.vcs.merge_base("HEAD", &upstream_ref)?;
        let state = classify(&local, &upstream, common.as_deref().unwrap_or_default());
        debug!("{}: local {} upstream {} -> {:?}", self.repo, local, upstream, state);
        Ok(Ancestry {
            local,
            upstream,
            common,
            state,
        })
    }

    /// Refuse an action. `Ok` means the handler recovered and the caller
    /// skips the action.
    fn refuse(&self, workflow: &str, message: impl Into<String>, hint: Option<&str>) -> Result<()> {
        let error = Error::Workflow {
            repo: self.repo.to_string(),
            workflow: workflow.to_string(),
            message: message.into(),
            hint: hint.map(str::to_string),
        };
        raise(self.handler, error).map(|_| ())
    }
}

/// A synchronization discipline.
pub trait Workflow: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch the branch and advance only the upstream marker.
    fn fetch(&self, ctx: &RepoContext) -> Result<Changeset> {
        let changeset = ctx.vcs.fetch(UPSTREAM_REMOTE, ctx.branch)?;
        ctx.vcs.set_ref(&ctx.upstream_ref(), &changeset)?;
        info!("{}: fetched {}", ctx.repo, short(&changeset));
        Ok(changeset)
    }

    /// Bring local `HEAD` up to the upstream marker.
    fn update(&self, ctx: &RepoContext) -> Result<AncestryState>;

    /// Commit local modifications. Returns the new changeset, or `None` when
    /// there was nothing to commit.
    fn commit(&self, ctx: &RepoContext, message: &str) -> Result<Option<Changeset>>;

    /// Rebase local work onto the upstream marker.
    fn merge(&self, ctx: &RepoContext) -> Result<AncestryState>;

    /// Check that a push would fast-forward upstream.
    fn prepush(&self, ctx: &RepoContext) -> Result<AncestryState>;

    /// Push local work and advance the upstream marker.
    fn push(&self, ctx: &RepoContext) -> Result<AncestryState>;
}

fn short(changeset: &str) -> &str {
    changeset.get(..12).unwrap_or(changeset)
}

/// Rebase onto upstream unless already equal; returns the new state.
fn rebase_onto_upstream(ctx: &RepoContext, ancestry: &Ancestry) -> Result<AncestryState> {
    if ancestry.state == AncestryState::Equal {
        return Ok(AncestryState::Equal);
    }
    info!("{}: rebasing onto {}", ctx.repo, short(&ancestry.upstream));
    ctx.vcs.rebase(&ctx.upstream_ref())?;
    Ok(ctx.ancestry()?.state)
}

/// Follows upstream; local changes are not allowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnly;

impl ReadOnly {
    /// Whether the working tree is clean; a dirty tree is refused.
    fn require_clean(&self, ctx: &RepoContext) -> Result<bool> {
        let status = ctx.vcs.status()?;
        if status.is_clean() {
            return Ok(true);
        }
        ctx.refuse(
            self.name(),
            format!("working tree is modified: {}", status.describe()),
            Some("Read-only repositories cannot carry local changes; discard them or switch the repository to the 'single' workflow"),
        )?;
        Ok(false)
    }
}

impl Workflow for ReadOnly {
    fn name(&self) -> &'static str {
        "readonly"
    }

    fn update(&self, ctx: &RepoContext) -> Result<AncestryState> {
        let clean = self.require_clean(ctx)?;
        let ancestry = ctx.ancestry()?;
        if !clean {
            return Ok(ancestry.state);
        }
        rebase_onto_upstream(ctx, &ancestry)
    }

    fn commit(&self, ctx: &RepoContext, _message: &str) -> Result<Option<Changeset>> {
        self.require_clean(ctx)?;
        Ok(None)
    }

    fn merge(&self, ctx: &RepoContext) -> Result<AncestryState> {
        self.update(ctx)
    }

    fn prepush(&self, ctx: &RepoContext) -> Result<AncestryState> {
        ctx.refuse(self.name(), "read-only repositories cannot be published", None)?;
        Ok(ctx.ancestry()?.state)
    }

    fn push(&self, ctx: &RepoContext) -> Result<AncestryState> {
        self.prepush(ctx)
    }
}

/// Local commits on the tracked branch, rebased onto upstream and pushed
/// back to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Single;

impl Workflow for Single {
    fn name(&self) -> &'static str {
        "single"
    }

    fn update(&self, ctx: &RepoContext) -> Result<AncestryState> {
        self.merge(ctx)
    }

    fn commit(&self, ctx: &RepoContext, message: &str) -> Result<Option<Changeset>> {
        if !ctx.vcs.status()?.has_tracked_changes() {
            info!("{}: nothing to commit", ctx.repo);
            return Ok(None);
        }
        let changeset = ctx.vcs.commit(message)?;
        info!("{}: committed {}", ctx.repo, short(&changeset));
        if ctx.ancestry()?.state == AncestryState::Diverged {
            ctx.refuse(
                self.name(),
                format!("committed {}, but the branch has diverged from upstream", short(&changeset)),
                Some("Run 'grip merge' to rebase onto upstream before publishing"),
            )?;
        }
        Ok(Some(changeset))
    }

    fn merge(&self, ctx: &RepoContext) -> Result<AncestryState> {
        let ancestry = ctx.ancestry()?;
        if matches!(ancestry.state, AncestryState::Equal | AncestryState::Ahead) {
            return Ok(ancestry.state);
        }
        let status = ctx.vcs.status()?;
        if status.has_tracked_changes() {
            ctx.refuse(
                self.name(),
                format!("cannot rebase onto upstream: {}", status.describe()),
                Some("Commit or stash local changes first"),
            )?;
            return Ok(ancestry.state);
        }
        rebase_onto_upstream(ctx, &ancestry)
    }

    fn prepush(&self, ctx: &RepoContext) -> Result<AncestryState> {
        let ancestry = ctx.ancestry()?;
        match ancestry.state {
            AncestryState::Equal => Ok(AncestryState::Equal),
            AncestryState::Ahead => {
                ctx.vcs.push(UPSTREAM_REMOTE, "HEAD", ctx.branch, true)?;
                Ok(AncestryState::Ahead)
            }
            state => {
                ctx.refuse(
                    self.name(),
                    format!("cannot publish: local branch is {}", state),
                    Some("Run 'grip merge' to rebase onto upstream first"),
                )?;
                Ok(state)
            }
        }
    }

    fn push(&self, ctx: &RepoContext) -> Result<AncestryState> {
        match self.prepush(ctx)? {
            AncestryState::Ahead => {}
            state => return Ok(state),
        }
        ctx.vcs.push(UPSTREAM_REMOTE, "HEAD", ctx.branch, false)?;
        let head = ctx.vcs.head()?;
        ctx.vcs.set_ref(&ctx.upstream_ref(), &head)?;
        info!("{}: published {}", ctx.repo, short(&head));
        Ok(AncestryState::Equal)
    }
}

static READ_ONLY: ReadOnly = ReadOnly;
static SINGLE: Single = Single;

/// Names of every known workflow.
pub fn names() -> &'static [&'static str] {
    &["readonly", "single"]
}

pub fn lookup(name: &str) -> Option<&'static dyn Workflow> {
    match name {
        "readonly" => Some(&READ_ONLY),
        "single" => Some(&SINGLE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Collect;
    use crate::vcs::mock::MockVcs;
    use crate::vcs::TreeStatus;

    fn ctx(vcs: &MockVcs) -> RepoContext<'_> {
        RepoContext::new("core", "main", vcs)
    }

    /// root <- a (local), root <- b (upstream)
    fn diverged() -> MockVcs {
        let vcs = MockVcs::new();
        vcs.add_commit("a", "root");
        vcs.add_commit("b", "root");
        vcs.set_head("a");
        vcs.set_upstream("b");
        vcs
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("x", "x", "x"), AncestryState::Equal);
        assert_eq!(classify("y", "x", "x"), AncestryState::Ahead);
        assert_eq!(classify("x", "y", "x"), AncestryState::Behind);
        assert_eq!(classify("y", "z", "x"), AncestryState::Diverged);
    }

    #[test]
    fn test_ancestry_uses_merge_base() {
        let vcs = diverged();
        let ancestry = ctx(&vcs).ancestry().unwrap();
        assert_eq!(ancestry.common.as_deref(), Some("root"));
        assert_eq!(ancestry.state, AncestryState::Diverged);
    }

    #[test]
    fn test_missing_upstream_marker() {
        let vcs = MockVcs::new();
        vcs.state.borrow_mut().refs.clear();
        assert!(matches!(ctx(&vcs).ancestry(), Err(Error::Workflow { .. })));
    }

    #[test]
    fn test_fetch_moves_only_upstream() {
        let vcs = MockVcs::new();
        vcs.add_commit("r1", "root");
        vcs.set_remote("r1");
        let fetched = READ_ONLY.fetch(&ctx(&vcs)).unwrap();
        assert_eq!(fetched, "r1");
        assert_eq!(vcs.upstream(), "r1");
        assert_eq!(vcs.head_id(), "root");
    }

    #[test]
    fn test_readonly_update_rebases_when_behind() {
        let vcs = MockVcs::new();
        vcs.add_commit("r1", "root");
        vcs.set_upstream("r1");
        let state = READ_ONLY.update(&ctx(&vcs)).unwrap();
        assert_eq!(state, AncestryState::Equal);
        assert_eq!(vcs.head_id(), "r1");
    }

    #[test]
    fn test_readonly_update_skips_rebase_when_equal() {
        let vcs = MockVcs::new();
        READ_ONLY.update(&ctx(&vcs)).unwrap();
        assert!(vcs.state.borrow().rebases.is_empty());
    }

    #[test]
    fn test_readonly_update_rejects_untracked_files() {
        let vcs = MockVcs::new();
        vcs.state.borrow_mut().status = TreeStatus {
            tracked: vec![],
            untracked: vec!["notes.txt".to_string()],
        };
        let err = READ_ONLY.update(&ctx(&vcs)).unwrap_err();
        match err {
            Error::Workflow { message, workflow, .. } => {
                assert_eq!(workflow, "readonly");
                assert!(message.contains("notes.txt"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_readonly_commit_and_push() {
        let vcs = MockVcs::new();
        assert_eq!(READ_ONLY.commit(&ctx(&vcs), "msg").unwrap(), None);
        vcs.state.borrow_mut().status.tracked.push("src/lib.rs".to_string());
        assert!(matches!(READ_ONLY.commit(&ctx(&vcs), "msg"), Err(Error::Workflow { .. })));
        assert!(matches!(READ_ONLY.push(&ctx(&vcs)), Err(Error::Workflow { .. })));
    }

    #[test]
    fn test_single_commit_then_push() {
        let vcs = MockVcs::new();
        vcs.state.borrow_mut().status.tracked.push("src/lib.rs".to_string());
        let changeset = SINGLE.commit(&ctx(&vcs), "change").unwrap().unwrap();
        assert_eq!(ctx(&vcs).ancestry().unwrap().state, AncestryState::Ahead);

        assert_eq!(SINGLE.push(&ctx(&vcs)).unwrap(), AncestryState::Equal);
        let state = vcs.state.borrow();
        assert_eq!(state.pushes, vec![(changeset.clone(), true), (changeset.clone(), false)]);
        assert_eq!(state.remote["main"], changeset);
        drop(state);
        assert_eq!(vcs.upstream(), changeset);
    }

    #[test]
    fn test_single_commit_reports_divergence() {
        let vcs = MockVcs::new();
        vcs.add_commit("r1", "root");
        vcs.set_upstream("r1");
        vcs.state.borrow_mut().status.tracked.push("a".to_string());
        let err = SINGLE.commit(&ctx(&vcs), "change").unwrap_err();
        assert!(matches!(err, Error::Workflow { hint: Some(ref h), .. } if h.contains("merge")));
        assert!(vcs.head_id().starts_with("commit"));
    }

    #[test]
    fn test_single_merge_rebases_diverged_work() {
        let vcs = diverged();
        let state = SINGLE.merge(&ctx(&vcs)).unwrap();
        assert_eq!(state, AncestryState::Ahead);
        assert_eq!(vcs.state.borrow().rebases, vec!["b".to_string()]);
    }

    #[test]
    fn test_single_merge_refuses_dirty_tree() {
        let vcs = diverged();
        vcs.state.borrow_mut().status.tracked.push("a".to_string());
        assert!(matches!(SINGLE.merge(&ctx(&vcs)), Err(Error::Workflow { .. })));
    }

    #[test]
    fn test_single_merge_allows_untracked_files() {
        let vcs = diverged();
        vcs.state.borrow_mut().status.untracked.push("scratch".to_string());
        assert!(SINGLE.merge(&ctx(&vcs)).is_ok());
    }

    #[test]
    fn test_push_rejected_unless_ahead_or_equal() {
        let behind = MockVcs::new();
        behind.add_commit("r1", "root");
        behind.set_upstream("r1");
        assert!(matches!(SINGLE.push(&ctx(&behind)), Err(Error::Workflow { .. })));

        let vcs = diverged();
        assert!(matches!(SINGLE.push(&ctx(&vcs)), Err(Error::Workflow { .. })));
        assert!(vcs.state.borrow().pushes.is_empty());
    }

    #[test]
    fn test_collected_refusals_skip_the_action() {
        let collect = Collect::new();
        let vcs = diverged();
        vcs.state.borrow_mut().status.tracked.push("a".to_string());
        let ctx = ctx(&vcs).with_handler(&collect);

        assert_eq!(SINGLE.merge(&ctx).unwrap(), AncestryState::Diverged);
        assert_eq!(SINGLE.push(&ctx).unwrap(), AncestryState::Diverged);
        assert_eq!(READ_ONLY.update(&ctx).unwrap(), AncestryState::Diverged);
        assert_eq!(READ_ONLY.push(&ctx).unwrap(), AncestryState::Diverged);

        let state = vcs.state.borrow();
        assert!(state.rebases.is_empty());
        assert!(state.pushes.is_empty());
        drop(state);
        let errors = collect.into_errors();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|e| matches!(e, Error::Workflow { .. })));
    }

    #[test]
    fn test_push_equal_is_noop() {
        let vcs = MockVcs::new();
        assert_eq!(SINGLE.push(&ctx(&vcs)).unwrap(), AncestryState::Equal);
        assert!(vcs.state.borrow().pushes.is_empty());
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("readonly").map(|w| w.name()), Some("readonly"));
        assert_eq!(lookup("single").map(|w| w.name()), Some("single"));
        assert!(lookup("git-flow").is_none());
        assert_eq!(names().len(), 2);
    }
}
