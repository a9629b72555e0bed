//! The removal pipeline: validate, resolve, guard, back up, rewrite, repoint.

use std::path::PathBuf;

use thiserror::Error;

use crate::commit::CommitId;
use crate::config::Config;
use crate::git::{self, Git};
use crate::resolve::{self, CommitList};
use crate::rewrite::{self, RewritePlan, RewriteResult};

/// What to remove, and how.
#[derive(Debug, Clone)]
pub struct Options {
    pub repo_path: PathBuf,
    pub commits: CommitList,
    /// Branch to create at the current tip before rewriting.
    pub backup: Option<String>,
    /// Proceed even if the working tree has uncommitted changes.
    pub force: bool,
    /// Stop after planning; write nothing.
    pub dry_run: bool,
}

/// A commit that was (or would be) removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedCommit {
    pub id: CommitId,
    pub summary: String,
}

/// Everything the reporter needs to describe a finished run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub repo_path: PathBuf,
    /// Short branch name, e.g. `main`.
    pub branch: String,
    pub removed: Vec<RemovedCommit>,
    /// Requested commits that are not part of the branch's history.
    pub unreachable: Vec<CommitId>,
    pub kept: usize,
    pub old_tip: CommitId,
    /// `None` for a dry run.
    pub new_tip: Option<CommitId>,
    pub rewritten: usize,
    pub backup: Option<String>,
    /// Ref holding the pre-rewrite tip, if one was written.
    pub original_ref: Option<String>,
    /// Set when the branch moved but the working tree could not follow.
    pub worktree_warning: Option<String>,
}

impl Outcome {
    pub fn is_dry_run(&self) -> bool {
        self.new_tip.is_none()
    }
}

/// Remove the requested commits from the checked-out branch.
///
/// Either the branch ends up at the rewritten tip, or it is left exactly
/// where it was. The only other refs touched are the backup branch and the
/// pre-rewrite bookkeeping ref.
pub fn excise(options: &Options, config: &Config) -> Result<Outcome, Error> {
    let git = Git::open(&options.repo_path, &config.git).map_err(Error::Repository)?;
    tracing::info!(repo = %git.root().display(), "opened repository");

    let removal = resolve::resolve(&git, &options.commits)?;
    tracing::info!(requested = options.commits.len(), resolved = removal.len(), "resolved commits");

    let branch_ref = git.current_branch()?.ok_or(Error::DetachedHead)?;
    let branch = short_branch_name(&branch_ref).to_string();
    let old_tip = git
        .ref_target(&branch_ref)?
        .ok_or_else(|| Error::UnbornBranch(branch.clone()))?;

    let dirty = git.dirty_paths(config.untracked_dirty)?;
    if !dirty.is_empty() {
        if !options.force {
            return Err(Error::DirtyTree { paths: dirty });
        }
        tracing::warn!(paths = dirty.len(), "working tree is dirty, continuing because of --force");
    }

    println!("Analyzing repository history...");
    let ancestry = git.ancestry(&old_tip)?;
    let records = git.read_commits(&ancestry)?;
    let plan = RewritePlan::new(old_tip.clone(), records, &removal)?;
    for id in plan.unreachable() {
        tracing::warn!(commit = %id, %branch, "commit is not in the branch history, ignoring");
    }

    let removed: Vec<RemovedCommit> = plan
        .removed()
        .iter()
        .map(|id| RemovedCommit {
            id: id.clone(),
            summary: plan.record(id).map(|r| r.summary()).unwrap_or_default(),
        })
        .collect();

    let mut outcome = Outcome {
        repo_path: options.repo_path.clone(),
        branch: branch.clone(),
        removed,
        unreachable: plan.unreachable().to_vec(),
        kept: plan.kept_count(),
        old_tip: old_tip.clone(),
        new_tip: None,
        rewritten: 0,
        backup: None,
        original_ref: None,
        worktree_warning: None,
    };

    if options.dry_run {
        tracing::info!("dry run, leaving repository untouched");
        return Ok(outcome);
    }

    if let Some(name) = &options.backup {
        create_backup(&git, name, &old_tip)?;
        println!("Created backup branch: {name}");
        outcome.backup = Some(name.clone());
    }

    println!("Removing {} commits from history...", plan.removed().len());
    let result = {
        let mut writer = git.commit_writer().map_err(Error::Rewrite)?;
        rewrite::rewrite(&plan, &mut writer)?
    };
    tracing::info!(
        kept = result.kept(),
        rewritten = result.rewritten,
        new_tip = %result.new_tip,
        "rewrite complete"
    );

    let reason = format!("excise: removed {} commits", plan.removed().len());
    git.swap_ref(&branch_ref, &result.new_tip, &old_tip, &reason)
        .map_err(|source| Error::BranchUpdate {
            branch: branch.clone(),
            source,
        })?;
    tracing::info!(%branch, from = %old_tip, to = %result.new_tip, "branch updated");

    // Only recorded once the branch has actually moved.
    if let Some(original_ref) = config.original_ref(&branch_ref) {
        match git.set_ref(&original_ref, &old_tip, "excise: pre-rewrite tip") {
            Ok(()) => outcome.original_ref = Some(original_ref),
            Err(e) => tracing::warn!(%original_ref, error = %e, "could not record the old tip"),
        }
    }

    outcome.worktree_warning = sync_worktree(&git, &plan, &result);
    outcome.rewritten = result.rewritten;
    outcome.new_tip = Some(result.new_tip);
    Ok(outcome)
}

/// Create `refs/heads/<name>` at `tip`, refusing to overwrite anything.
fn create_backup(git: &Git, name: &str, tip: &CommitId) -> Result<(), Error> {
    if !git.is_valid_branch_name(name)? {
        return Err(Error::InvalidBackupName(name.to_string()));
    }
    let refname = format!("refs/heads/{name}");
    if git.ref_exists(&refname)? {
        return Err(Error::BackupExists(name.to_string()));
    }
    git.create_ref(&refname, tip, "excise: backup before rewrite")
        .map_err(|source| Error::Backup {
            name: name.to_string(),
            source,
        })
}

/// Bring the index and working tree along if the tip's tree changed.
///
/// That only happens when the old tip itself was removed. Failure here is
/// reported rather than returned, since the branch has already moved.
fn sync_worktree(git: &Git, plan: &RewritePlan, result: &RewriteResult) -> Option<String> {
    let old_tree = plan.record(plan.tip()).map(|r| r.tree.as_str());
    let new_tree = plan
        .kept()
        .find(|r| result.new_id(&r.id) == Some(&result.new_tip))
        .map(|r| r.tree.as_str());
    if old_tree == new_tree {
        return None;
    }

    match git.sync_worktree(plan.tip(), &result.new_tip) {
        Ok(()) => {
            tracing::info!("working tree updated to the new tip");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not update working tree");
            Some(e.to_string())
        }
    }
}

fn short_branch_name(refname: &str) -> &str {
    refname.strip_prefix("refs/heads/").unwrap_or(refname)
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while removing commits.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Repository(git::Error),

    #[error(transparent)]
    Resolve(#[from] resolve::Error),

    #[error("currently in detached HEAD state; check out a branch before removing commits")]
    DetachedHead,

    #[error("branch '{0}' has no commits")]
    UnbornBranch(String),

    #[error(
        "working tree has uncommitted changes; commit or stash them first, \
         or use --force to proceed anyway (uncommitted changes may be lost):{}",
        .paths.iter().map(|p| format!("\n  {p}")).collect::<String>()
    )]
    DirtyTree { paths: Vec<String> },

    #[error("cannot remove all commits from history")]
    RemovesEverything,

    #[error("'{0}' is not a valid branch name")]
    InvalidBackupName(String),

    #[error("backup branch '{0}' already exists")]
    BackupExists(String),

    #[error("failed to create backup branch '{name}'")]
    Backup {
        name: String,
        #[source]
        source: git::Error,
    },

    #[error("failed to rewrite history")]
    Rewrite(#[source] git::Error),

    #[error("failed to update '{branch}'")]
    BranchUpdate {
        branch: String,
        #[source]
        source: git::Error,
    },

    #[error("git error")]
    Git(#[from] git::Error),
}

impl From<rewrite::Error> for Error {
    fn from(error: rewrite::Error) -> Self {
        match error {
            rewrite::Error::RemovesEverything => Error::RemovesEverything,
            rewrite::Error::Write(source) => Error::Rewrite(source),
        }
    }
}
