//! Replaying a branch's ancestry without the removed commits.
//!
//! The plan partitions the full ancestry (oldest first) into kept and removed
//! commits. The rewrite walks it once, keeping a table from every old commit to
//! its replacement:
//!
//! - a kept commit maps to its re-written self;
//! - a removed commit maps to everything its parents map to, in parent order
//!   and without duplicates, or to nothing when every line runs out (it was,
//!   or descended only from, removed roots).
//!
//! Each kept commit's parent slots are replaced by what they map to. Slots
//! that map to nothing are dropped and repeated commits collapse, so a merge
//! whose sides were removed becomes a single-parent commit or a root, while a
//! child of a removed merge inherits both of its lineages.

use std::collections::{BTreeSet, HashMap};

use crate::commit::{CommitId, CommitRecord};
use crate::git::{self, CommitWriter};
use crate::resolve::RemovalSet;

/// Writes re-parented commits into an object store.
pub trait ObjectWriter {
    /// Store `record` with `parents` in place of its own and return the new id.
    fn write_commit(
        &mut self,
        record: &CommitRecord,
        parents: &[CommitId],
    ) -> Result<CommitId, git::Error>;
}

impl ObjectWriter for CommitWriter {
    fn write_commit(
        &mut self,
        record: &CommitRecord,
        parents: &[CommitId],
    ) -> Result<CommitId, git::Error> {
        self.write(&record.encode_with_parents(parents))
    }
}

#[derive(Debug, Clone)]
struct PlanEntry {
    record: CommitRecord,
    keep: bool,
}

/// The ancestry of a branch tip, partitioned into kept and removed commits.
#[derive(Debug, Clone)]
pub struct RewritePlan {
    tip: CommitId,
    entries: Vec<PlanEntry>,
    removed: Vec<CommitId>,
    unreachable: Vec<CommitId>,
}

impl RewritePlan {
    /// Partition `ancestry` (parents before children, ending in `tip`'s history).
    ///
    /// Fails without side effects if no commit would survive.
    pub fn new(
        tip: CommitId,
        ancestry: Vec<CommitRecord>,
        removal: &RemovalSet,
    ) -> Result<Self, Error> {
        let mut removed = Vec::new();
        let mut entries = Vec::with_capacity(ancestry.len());
        for record in ancestry {
            let keep = !removal.contains(&record.id);
            if !keep {
                removed.push(record.id.clone());
            }
            entries.push(PlanEntry { record, keep });
        }

        if !entries.iter().any(|entry| entry.keep) {
            return Err(Error::RemovesEverything);
        }

        let reachable: BTreeSet<&CommitId> = entries.iter().map(|e| &e.record.id).collect();
        let unreachable = removal
            .iter()
            .filter(|id| !reachable.contains(id))
            .cloned()
            .collect();

        Ok(Self {
            tip,
            entries,
            removed,
            unreachable,
        })
    }

    /// The branch tip the plan was built from.
    pub fn tip(&self) -> &CommitId {
        &self.tip
    }

    /// Kept commits, oldest first.
    pub fn kept(&self) -> impl Iterator<Item = &CommitRecord> {
        self.entries.iter().filter(|e| e.keep).map(|e| &e.record)
    }

    pub fn kept_count(&self) -> usize {
        self.entries.len() - self.removed.len()
    }

    /// Reachable commits that will be removed, oldest first.
    pub fn removed(&self) -> &[CommitId] {
        &self.removed
    }

    /// Requested commits that are not in this branch's history.
    pub fn unreachable(&self) -> &[CommitId] {
        &self.unreachable
    }

    /// Look up a commit in the plan by id.
    pub fn record(&self, id: &CommitId) -> Option<&CommitRecord> {
        self.entries.iter().map(|e| &e.record).find(|r| &r.id == id)
    }
}

/// Old kept commits mapped to their replacements.
#[derive(Debug, Clone)]
pub struct RewriteResult {
    pub new_tip: CommitId,
    map: HashMap<CommitId, CommitId>,
    /// Kept commits that needed a new object (their parents changed).
    pub rewritten: usize,
}

impl RewriteResult {
    /// The replacement for a kept commit. Unchanged commits map to themselves.
    pub fn new_id(&self, old: &CommitId) -> Option<&CommitId> {
        self.map.get(old)
    }

    pub fn kept(&self) -> usize {
        self.map.len()
    }
}

/// Replay the kept commits of `plan` through `writer`.
///
/// A kept commit whose parents come out unchanged keeps its id and is not
/// written again. Any write failure aborts the walk; objects already written
/// are left unreferenced.
pub fn rewrite<W: ObjectWriter>(plan: &RewritePlan, writer: &mut W) -> Result<RewriteResult, Error> {
    // old id -> replacements; empty means "no surviving ancestor".
    let mut resolved: HashMap<CommitId, Vec<CommitId>> = HashMap::new();
    let mut map = HashMap::new();
    let mut last_kept = None;
    let mut rewritten = 0;

    for entry in &plan.entries {
        let record = &entry.record;

        if !entry.keep {
            let replacement = replace_parents(&resolved, &record.parents);
            tracing::debug!(commit = %record.id.short(), "skipping removed commit");
            resolved.insert(record.id.clone(), replacement);
            continue;
        }

        let parents = replace_parents(&resolved, &record.parents);

        let new_id = if parents == record.parents {
            record.id.clone()
        } else {
            let new_id = writer.write_commit(record, &parents).map_err(Error::Write)?;
            tracing::debug!(old = %record.id.short(), new = %new_id.short(), "rewrote commit");
            rewritten += 1;
            new_id
        };

        resolved.insert(record.id.clone(), vec![new_id.clone()]);
        map.insert(record.id.clone(), new_id.clone());
        last_kept = Some(new_id);
    }

    let new_tip = replacement_for(&resolved, &plan.tip)
        .into_iter()
        .next()
        .or(last_kept)
        .ok_or(Error::RemovesEverything)?;

    Ok(RewriteResult {
        new_tip,
        map,
        rewritten,
    })
}

/// Map each parent to its replacements, keeping order and dropping repeats.
fn replace_parents(
    resolved: &HashMap<CommitId, Vec<CommitId>>,
    parents: &[CommitId],
) -> Vec<CommitId> {
    let mut replaced: Vec<CommitId> = Vec::with_capacity(parents.len());
    for parent in parents {
        for new_parent in replacement_for(resolved, parent) {
            if !replaced.contains(&new_parent) {
                replaced.push(new_parent);
            }
        }
    }
    replaced
}

/// Commits outside the plan (e.g. beyond a shallow boundary) stand for themselves.
fn replacement_for(resolved: &HashMap<CommitId, Vec<CommitId>>, id: &CommitId) -> Vec<CommitId> {
    match resolved.get(id) {
        Some(replacement) => replacement.clone(),
        None => vec![id.clone()],
    }
}

/// Errors from planning or replaying a rewrite.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot remove all commits from history")]
    RemovesEverything,

    #[error("failed to write rewritten commit")]
    Write(#[source] git::Error),
}
