//! Excise: remove specific commits from a branch's history.
//!
//! Every kept commit is replayed with its tree, author, committer and message
//! intact; only parent links change. The branch is repointed in one atomic
//! ref update, and the old history stays reachable (backup branch,
//! `refs/original/`, reflog) until it is explicitly discarded.
//!
//! # Architecture
//!
//! - **Git**: Repository handle that shells out to the git program
//! - **Resolve**: Parse and validate the commits to remove
//! - **Rewrite**: Plan and replay the surviving ancestry
//! - **Excise**: Run the whole pipeline with its preconditions
//! - **Report**: Describe the result and the manual follow-up

pub mod commit;
pub mod config;
mod excise;
pub mod git;
mod report;
pub mod resolve;
pub mod rewrite;

pub use commit::{CommitId, CommitRecord};
pub use config::Config;
pub use excise::{Error, Options, Outcome, RemovedCommit, excise};
pub use report::render;
pub use resolve::{CommitList, RemovalSet};
