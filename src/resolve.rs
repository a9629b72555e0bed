//! Turning caller-supplied identifiers into a set of commits to remove.

use std::collections::BTreeSet;
use std::path::Path;

use crate::commit::CommitId;
use crate::git::{self, Git};

/// Identifiers as the caller wrote them, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitList(Vec<String>);

impl CommitList {
    /// Interpret a `--commits` value.
    ///
    /// If the value names an existing file, the file holds one identifier per
    /// line (blank lines and `#` comments skipped). Otherwise the value itself
    /// is a comma-separated list.
    pub fn from_arg(value: &str) -> Result<Self, Error> {
        let path = Path::new(value);
        let list = if path.is_file() {
            let content = std::fs::read_to_string(path).map_err(|e| Error::ReadList {
                path: path.display().to_string(),
                source: e,
            })?;
            Self::from_lines(&content)
        } else {
            Self::from_comma_separated(value)
        };

        if list.0.is_empty() {
            return Err(Error::Empty);
        }
        Ok(list)
    }

    pub fn from_comma_separated(value: &str) -> Self {
        Self(
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn from_lines(content: &str) -> Self {
        Self(
            content
                .lines()
                .map(str::trim)
                .filter(|s| !s.is_empty() && !s.starts_with('#'))
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Commits the caller wants purged, as full ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSet(BTreeSet<CommitId>);

impl RemovalSet {
    pub fn contains(&self, id: &CommitId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommitId> {
        self.0.iter()
    }
}

impl FromIterator<CommitId> for RemovalSet {
    fn from_iter<I: IntoIterator<Item = CommitId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Resolve every identifier against the repository.
///
/// All identifiers are checked before reporting, so a failure lists every
/// identifier that does not name a commit. Nothing is written.
pub fn resolve(git: &Git, list: &CommitList) -> Result<RemovalSet, Error> {
    let mut resolved = BTreeSet::new();
    let mut missing = Vec::new();

    for rev in list.as_slice() {
        match git.resolve_commit(rev)? {
            Some(id) => {
                tracing::debug!(%rev, %id, "resolved commit");
                resolved.insert(id);
            }
            None => {
                tracing::debug!(%rev, "not a commit");
                missing.push(rev.clone());
            }
        }
    }

    if missing.is_empty() {
        Ok(RemovalSet(resolved))
    } else {
        Err(Error::Unresolved { missing })
    }
}

/// Errors from reading and resolving the commit list.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read commit list '{path}'")]
    ReadList {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no commit hashes provided")]
    Empty,

    #[error(
        "the following commits were not found in the repository:{}",
        .missing.iter().map(|rev| format!("\n  - {rev}")).collect::<String>()
    )]
    Unresolved { missing: Vec<String> },

    #[error(transparent)]
    Git(#[from] git::Error),
}
