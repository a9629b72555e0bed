//! Optional TOML configuration.
//!
//! ```toml
//! git = "/usr/local/bin/git"
//! untracked_dirty = true
//! original_refs = "refs/original"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Tool settings. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Git program to run.
    pub git: String,

    /// Treat untracked files as uncommitted changes.
    pub untracked_dirty: bool,

    /// Namespace for the ref that records the pre-rewrite tip; empty disables it.
    pub original_refs: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            git: "git".to_string(),
            untracked_dirty: false,
            original_refs: "refs/original".to_string(),
        }
    }
}

impl Config {
    /// Parse a config from TOML content.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load the config at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|e| Error::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|e| Error::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Where the pre-rewrite tip of `branch_ref` is recorded, if anywhere.
    pub fn original_ref(&self, branch_ref: &str) -> Option<String> {
        let namespace = self.original_refs.trim_end_matches('/');
        if namespace.is_empty() {
            None
        } else {
            Some(format!("{namespace}/{branch_ref}"))
        }
    }
}

/// Errors from loading the config file.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}'")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
