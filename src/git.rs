//! Git repository operations.
//!
//! Every operation shells out to the git program with the repository root as
//! its working directory; nothing here touches the process-wide cwd.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Output, Stdio};

use tempfile::NamedTempFile;

use crate::commit::{CommitId, CommitRecord, ParseError};

/// A git repository handle that provides the operations a rewrite needs.
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
    program: String,
}

impl Git {
    /// Open the repository at `path`, which must be a directory with a `.git` entry.
    ///
    /// A `.git` file (linked worktree or submodule) is accepted as well as a directory.
    pub fn open(path: &Path, program: &str) -> Result<Self, Error> {
        let display = path.display().to_string();
        if !path.exists() {
            return Err(Error::NotFound(display));
        }
        if !path.is_dir() {
            return Err(Error::NotADirectory(display));
        }
        if !path.join(".git").exists() {
            return Err(Error::NotARepo(display));
        }

        Ok(Self {
            root: path.to_path_buf(),
            program: program.to_string(),
        })
    }

    /// Get the repository root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a revision to a full commit id, or `None` if it does not name a commit.
    pub fn resolve_commit(&self, rev: &str) -> Result<Option<CommitId>, Error> {
        // An argument starting with '-' would be taken as an option.
        if rev.starts_with('-') {
            return Ok(None);
        }
        let target = format!("{rev}^{{commit}}");
        let output = self.probe(&["rev-parse", "--verify", "--quiet", &target])?;
        Ok(output.as_deref().and_then(CommitId::parse))
    }

    /// Full name of the checked-out branch (`refs/heads/...`), or `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>, Error> {
        let output = self.probe(&["symbolic-ref", "--quiet", "HEAD"])?;
        Ok(output.map(|name| name.trim().to_string()))
    }

    /// The commit a ref points at, or `None` if the ref does not exist (or is unborn).
    pub fn ref_target(&self, refname: &str) -> Result<Option<CommitId>, Error> {
        let target = format!("{refname}^{{commit}}");
        let output = self.probe(&["rev-parse", "--verify", "--quiet", &target])?;
        Ok(output.as_deref().and_then(CommitId::parse))
    }

    /// Check if a ref exists.
    pub fn ref_exists(&self, refname: &str) -> Result<bool, Error> {
        let output = self.probe(&["show-ref", "--verify", "--quiet", refname])?;
        Ok(output.is_some())
    }

    /// Whether `name` is acceptable as a branch name.
    pub fn is_valid_branch_name(&self, name: &str) -> Result<bool, Error> {
        if name.starts_with('-') {
            return Ok(false);
        }
        let output = self.probe(&["check-ref-format", "--branch", name])?;
        Ok(output.is_some())
    }

    /// Paths with uncommitted changes, one `git status --porcelain` line each.
    pub fn dirty_paths(&self, include_untracked: bool) -> Result<Vec<String>, Error> {
        let untracked = if include_untracked {
            "--untracked-files=normal"
        } else {
            "--untracked-files=no"
        };
        let output = self.run_output(&["status", "--porcelain", untracked])?;
        Ok(output
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// All commits reachable from `tip`, parents before children.
    pub fn ancestry(&self, tip: &CommitId) -> Result<Vec<CommitId>, Error> {
        let output = self.run_output(&["rev-list", "--topo-order", "--reverse", tip.as_str()])?;
        output
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| {
                CommitId::parse(line)
                    .ok_or_else(|| Error::Malformed(format!("rev-list printed '{line}'")))
            })
            .collect()
    }

    /// Read the given commits with a single `cat-file --batch` process.
    pub fn read_commits(&self, ids: &[CommitId]) -> Result<Vec<CommitRecord>, Error> {
        let mut input = String::new();
        for id in ids {
            input.push_str(id.as_str());
            input.push('\n');
        }
        let output = self.run_with_input(&["cat-file", "--batch"], input.as_bytes())?;

        let mut records = Vec::with_capacity(ids.len());
        let mut rest = output.as_slice();
        for id in ids {
            let newline = rest
                .iter()
                .position(|&b| b == b'\n')
                .ok_or_else(|| Error::Malformed("truncated cat-file output".to_string()))?;
            let header = String::from_utf8_lossy(&rest[..newline]).into_owned();
            let fields: Vec<&str> = header.split(' ').collect();
            let size = match fields.as_slice() {
                [_, "commit", size] => size
                    .parse::<usize>()
                    .map_err(|_| Error::Malformed(format!("cat-file header '{header}'")))?,
                _ => return Err(Error::Malformed(format!("{id} is not a commit: '{header}'"))),
            };
            let body_start = newline + 1;
            let body_end = body_start + size;
            // Each object is followed by a single LF.
            if rest.len() < body_end + 1 {
                return Err(Error::Malformed("truncated cat-file output".to_string()));
            }
            records.push(CommitRecord::parse(id.clone(), &rest[body_start..body_end])?);
            rest = &rest[body_end + 1..];
        }
        Ok(records)
    }

    /// Start a `hash-object` process that stores commit objects one at a time.
    pub fn commit_writer(&self) -> Result<CommitWriter, Error> {
        CommitWriter::spawn(self)
    }

    /// Create `refname` at `target`, failing if it already exists.
    pub fn create_ref(&self, refname: &str, target: &CommitId, reason: &str) -> Result<(), Error> {
        self.run(&["update-ref", "-m", reason, refname, target.as_str(), ""])
    }

    /// Point `refname` at `target` regardless of its current value.
    pub fn set_ref(&self, refname: &str, target: &CommitId, reason: &str) -> Result<(), Error> {
        self.run(&["update-ref", "-m", reason, refname, target.as_str()])
    }

    /// Move `refname` from `old` to `new` in one compare-and-swap.
    pub fn swap_ref(
        &self,
        refname: &str,
        new: &CommitId,
        old: &CommitId,
        reason: &str,
    ) -> Result<(), Error> {
        self.run(&["update-ref", "-m", reason, refname, new.as_str(), old.as_str()])
    }

    /// Move the index and working tree from `old`'s tree to `new`'s tree.
    pub fn sync_worktree(&self, old: &CommitId, new: &CommitId) -> Result<(), Error> {
        self.run(&["read-tree", "-u", "-m", old.as_str(), new.as_str()])
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command.args(args).current_dir(&self.root);
        command
    }

    fn exec(&self, command: &mut Command, args: &[&str]) -> Result<Output, Error> {
        tracing::debug!(args = ?args, "running git");
        command
            .output()
            .map_err(|e| Error::Exec(format!("{} {}: {e}", self.program, args.first().unwrap_or(&""))))
    }

    /// Run a git command that produces no output we care about.
    fn run(&self, args: &[&str]) -> Result<(), Error> {
        let output = self.exec(&mut self.command(args), args)?;
        self.check(args, &output)
    }

    /// Run a git command and capture its stdout.
    fn run_output(&self, args: &[&str]) -> Result<String, Error> {
        let output = self.exec(&mut self.command(args), args)?;
        self.check(args, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a git command whose non-zero exit means "no", not "error".
    fn probe(&self, args: &[&str]) -> Result<Option<String>, Error> {
        let output = self.exec(&mut self.command(args), args)?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()))
        } else {
            Ok(None)
        }
    }

    /// Run a git command with `input` on stdin and capture its raw stdout.
    fn run_with_input(&self, args: &[&str], input: &[u8]) -> Result<Vec<u8>, Error> {
        tracing::debug!(args = ?args, bytes = input.len(), "running git with input");
        let exec_error = |e: std::io::Error| {
            Error::Exec(format!("{} {}: {e}", self.program, args.first().unwrap_or(&"")))
        };
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(exec_error)?;

        // Feed stdin from another thread so a full stdout pipe cannot deadlock us.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Exec("child stdin unavailable".to_string()))?;
        let input = input.to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child.wait_with_output().map_err(exec_error)?;
        let written = writer
            .join()
            .map_err(|_| Error::Exec("stdin writer panicked".to_string()))?;

        // A failing git closes stdin early; its stderr is the better diagnostic.
        self.check(args, &output)?;
        written.map_err(exec_error)?;
        Ok(output.stdout)
    }

    fn check(&self, args: &[&str], output: &Output) -> Result<(), Error> {
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Failed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

const HASH_OBJECT_ARGS: &[&str] = &["hash-object", "-t", "commit", "-w", "--stdin-paths"];

/// A long-lived `git hash-object --stdin-paths` process.
///
/// Each commit is staged in a scratch file whose path is sent to git; git
/// answers with one object id per line. Once git fails, the writer is closed
/// and every later write is an error.
#[derive(Debug)]
pub struct CommitWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    scratch: NamedTempFile,
    program: String,
}

impl CommitWriter {
    fn spawn(git: &Git) -> Result<Self, Error> {
        tracing::debug!(args = ?HASH_OBJECT_ARGS, "starting git");
        let scratch = NamedTempFile::new()
            .map_err(|e| Error::Exec(format!("cannot create scratch file: {e}")))?;
        let mut child = git
            .command(HASH_OBJECT_ARGS)
            .env("GIT_FLUSH", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Exec(format!("{} hash-object: {e}", git.program)))?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Exec("child stdout unavailable".to_string()))?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            scratch,
            program: git.program.clone(),
        })
    }

    /// Store a raw commit object and return its id.
    pub fn write(&mut self, raw: &[u8]) -> Result<CommitId, Error> {
        self.stage(raw)
            .map_err(|e| Error::Exec(format!("cannot write scratch file: {e}")))?;

        let mut line = self.scratch.path().as_os_str().as_encoded_bytes().to_vec();
        line.push(b'\n');
        let sent = match self.stdin.as_mut() {
            Some(stdin) => stdin.write_all(&line).and_then(|()| stdin.flush()),
            None => return Err(Error::Exec(format!("{} hash-object has exited", self.program))),
        };
        if sent.is_err() {
            return Err(self.failure());
        }

        let mut reply = String::new();
        match self.stdout.read_line(&mut reply) {
            Ok(0) | Err(_) => Err(self.failure()),
            Ok(_) => CommitId::parse(&reply)
                .ok_or_else(|| Error::Malformed(format!("hash-object printed '{}'", reply.trim()))),
        }
    }

    fn stage(&mut self, raw: &[u8]) -> std::io::Result<()> {
        let file = self.scratch.as_file_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(raw)?;
        file.flush()
    }

    /// Close the process down and report what it printed on stderr.
    fn failure(&mut self) -> Error {
        self.stdin = None;
        let mut stderr = String::new();
        if let Some(mut pipe) = self.child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        let _ = self.child.wait();
        Error::Failed {
            command: format!("git {}", HASH_OBJECT_ARGS.join(" ")),
            stderr: stderr.trim().to_string(),
        }
    }
}

impl Drop for CommitWriter {
    fn drop(&mut self) {
        // Closing stdin lets git exit.
        self.stdin = None;
        let _ = self.child.wait();
    }
}

/// Errors from git operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to execute: {0}")]
    Exec(String),

    #[error("repository path '{0}' does not exist")]
    NotFound(String),

    #[error("repository path '{0}' is not a directory")]
    NotADirectory(String),

    #[error("'{0}' is not a git repository (no .git found)")]
    NotARepo(String),

    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("unexpected git output: {0}")]
    Malformed(String),

    #[error(transparent)]
    Commit(#[from] ParseError),
}
