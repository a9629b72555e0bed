use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use excise::{CommitList, Options};
use tempfile::TempDir;

/// A throwaway repository on branch `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let repo = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        repo.git(&["init", "-q"]);
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        repo.git(&["config", "user.name", "Test"]);
        repo.git(&["config", "user.email", "test@test.com"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo
    }

    /// A repository with linear history A -> B -> C -> D, each adding one file.
    #[allow(dead_code)]
    pub fn linear() -> (Self, [String; 4]) {
        let repo = Self::new();
        let ids = ["A", "B", "C", "D"].map(|name| repo.commit_file(name, name));
        (repo, ids)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Run git in the repository and return trimmed stdout, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Run git and return raw stdout, for output that may not be UTF-8.
    #[allow(dead_code)]
    pub fn git_bytes(&self, args: &[&str]) -> Vec<u8> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .unwrap();
        assert!(output.status.success(), "git {} failed", args.join(" "));
        output.stdout
    }

    /// Store a raw commit object as-is and return its id.
    #[allow(dead_code)]
    pub fn write_raw_commit(&self, raw: &[u8]) -> String {
        let mut child = Command::new("git")
            .args(["hash-object", "-t", "commit", "-w", "--stdin"])
            .current_dir(self.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        child.stdin.take().unwrap().write_all(raw).unwrap();
        let output = child.wait_with_output().unwrap();
        assert!(output.status.success());
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    /// Write `<name>.txt` and commit it with message `name`; returns the full id.
    pub fn commit_file(&self, name: &str, content: &str) -> String {
        std::fs::write(self.path().join(format!("{name}.txt")), content).unwrap();
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", name]);
        self.rev("HEAD")
    }

    pub fn rev(&self, rev: &str) -> String {
        self.git(&["rev-parse", rev])
    }

    /// Subjects reachable from HEAD, oldest first.
    #[allow(dead_code)]
    pub fn subjects(&self) -> Vec<String> {
        self.git(&["log", "--reverse", "--format=%s", "HEAD"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Full ids reachable from HEAD.
    #[allow(dead_code)]
    pub fn reachable(&self) -> Vec<String> {
        self.git(&["rev-list", "HEAD"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Parents of a commit, in order.
    #[allow(dead_code)]
    pub fn parents(&self, rev: &str) -> Vec<String> {
        self.git(&["rev-list", "--parents", "-n", "1", rev])
            .split_whitespace()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    pub fn options(&self, commits: &[&str]) -> Options {
        Options {
            repo_path: self.path().to_path_buf(),
            commits: CommitList::from_comma_separated(&commits.join(",")),
            backup: None,
            force: false,
            dry_run: false,
        }
    }
}
