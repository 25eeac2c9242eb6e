//! Version-control collaborator.
//!
//! Everything here shells out to the `git` binary; nothing is reimplemented.
//! The [`Vcs`] trait is the seam the resolver and ignore helpers depend on, so
//! they can be tested without a repository.

use crate::error::{EkError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Forces the active branch, bypassing git.
pub const BRANCH_ENV: &str = "EK_BRANCH";

/// The checked-out branch, or why it could not be determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchState {
    Branch(String),
    Unavailable(String),
}

impl BranchState {
    pub fn name(&self) -> Option<&str> {
        match self {
            BranchState::Branch(b) => Some(b),
            BranchState::Unavailable(_) => None,
        }
    }
}

pub trait Vcs {
    /// Current checked-out branch of the repository containing `root`.
    fn current_branch(&self, root: &Path) -> BranchState;

    /// Top-level directory of the repository containing `path`.
    fn toplevel(&self, path: &Path) -> Option<PathBuf>;

    /// Resolve a path inside the git directory (`info/exclude`, ...).
    fn git_path(&self, root: &Path, what: &str) -> Option<PathBuf>;

    /// The global excludes file, configuring the default location when unset.
    fn global_excludes_file(&self) -> Result<PathBuf>;

    /// The global excludes file as currently configured, without side effects.
    fn configured_global_excludes(&self) -> Option<PathBuf>;
}

/// [`Vcs`] backed by the `git` command-line tool.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    fn output(&self, args: &[&str]) -> Option<String> {
        let out = Command::new("git")
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

impl Vcs for GitCli {
    fn current_branch(&self, root: &Path) -> BranchState {
        if let Ok(forced) = std::env::var(BRANCH_ENV) {
            if !forced.trim().is_empty() {
                return BranchState::Branch(forced.trim().to_string());
            }
        }
        if which::which("git").is_err() {
            return BranchState::Unavailable("git not found on PATH".to_string());
        }
        let root_str = root.to_string_lossy();
        match self.output(&["-C", &root_str, "rev-parse", "--abbrev-ref", "HEAD"]) {
            Some(b) if b == "HEAD" => BranchState::Unavailable("detached HEAD".to_string()),
            Some(b) => BranchState::Branch(b),
            None => BranchState::Unavailable("not a git repository".to_string()),
        }
    }

    fn toplevel(&self, path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        self.output(&["-C", &path_str, "rev-parse", "--show-toplevel"])
            .map(PathBuf::from)
    }

    fn git_path(&self, root: &Path, what: &str) -> Option<PathBuf> {
        let root_str = root.to_string_lossy();
        let raw = self.output(&["-C", &root_str, "rev-parse", "--git-path", what])?;
        let p = PathBuf::from(raw);
        // --git-path answers relative to the -C directory.
        Some(if p.is_absolute() { p } else { root.join(p) })
    }

    fn global_excludes_file(&self) -> Result<PathBuf> {
        if let Some(p) = self.configured_global_excludes() {
            return Ok(p);
        }
        let default = "~/.config/git/ignore";
        let status = Command::new("git")
            .args(["config", "--global", "core.excludesFile", default])
            .stdin(Stdio::null())
            .status()
            .map_err(|e| EkError::Git(format!("failed to run git config: {e}")))?;
        if !status.success() {
            return Err(EkError::Git(format!(
                "git config --global core.excludesFile exited with {status}"
            )));
        }
        Ok(crate::paths::expand_tilde(default))
    }

    fn configured_global_excludes(&self) -> Option<PathBuf> {
        self.output(&["config", "--global", "core.excludesFile"])
            .map(|p| crate::paths::expand_tilde(&p))
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    /// A repository-shaped directory without git.
    pub(crate) struct FakeVcs {
        pub root: Option<PathBuf>,
        pub branch: BranchState,
        pub global: PathBuf,
    }

    impl FakeVcs {
        pub(crate) fn on_branch(branch: &str) -> Self {
            Self {
                root: None,
                branch: BranchState::Branch(branch.to_string()),
                global: PathBuf::from("/nonexistent/global-ignore"),
            }
        }

        pub(crate) fn detached() -> Self {
            Self {
                branch: BranchState::Unavailable("detached HEAD".to_string()),
                ..Self::on_branch("")
            }
        }
    }

    impl Vcs for FakeVcs {
        fn current_branch(&self, _root: &Path) -> BranchState {
            self.branch.clone()
        }
        fn toplevel(&self, _path: &Path) -> Option<PathBuf> {
            self.root.clone()
        }
        fn git_path(&self, root: &Path, what: &str) -> Option<PathBuf> {
            Some(root.join(".git").join(what))
        }
        fn global_excludes_file(&self) -> Result<PathBuf> {
            Ok(self.global.clone())
        }
        fn configured_global_excludes(&self) -> Option<PathBuf> {
            Some(self.global.clone())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
