use crate::defaults::IgnorePolicy;
use crate::error::{EkError, Result};
use crate::io::{contains_line, ensure_line};
use crate::paths::IGNORE_ENTRY;
use crate::vcs::Vcs;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const EXPLAIN: &str = "\
Strategies for keeping .eagle/ out of git:
  local   .git/info/exclude      personal, not versioned (recommended)
  repo    .gitignore             versioned with the repository
  global  core.excludesFile      applies to every repository
  none    leave git untouched";

/// Result of applying a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoreOutcome {
    pub policy: IgnorePolicy,
    pub file: Option<PathBuf>,
    pub changed: bool,
}

/// One row of `ek ignore status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoreScope {
    pub scope: IgnorePolicy,
    pub file: Option<PathBuf>,
    pub contains: bool,
}

/// Add `.eagle/` to the file the policy names. `path` is any directory inside
/// the repository; `repo` and `local` fail outside a repository.
pub fn apply(vcs: &dyn Vcs, policy: IgnorePolicy, path: &Path) -> Result<IgnoreOutcome> {
    let file = match policy {
        IgnorePolicy::None => {
            return Ok(IgnoreOutcome {
                policy,
                file: None,
                changed: false,
            })
        }
        IgnorePolicy::Repo => repo_root(vcs, path)?.join(".gitignore"),
        IgnorePolicy::Local => {
            let root = repo_root(vcs, path)?;
            vcs.git_path(&root, "info/exclude")
                .ok_or_else(|| EkError::Git("could not resolve info/exclude".to_string()))?
        }
        IgnorePolicy::Global => vcs.global_excludes_file()?,
    };
    let changed = ensure_line(&file, IGNORE_ENTRY)?;
    tracing::debug!(policy = %policy, file = %file.display(), changed, "applied ignore policy");
    Ok(IgnoreOutcome {
        policy,
        file: Some(file),
        changed,
    })
}

/// Report which ignore files already carry `.eagle/`.
pub fn status(vcs: &dyn Vcs, path: &Path) -> Result<Vec<IgnoreScope>> {
    let root = repo_root(vcs, path)?;
    let repo_file = root.join(".gitignore");
    let local_file = vcs.git_path(&root, "info/exclude");
    let global_file = vcs.configured_global_excludes();

    let scope = |scope, file: Option<PathBuf>| IgnoreScope {
        scope,
        contains: file
            .as_deref()
            .map(|f| contains_line(f, IGNORE_ENTRY))
            .unwrap_or(false),
        file,
    };
    Ok(vec![
        scope(IgnorePolicy::Repo, Some(repo_file)),
        scope(IgnorePolicy::Local, local_file),
        scope(IgnorePolicy::Global, global_file),
    ])
}

fn repo_root(vcs: &dyn Vcs, path: &Path) -> Result<PathBuf> {
    vcs.toplevel(path)
        .ok_or_else(|| EkError::NotARepository(path.display().to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
