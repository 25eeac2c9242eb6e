use crate::error::{EkError, Result};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const APP_NAME: &str = "eaglekit";
pub const META_DIR: &str = ".eagle";
pub const IGNORE_ENTRY: &str = ".eagle/";

pub const PROJECT_CONFIG_FILE: &str = "config.yaml";
pub const BRANCHES_DIR: &str = "branches";
pub const SCRIPTS_DIR: &str = "scripts";
pub const TODO_FILE: &str = "todo.json";
pub const COMMENTS_FILE: &str = "comments.json";

pub const REGISTRY_FILE: &str = "registry.yaml";
pub const DEFAULTS_FILE: &str = "defaults.yaml";
pub const PLUGINS_DIR: &str = "plugins";

/// Overrides the user config directory.
pub const CONFIG_DIR_ENV: &str = "EK_CONFIG_DIR";

// ---------------------------------------------------------------------------
// Project paths
// ---------------------------------------------------------------------------

pub fn meta_dir(root: &Path) -> PathBuf {
    root.join(META_DIR)
}

pub fn project_config_path(root: &Path) -> PathBuf {
    meta_dir(root).join(PROJECT_CONFIG_FILE)
}

/// Directory holding the overlay for `branch`. Branch names containing `/`
/// map to nested directories (`feature/x` → `branches/feature/x`).
pub fn branch_dir(root: &Path, branch: &str) -> PathBuf {
    meta_dir(root).join(BRANCHES_DIR).join(branch)
}

pub fn branch_config_path(root: &Path, branch: &str) -> PathBuf {
    branch_dir(root, branch).join(PROJECT_CONFIG_FILE)
}

pub fn scripts_dir(root: &Path) -> PathBuf {
    meta_dir(root).join(SCRIPTS_DIR)
}

pub fn todo_path(root: &Path) -> PathBuf {
    meta_dir(root).join(TODO_FILE)
}

pub fn comments_path(root: &Path) -> PathBuf {
    meta_dir(root).join(COMMENTS_FILE)
}

/// A branch name is only used as a path when every component is a plain name.
pub fn is_safe_branch_path(branch: &str) -> bool {
    !branch.is_empty()
        && Path::new(branch)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

// ---------------------------------------------------------------------------
// User config paths
// ---------------------------------------------------------------------------

/// Resolve the user config directory.
///
/// Priority:
/// 1. `EK_CONFIG_DIR`
/// 2. `$XDG_CONFIG_HOME/eaglekit`
/// 3. `~/.config/eaglekit`
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join(APP_NAME));
    }
    let home = home::home_dir().ok_or(EkError::HomeNotFound)?;
    Ok(home.join(".config").join(APP_NAME))
}

pub fn registry_path(config_dir: &Path) -> PathBuf {
    config_dir.join(REGISTRY_FILE)
}

pub fn defaults_path(config_dir: &Path) -> PathBuf {
    config_dir.join(DEFAULTS_FILE)
}

pub fn plugins_dir(config_dir: &Path) -> PathBuf {
    config_dir.join(PLUGINS_DIR)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = home::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ---------------------------------------------------------------------------
// Name validation
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Regex> = OnceLock::new();

fn name_re() -> &'static Regex {
    NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").unwrap())
}

/// Validate a project, workspace or task name created through the CLI.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !name_re().is_match(name) {
        return Err(EkError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
