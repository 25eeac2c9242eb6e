use crate::error::{EkError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// IgnorePolicy
// ---------------------------------------------------------------------------

/// Where `.eagle/` gets ignored when a project is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnorePolicy {
    /// `.git/info/exclude`, personal and unversioned.
    Local,
    /// `.gitignore`, versioned with the repository.
    Repo,
    /// The user's global git excludes file.
    Global,
    #[default]
    None,
}

impl IgnorePolicy {
    pub const ALL: [IgnorePolicy; 4] = [
        IgnorePolicy::Local,
        IgnorePolicy::Repo,
        IgnorePolicy::Global,
        IgnorePolicy::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IgnorePolicy::Local => "local",
            IgnorePolicy::Repo => "repo",
            IgnorePolicy::Global => "global",
            IgnorePolicy::None => "none",
        }
    }
}

impl fmt::Display for IgnorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IgnorePolicy {
    type Err = EkError;

    fn from_str(s: &str) -> Result<Self> {
        IgnorePolicy::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| EkError::InvalidIgnorePolicy(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub ignore_policy: IgnorePolicy,
}

/// User-level preferences written by `ek setup`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default)]
    pub user: UserPrefs,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub first_run_done: bool,
}

impl Defaults {
    /// Missing or unreadable defaults fall back to `Defaults::default()`;
    /// preferences never block a command.
    pub fn load(config_dir: &Path) -> Self {
        let path = paths::defaults_path(config_dir);
        let Ok(data) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_yaml::from_str::<Option<Defaults>>(&data) {
            Ok(parsed) => parsed.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable defaults file");
                Self::default()
            }
        }
    }

    pub fn save(&self, config_dir: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::defaults_path(config_dir), data.as_bytes())
    }

    pub fn first_run_needed(&self) -> bool {
        !self.first_run_done
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
