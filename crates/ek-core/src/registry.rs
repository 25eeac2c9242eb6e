use crate::error::{EkError, Result};
use crate::paths;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_WORKSPACE: &str = "default";

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// A registered (or discovered) project: a name bound to a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    pub fn meta_dir(&self) -> PathBuf {
        paths::meta_dir(&self.path)
    }

    pub fn ensure_meta(&self) -> Result<()> {
        crate::io::ensure_dir(&self.meta_dir())
    }

    /// Walk upward from `start` looking for a directory that carries `.eagle/`.
    /// Used for projects that were never registered.
    pub fn discover_from(start: &Path) -> Option<Self> {
        let mut dir = start.to_path_buf();
        loop {
            if paths::meta_dir(&dir).is_dir() {
                let name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| dir.display().to_string());
                return Some(Self::new(name, dir));
            }
            match dir.parent() {
                Some(p) => dir = p.to_path_buf(),
                None => return None,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registry document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default = "default_workspace_name")]
    pub current_workspace: String,
    #[serde(default, deserialize_with = "nullable_workspaces")]
    pub workspaces: BTreeMap<String, Workspace>,
}

fn default_workspace_name() -> String {
    DEFAULT_WORKSPACE.to_string()
}

/// `workspaces: {work: }` is written by hand surprisingly often; treat a null
/// workspace as an empty one instead of rejecting the whole registry.
fn nullable_workspaces<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Workspace>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<Workspace>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.unwrap_or_default()))
        .collect())
}

impl Default for Registry {
    fn default() -> Self {
        let mut workspaces = BTreeMap::new();
        workspaces.insert(DEFAULT_WORKSPACE.to_string(), Workspace::default());
        Self {
            current_workspace: default_workspace_name(),
            workspaces,
        }
    }
}

impl Registry {
    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = paths::registry_path(config_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut reg: Registry = serde_yaml::from_str(&data)?;
        reg.ensure_shape();
        Ok(reg)
    }

    pub fn save(&mut self, config_dir: &Path) -> Result<()> {
        self.ensure_shape();
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::registry_path(config_dir), data.as_bytes())
    }

    /// The current workspace always exists in the map.
    pub fn ensure_shape(&mut self) {
        if self.current_workspace.trim().is_empty() {
            self.current_workspace = default_workspace_name();
        }
        self.workspaces
            .entry(self.current_workspace.clone())
            .or_default();
    }

    // -----------------------------------------------------------------------
    // Workspaces
    // -----------------------------------------------------------------------

    /// The workspace an operation targets: the explicit override, else the
    /// current one.
    pub fn workspace_name(&self, explicit: Option<&str>) -> String {
        explicit
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.current_workspace.clone())
    }

    pub fn workspace(&self, name: &str) -> Option<&Workspace> {
        self.workspaces.get(name)
    }

    /// Switch the current workspace, creating it if needed.
    /// Returns true if the workspace was created.
    pub fn use_workspace(&mut self, name: &str) -> Result<bool> {
        paths::validate_name(name)?;
        let created = !self.workspaces.contains_key(name);
        self.workspaces.entry(name.to_string()).or_default();
        self.current_workspace = name.to_string();
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Register `path` under `name` in `workspace`, replacing an existing entry.
    /// Returns the previous entry, if any.
    pub fn add_project(&mut self, workspace: &str, name: &str, path: &Path) -> Result<Option<ProjectEntry>> {
        paths::validate_name(name)?;
        let ws = self.workspaces.entry(workspace.to_string()).or_default();
        Ok(ws.projects.insert(
            name.to_string(),
            ProjectEntry {
                path: path.display().to_string(),
            },
        ))
    }

    pub fn remove_project(&mut self, workspace: &str, name: &str) -> Result<ProjectEntry> {
        self.workspaces
            .get_mut(workspace)
            .and_then(|ws| ws.projects.remove(name))
            .ok_or_else(|| EkError::ProjectNotFound {
                workspace: workspace.to_string(),
                name: name.to_string(),
            })
    }

    pub fn projects(&self, workspace: &str) -> Vec<Project> {
        self.workspaces
            .get(workspace)
            .map(|ws| {
                ws.projects
                    .iter()
                    .map(|(name, entry)| Project::new(name, paths::expand_tilde(&entry.path)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn project(&self, workspace: &str, name: &str) -> Result<Project> {
        self.workspaces
            .get(workspace)
            .and_then(|ws| ws.projects.get(name))
            .map(|entry| Project::new(name, paths::expand_tilde(&entry.path)))
            .ok_or_else(|| EkError::ProjectNotFound {
                workspace: workspace.to_string(),
                name: name.to_string(),
            })
    }

    /// The project whose registered path contains `path`. When projects nest,
    /// the deepest (longest path) registration wins.
    pub fn project_for_path(&self, workspace: &str, path: &Path) -> Option<Project> {
        let target = normalize(path);
        self.projects(workspace)
            .into_iter()
            .filter_map(|p| {
                let root = normalize(&p.path);
                target
                    .starts_with(&root)
                    .then(|| (root.as_os_str().len(), p))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, p)| p)
    }
}

fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_registry_loads_default() {
        let dir = TempDir::new().unwrap();
        let reg = Registry::load(dir.path()).unwrap();
        assert_eq!(reg.current_workspace, "default");
        assert!(reg.workspaces.contains_key("default"));
    }

    #[test]
    fn null_workspace_is_repaired() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("registry.yaml"),
            "current_workspace: work\nworkspaces:\n  work:\n",
        )
        .unwrap();
        let reg = Registry::load(dir.path()).unwrap();
        assert!(reg.workspace("work").unwrap().projects.is_empty());
    }

    #[test]
    fn add_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut reg = Registry::default();
        reg.add_project("default", "webapp", Path::new("/srv/webapp"))
            .unwrap();
        reg.save(dir.path()).unwrap();

        let loaded = Registry::load(dir.path()).unwrap();
        let p = loaded.project("default", "webapp").unwrap();
        assert_eq!(p.path, PathBuf::from("/srv/webapp"));
    }

    #[test]
    fn add_rejects_invalid_name() {
        let mut reg = Registry::default();
        assert!(reg
            .add_project("default", "bad name", Path::new("/tmp"))
            .is_err());
    }

    #[test]
    fn remove_unknown_project_fails() {
        let mut reg = Registry::default();
        assert!(matches!(
            reg.remove_project("default", "ghost"),
            Err(EkError::ProjectNotFound { .. })
        ));
    }

    #[test]
    fn deepest_registered_project_wins() {
        let dir = TempDir::new().unwrap();
        let outer = dir.path().join("mono");
        let inner = outer.join("services/api");
        std::fs::create_dir_all(inner.join("src")).unwrap();

        let mut reg = Registry::default();
        reg.add_project("default", "mono", &outer).unwrap();
        reg.add_project("default", "api", &inner).unwrap();

        let found = reg
            .project_for_path("default", &inner.join("src"))
            .unwrap();
        assert_eq!(found.name, "api");

        let found = reg.project_for_path("default", &outer).unwrap();
        assert_eq!(found.name, "mono");

        assert!(reg.project_for_path("default", dir.path()).is_none());
    }

    #[test]
    fn sibling_with_common_prefix_does_not_match() {
        let dir = TempDir::new().unwrap();
        let app = dir.path().join("app");
        let app2 = dir.path().join("app2");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::create_dir_all(&app2).unwrap();

        let mut reg = Registry::default();
        reg.add_project("default", "app", &app).unwrap();
        assert!(reg.project_for_path("default", &app2).is_none());
    }

    #[test]
    fn use_workspace_creates_and_switches() {
        let mut reg = Registry::default();
        assert!(reg.use_workspace("work").unwrap());
        assert_eq!(reg.current_workspace, "work");
        assert!(!reg.use_workspace("work").unwrap());
        assert_eq!(reg.workspace_name(Some("personal")), "personal");
        assert_eq!(reg.workspace_name(None), "work");
    }

    #[test]
    fn discover_from_walks_up_to_meta_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".eagle")).unwrap();
        let deep = dir.path().join("src/deep");
        std::fs::create_dir_all(&deep).unwrap();
        let found = Project::discover_from(&deep).unwrap();
        assert_eq!(found.path, dir.path());
    }
}
