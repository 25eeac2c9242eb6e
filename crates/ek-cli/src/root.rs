use anyhow::Context;
use clap::Args;
use ek_core::error::EkError;
use ek_core::paths;
use ek_core::registry::{Project, Registry};
use std::path::{Path, PathBuf};

/// Project selection flags shared by every command that acts on one project.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Project name (default: the project containing the current directory)
    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    /// Workspace to look the project up in
    #[arg(long, env = "EK_WORKSPACE")]
    pub ws: Option<String>,
}

impl ProjectArgs {
    pub fn resolve(&self, config_dir: &Path) -> anyhow::Result<Project> {
        let registry = load_registry(config_dir)?;
        let ws = registry.workspace_name(self.ws.as_deref());
        resolve_project(&registry, &ws, self.name.as_deref(), &cwd())
    }
}

pub fn load_registry(config_dir: &Path) -> anyhow::Result<Registry> {
    Registry::load(config_dir)
        .with_context(|| format!("failed to load {}", paths::registry_path(config_dir).display()))
}

pub fn cwd() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// The workspace named by `EK_WORKSPACE`, if any.
pub fn workspace_from_env() -> Option<String> {
    std::env::var("EK_WORKSPACE").ok().filter(|w| !w.is_empty())
}

/// Resolve the project a command acts on.
///
/// Priority:
/// 1. An explicit name, looked up in `ws`
/// 2. The registered project whose path contains `dir` (deepest wins)
/// 3. Walk upward from `dir` looking for `.eagle/`
pub fn resolve_project(registry: &Registry, ws: &str, name: Option<&str>, dir: &Path) -> anyhow::Result<Project> {
    if let Some(name) = name {
        return Ok(registry.project(ws, name)?);
    }
    current_project(registry, ws, dir)
        .ok_or_else(|| EkError::NoProjectForPath(dir.display().to_string()).into())
}

pub fn current_project(registry: &Registry, ws: &str, dir: &Path) -> Option<Project> {
    registry
        .project_for_path(ws, dir)
        .or_else(|| Project::discover_from(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_name_wins() {
        let dir = TempDir::new().unwrap();
        let mut reg = Registry::default();
        reg.add_project("default", "api", dir.path()).unwrap();
        let p = resolve_project(&reg, "default", Some("api"), Path::new("/")).unwrap();
        assert_eq!(p.path, dir.path());
    }

    #[test]
    fn unknown_name_is_an_error() {
        let reg = Registry::default();
        let err = resolve_project(&reg, "default", Some("ghost"), Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn falls_back_to_registered_path_then_meta_dir() {
        let dir = TempDir::new().unwrap();
        let registered = dir.path().join("registered");
        let loose = dir.path().join("loose");
        std::fs::create_dir_all(registered.join("src")).unwrap();
        std::fs::create_dir_all(loose.join(".eagle")).unwrap();
        std::fs::create_dir_all(loose.join("lib")).unwrap();

        let mut reg = Registry::default();
        reg.add_project("default", "reg", &registered).unwrap();

        let p = resolve_project(&reg, "default", None, &registered.join("src")).unwrap();
        assert_eq!(p.name, "reg");

        let p = resolve_project(&reg, "default", None, &loose.join("lib")).unwrap();
        assert_eq!(p.name, "loose");
    }
}
