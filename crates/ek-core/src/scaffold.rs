//! Script scaffolding for `ek run new`.

use crate::error::Result;
use crate::paths;
use crate::task::TaskDefinition;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTemplate {
    Bash,
    Python,
    Batch,
    Pwsh,
}

impl ScriptTemplate {
    pub fn extension(&self) -> &'static str {
        match self {
            ScriptTemplate::Bash => "sh",
            ScriptTemplate::Python => "py",
            ScriptTemplate::Batch => "bat",
            ScriptTemplate::Pwsh => "ps1",
        }
    }

    pub fn interpreter(&self) -> &'static str {
        match self {
            ScriptTemplate::Bash => "bash",
            ScriptTemplate::Python => "python3",
            ScriptTemplate::Batch => "cmd",
            ScriptTemplate::Pwsh => "pwsh",
        }
    }

    fn body(&self) -> &'static str {
        match self {
            ScriptTemplate::Bash => "#!/usr/bin/env bash\nset -euo pipefail\n\necho \"Hello from $0\"\n",
            ScriptTemplate::Python => {
                "#!/usr/bin/env python3\nimport sys\n\nprint('Hello from', sys.argv[0])\n"
            }
            ScriptTemplate::Batch => "@echo off\r\necho Hello from %~nx0\r\n",
            ScriptTemplate::Pwsh => {
                "param([String[]]$Rest)\nWrite-Host \"Hello from $($MyInvocation.MyCommand.Name)\"\n"
            }
        }
    }

    /// Unix scripts get the executable bit.
    fn executable(&self) -> bool {
        matches!(self, ScriptTemplate::Bash | ScriptTemplate::Python)
    }
}

/// A scaffolded script and the task definition that runs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scaffolded {
    pub path: PathBuf,
    pub created: bool,
    pub task: TaskDefinition,
}

/// Write `.eagle/scripts/<name>.<ext>` unless it already exists. The task
/// path is stored relative to the project root.
pub fn scaffold_script(project_root: &Path, name: &str, template: ScriptTemplate) -> Result<Scaffolded> {
    paths::validate_name(name)?;
    let path = paths::scripts_dir(project_root).join(format!("{name}.{}", template.extension()));
    let created = crate::io::write_if_missing(&path, template.body().as_bytes())?;
    if created && template.executable() {
        set_executable(&path)?;
    }
    let relative = path
        .strip_prefix(project_root)
        .unwrap_or(&path)
        .to_string_lossy()
        .replace('\\', "/");
    Ok(Scaffolded {
        task: TaskDefinition::script(relative, Some(template.interpreter().to_string())),
        path,
        created,
    })
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o775))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scaffolds_once_and_maps_relative_path() {
        let dir = TempDir::new().unwrap();
        let first = scaffold_script(dir.path(), "deploy", ScriptTemplate::Bash).unwrap();
        assert!(first.created);
        assert_eq!(
            first.task,
            TaskDefinition::script(".eagle/scripts/deploy.sh", Some("bash".to_string()))
        );

        std::fs::write(&first.path, "custom\n").unwrap();
        let second = scaffold_script(dir.path(), "deploy", ScriptTemplate::Bash).unwrap();
        assert!(!second.created);
        assert_eq!(std::fs::read_to_string(&second.path).unwrap(), "custom\n");
    }

    #[cfg(unix)]
    #[test]
    fn unix_scripts_are_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let s = scaffold_script(dir.path(), "gen", ScriptTemplate::Python).unwrap();
        let mode = std::fs::metadata(&s.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o775);
    }

    #[test]
    fn rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        assert!(scaffold_script(dir.path(), "../evil", ScriptTemplate::Bash).is_err());
    }
}
