//! Branch-aware task resolution.
//!
//! The effective set is rebuilt on every invocation from the project's base
//! `config.yaml` and, when the active branch has one, the overlay under
//! `.eagle/branches/<branch>/config.yaml`. Overlay entries replace base
//! entries wholesale.

use crate::paths;
use crate::router::TaskCatalog;
use crate::task::{parse_tasks, TaskDefinition, TaskFile, TaskParseError, TaskScope, TaskSet};
use crate::vcs::{BranchState, Vcs};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Where an effective task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrigin {
    Base,
    Overlay,
}

/// One parsed configuration layer.
#[derive(Debug, Clone, Default)]
pub struct TaskLayer {
    pub tasks: TaskSet,
    pub errors: Vec<TaskParseError>,
}

impl TaskLayer {
    /// Parse a task file. A missing file is an empty layer; an unreadable one
    /// is an empty layer with a single file-level error.
    pub fn from_file(path: &Path, scope: TaskScope) -> Self {
        let file = match TaskFile::load(path) {
            Ok(f) => f,
            Err(e) => return Self::file_error(scope, e.to_string()),
        };
        match file.tasks() {
            Ok(Some(m)) => {
                let (tasks, errors) = parse_tasks(m, &scope);
                Self { tasks, errors }
            }
            Ok(None) => Self::default(),
            Err(reason) => Self::file_error(scope, reason),
        }
    }

    fn file_error(scope: TaskScope, reason: String) -> Self {
        Self {
            tasks: TaskSet::new(),
            errors: vec![TaskParseError {
                scope,
                task: None,
                reason,
            }],
        }
    }
}

/// The task mapping used for one invocation.
#[derive(Debug, Clone)]
pub struct EffectiveTaskSet {
    pub tasks: TaskSet,
    pub origins: BTreeMap<String, TaskOrigin>,
    pub diagnostics: Vec<TaskParseError>,
    pub branch: BranchState,
}

impl EffectiveTaskSet {
    /// True when the branch could not be determined and only the base set
    /// was used.
    pub fn is_degraded(&self) -> bool {
        matches!(self.branch, BranchState::Unavailable(_))
    }

    pub fn get(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn origin(&self, name: &str) -> Option<TaskOrigin> {
        self.origins.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskCatalog for EffectiveTaskSet {
    fn has_task(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

/// Merge a base layer with an optional overlay.
///
/// The overlay is only consulted when `branch` is known. An overlay entry that
/// failed to parse removes the same-named base task: the overlay meant to
/// replace it, and running the stale base definition would be wrong.
pub fn resolve(base: TaskLayer, overlay: Option<TaskLayer>, branch: BranchState) -> EffectiveTaskSet {
    let mut origins: BTreeMap<String, TaskOrigin> = base
        .tasks
        .keys()
        .map(|k| (k.clone(), TaskOrigin::Base))
        .collect();
    let mut tasks = base.tasks;
    let mut diagnostics = base.errors;

    if let (Some(overlay), BranchState::Branch(_)) = (overlay, &branch) {
        for (name, def) in overlay.tasks {
            origins.insert(name.clone(), TaskOrigin::Overlay);
            tasks.insert(name, def);
        }
        for err in overlay.errors {
            if let Some(name) = &err.task {
                tasks.remove(name);
                origins.remove(name);
            }
            diagnostics.push(err);
        }
    }

    EffectiveTaskSet {
        tasks,
        origins,
        diagnostics,
        branch,
    }
}

/// Loads the effective task set for a project directory.
pub struct TaskDefinitionResolver<'a> {
    vcs: &'a dyn Vcs,
}

impl<'a> TaskDefinitionResolver<'a> {
    pub fn new(vcs: &'a dyn Vcs) -> Self {
        Self { vcs }
    }

    pub fn load(&self, project_root: &Path) -> EffectiveTaskSet {
        let branch = self.vcs.current_branch(project_root);
        let base = TaskLayer::from_file(&paths::project_config_path(project_root), TaskScope::Project);

        let overlay = match &branch {
            BranchState::Branch(b) if paths::is_safe_branch_path(b) => {
                let path = paths::branch_config_path(project_root, b);
                path.exists()
                    .then(|| TaskLayer::from_file(&path, TaskScope::Branch(b.clone())))
            }
            BranchState::Branch(b) => {
                tracing::warn!(branch = %b, "branch name is not usable as a path; skipping overlay");
                None
            }
            BranchState::Unavailable(reason) => {
                tracing::debug!(%reason, "branch unavailable; using base tasks only");
                None
            }
        };

        let set = resolve(base, overlay, branch);
        for d in &set.diagnostics {
            tracing::debug!(diagnostic = %d, "task parse error");
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::fake::FakeVcs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, body).unwrap();
    }

    fn release_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            ".eagle/config.yaml",
            "tasks:\n  build: make all\n  test: pytest\n",
        );
        write(
            dir.path(),
            ".eagle/branches/release/config.yaml",
            "tasks:\n  build:\n    type: script\n    path: scripts/release_build.sh\n",
        );
        dir
    }

    #[test]
    fn overlay_replaces_base_on_its_branch() {
        let dir = release_project();
        let vcs = FakeVcs::on_branch("release");
        let set = TaskDefinitionResolver::new(&vcs).load(dir.path());

        assert_eq!(
            set.get("build"),
            Some(&TaskDefinition::script("scripts/release_build.sh", None))
        );
        assert_eq!(set.get("test"), Some(&TaskDefinition::shell("pytest")));
        assert_eq!(set.origin("build"), Some(TaskOrigin::Overlay));
        assert_eq!(set.origin("test"), Some(TaskOrigin::Base));
        assert!(!set.is_degraded());
    }

    #[test]
    fn other_branch_sees_base_set() {
        let dir = release_project();
        let vcs = FakeVcs::on_branch("main");
        let set = TaskDefinitionResolver::new(&vcs).load(dir.path());
        assert_eq!(set.get("build"), Some(&TaskDefinition::shell("make all")));
        assert_eq!(set.tasks.len(), 2);
    }

    #[test]
    fn detached_head_degrades_to_base() {
        let dir = release_project();
        let vcs = FakeVcs::detached();
        let set = TaskDefinitionResolver::new(&vcs).load(dir.path());
        assert!(set.is_degraded());
        assert_eq!(set.get("build"), Some(&TaskDefinition::shell("make all")));
        assert!(set.diagnostics.is_empty());
    }

    #[test]
    fn overlay_only_tasks_are_added() {
        let dir = release_project();
        write(
            dir.path(),
            ".eagle/branches/feature/login/config.yaml",
            "tasks:\n  seed: [./seed, --users, \"10\"]\n",
        );
        let vcs = FakeVcs::on_branch("feature/login");
        let set = TaskDefinitionResolver::new(&vcs).load(dir.path());
        assert_eq!(set.tasks.len(), 3);
        assert_eq!(set.origin("seed"), Some(TaskOrigin::Overlay));
    }

    #[test]
    fn malformed_entries_become_diagnostics() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            ".eagle/config.yaml",
            "tasks:\n  good: echo ok\n  bad: {type: rocket}\n",
        );
        let vcs = FakeVcs::on_branch("main");
        let set = TaskDefinitionResolver::new(&vcs).load(dir.path());
        assert!(set.has_task("good"));
        assert!(!set.has_task("bad"));
        assert_eq!(set.diagnostics.len(), 1);
    }

    #[test]
    fn malformed_overlay_entry_hides_base_task() {
        let mut base = TaskSet::new();
        base.insert("build".to_string(), TaskDefinition::shell("make"));
        base.insert("test".to_string(), TaskDefinition::shell("pytest"));
        let overlay = TaskLayer {
            tasks: TaskSet::new(),
            errors: vec![TaskParseError {
                scope: TaskScope::Branch("release".to_string()),
                task: Some("build".to_string()),
                reason: "unknown task type 'x'".to_string(),
            }],
        };
        let set = resolve(
            TaskLayer {
                tasks: base,
                errors: vec![],
            },
            Some(overlay),
            BranchState::Branch("release".to_string()),
        );
        assert!(!set.has_task("build"));
        assert!(set.has_task("test"));
        assert_eq!(set.diagnostics.len(), 1);
    }

    #[test]
    fn unreadable_file_is_a_file_level_diagnostic() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".eagle/config.yaml", "tasks: [unclosed\n");
        let vcs = FakeVcs::on_branch("main");
        let set = TaskDefinitionResolver::new(&vcs).load(dir.path());
        assert!(set.is_empty());
        assert_eq!(set.diagnostics.len(), 1);
        assert!(set.diagnostics[0].task.is_none());
    }

    #[test]
    fn missing_config_is_empty_and_quiet() {
        let dir = TempDir::new().unwrap();
        let vcs = FakeVcs::on_branch("main");
        let set = TaskDefinitionResolver::new(&vcs).load(dir.path());
        assert!(set.is_empty());
        assert!(set.diagnostics.is_empty());
    }
}
