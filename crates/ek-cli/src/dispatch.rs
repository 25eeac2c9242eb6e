//! Bridges the router to the CLI: builtins go through clap, plugins through
//! the registry, tasks through `cmd::run`.

use crate::root;
use crate::CliExit;
use ek_core::plugin::{PluginContext, PluginRegistry};
use ek_core::registry::Project;
use ek_core::resolver::{EffectiveTaskSet, TaskDefinitionResolver};
use ek_core::router::{Dispatcher, Invocation, TaskCatalog};
use ek_core::vcs::{GitCli, Vcs};
use std::cell::OnceCell;
use std::path::Path;

/// The current project and its effective tasks.
pub struct Loaded {
    pub project: Project,
    pub tasks: EffectiveTaskSet,
}

/// Task catalog that only touches the registry and git when the router
/// actually asks about a task.
pub struct LazyTasks<'a> {
    config_dir: &'a Path,
    loaded: OnceCell<Option<Loaded>>,
}

impl<'a> LazyTasks<'a> {
    pub fn new(config_dir: &'a Path) -> Self {
        Self {
            config_dir,
            loaded: OnceCell::new(),
        }
    }

    pub fn get(&self) -> Option<&Loaded> {
        self.loaded.get_or_init(|| self.load()).as_ref()
    }

    fn load(&self) -> Option<Loaded> {
        let project = current_project(self.config_dir)?;
        let tasks = TaskDefinitionResolver::new(&GitCli).load(&project.path);
        Some(Loaded { project, tasks })
    }
}

impl TaskCatalog for LazyTasks<'_> {
    fn has_task(&self, name: &str) -> bool {
        self.get().is_some_and(|l| l.tasks.has_task(name))
    }
}

fn current_project(config_dir: &Path) -> Option<Project> {
    let registry = match root::load_registry(config_dir) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("{e:#}");
            return None;
        }
    };
    let ws = registry.workspace_name(root::workspace_from_env().as_deref());
    root::current_project(&registry, &ws, &root::cwd())
}

pub struct CliDispatcher<'a> {
    pub argv: &'a [String],
    pub config_dir: &'a Path,
    pub plugins: &'a PluginRegistry,
    pub tasks: &'a LazyTasks<'a>,
}

impl Dispatcher for CliDispatcher<'_> {
    type Output = anyhow::Result<()>;

    fn builtin(&mut self, _verb: &str, _inv: &Invocation) -> anyhow::Result<()> {
        crate::run_builtin(self.config_dir, self.argv)
    }

    fn plugin(&mut self, namespace: &str, args: &[String]) -> anyhow::Result<()> {
        let ctx = match current_project(self.config_dir) {
            Some(p) => PluginContext {
                branch: GitCli.current_branch(&p.path).name().map(str::to_string),
                project_root: Some(p.path),
                ..Default::default()
            },
            None => PluginContext::default(),
        };
        let code = self.plugins.dispatch(namespace, args, &ctx)?;
        crate::cmd::run::child_exit(code)
    }

    fn task(&mut self, name: &str, args: &[String]) -> anyhow::Result<()> {
        let loaded = self
            .tasks
            .get()
            .ok_or_else(|| CliExit::Unresolved(name.to_string()))?;
        crate::cmd::run::execute(&loaded.project, &loaded.tasks, name, args, false, false)
    }

    fn unresolved(&mut self, head: &str) -> anyhow::Result<()> {
        Err(CliExit::Unresolved(head.to_string()).into())
    }
}
