use crate::output::{print_fields, print_json, print_table, warn};
use crate::root::{self, load_registry};
use anyhow::Context;
use ek_core::defaults::Defaults;
use ek_core::error::EkError;
use ek_core::ignore;
use ek_core::registry::Project;
use ek_core::resolver::TaskDefinitionResolver;
use ek_core::todo::TodoList;
use ek_core::vcs::{BranchState, GitCli};
use std::path::Path;

pub fn add(config_dir: &Path, path: &Path, name: Option<&str>, ws: Option<&str>, json: bool) -> anyhow::Result<()> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root::cwd().join(path)
    };
    if !path.is_dir() {
        return Err(EkError::PathNotFound(path.display().to_string()).into());
    }
    let path = std::fs::canonicalize(&path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    let name = match name {
        Some(n) => n.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("cannot derive a project name from the filesystem root; pass --name")?,
    };

    let mut registry = load_registry(config_dir)?;
    let ws = registry.workspace_name(ws);
    let previous = registry.add_project(&ws, &name, &path)?;
    registry.save(config_dir).context("failed to save registry")?;

    let project = Project::new(&name, &path);
    project
        .ensure_meta()
        .with_context(|| format!("failed to create {}", project.meta_dir().display()))?;

    let policy = Defaults::load(config_dir).preferences.ignore_policy;
    match ignore::apply(&GitCli, policy, &path) {
        Ok(outcome) if outcome.changed => {
            tracing::debug!(policy = %policy, "added .eagle/ to ignore file");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("could not apply ignore policy '{policy}': {e}"),
    }

    if json {
        print_json(&serde_json::json!({
            "name": name,
            "path": path,
            "workspace": ws,
            "replaced": previous.is_some(),
        }))?;
    } else {
        println!("Added project '{name}' -> {} (workspace '{ws}')", path.display());
    }
    Ok(())
}

pub fn list(config_dir: &Path, ws: Option<&str>, json: bool) -> anyhow::Result<()> {
    let registry = load_registry(config_dir)?;
    let ws = registry.workspace_name(ws);
    let projects = registry.projects(&ws);

    if json {
        let items: Vec<_> = projects
            .iter()
            .map(|p| serde_json::json!({ "name": p.name, "path": p.path }))
            .collect();
        print_json(&items)?;
        return Ok(());
    }

    if projects.is_empty() {
        println!("No projects in workspace '{ws}'. Register one with `ek add <path>`.");
        return Ok(());
    }
    let rows: Vec<Vec<String>> = projects
        .iter()
        .map(|p| vec![p.name.clone(), p.path.display().to_string()])
        .collect();
    print_table(&["NAME", "PATH"], &rows);
    Ok(())
}

pub fn status(config_dir: &Path, ws: Option<&str>, json: bool) -> anyhow::Result<()> {
    let registry = load_registry(config_dir)?;
    let ws = registry.workspace_name(ws);
    let cwd = root::cwd();

    let Some(project) = root::current_project(&registry, &ws, &cwd) else {
        if json {
            print_json(&serde_json::json!({ "workspace": ws, "project": null }))?;
        } else {
            print_fields(&[
                ("Workspace", ws.clone()),
                ("Project", format!("none for {}", cwd.display())),
            ]);
        }
        return Ok(());
    };

    let tasks = TaskDefinitionResolver::new(&GitCli).load(&project.path);
    let todos = TodoList::load(&project.path)
        .map(|t| t.open_count())
        .unwrap_or_else(|e| {
            tracing::warn!("failed to read todo list: {e}");
            0
        });
    let branch = match &tasks.branch {
        BranchState::Branch(b) => b.clone(),
        BranchState::Unavailable(reason) => format!("unavailable ({reason})"),
    };

    if json {
        print_json(&serde_json::json!({
            "workspace": ws,
            "project": project.name,
            "path": project.path,
            "branch": tasks.branch.name(),
            "degraded": tasks.is_degraded(),
            "tasks": tasks.tasks.len(),
            "diagnostics": tasks.diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            "open_todos": todos,
        }))?;
        return Ok(());
    }

    print_fields(&[
        ("Workspace", ws),
        ("Project", project.name.clone()),
        ("Path", project.path.display().to_string()),
        ("Branch", branch),
        ("Tasks", tasks.tasks.len().to_string()),
        ("Open todos", todos.to_string()),
    ]);
    for d in &tasks.diagnostics {
        warn(d);
    }
    Ok(())
}

pub fn cd(config_dir: &Path, project: &str, ws: Option<&str>) -> anyhow::Result<()> {
    let registry = load_registry(config_dir)?;
    let ws = registry.workspace_name(ws);
    let project = registry.project(&ws, project)?;
    println!("{}", project.path.display());
    Ok(())
}

pub fn remove(config_dir: &Path, project: &str, ws: Option<&str>, json: bool) -> anyhow::Result<()> {
    let mut registry = load_registry(config_dir)?;
    let ws = registry.workspace_name(ws);
    let entry = registry.remove_project(&ws, project)?;
    registry.save(config_dir).context("failed to save registry")?;

    if json {
        print_json(&serde_json::json!({
            "name": project,
            "path": entry.path,
            "workspace": ws,
            "removed": true,
        }))?;
    } else {
        println!("Removed project '{project}' from workspace '{ws}' ({} left on disk)", entry.path);
    }
    Ok(())
}
