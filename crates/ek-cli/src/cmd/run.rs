use crate::output::{print_json, print_table, warn};
use crate::root::ProjectArgs;
use crate::CliExit;
use anyhow::Context;
use clap::{ArgGroup, Subcommand};
use ek_core::executor::{ExecError, ExecutionContext, ExecutionResult, TaskExecutor};
use ek_core::paths;
use ek_core::registry::Project;
use ek_core::resolver::{EffectiveTaskSet, TaskDefinitionResolver, TaskOrigin};
use ek_core::scaffold::{scaffold_script, ScriptTemplate};
use ek_core::task::{TaskDefinition, TaskFile};
use ek_core::vcs::{BranchState, GitCli, Vcs};
use std::path::Path;

#[derive(Subcommand)]
pub enum RunSubcommand {
    /// List the tasks available on the current branch
    List {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Run a task; everything after the task name is passed to it
    #[command(alias = "do")]
    Task {
        #[command(flatten)]
        project: ProjectArgs,
        /// Print the resolved command instead of running it
        #[arg(long)]
        dry_run: bool,
        task: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Create a task, optionally scaffolding a script for it
    #[command(group(
        ArgGroup::new("kind")
            .required(true)
            .args(["cmd", "bash", "python", "pwsh", "batch"])
    ))]
    New {
        task: String,
        #[command(flatten)]
        project: ProjectArgs,
        /// Shell command the task runs
        #[arg(long)]
        cmd: Option<String>,
        /// Scaffold .eagle/scripts/<task>.sh
        #[arg(long)]
        bash: bool,
        /// Scaffold .eagle/scripts/<task>.py
        #[arg(long)]
        python: bool,
        /// Scaffold .eagle/scripts/<task>.ps1
        #[arg(long)]
        pwsh: bool,
        /// Scaffold .eagle/scripts/<task>.bat
        #[arg(long)]
        batch: bool,
        /// Write into the current branch's overlay instead of the project config
        #[arg(long)]
        branch: bool,
    },
}

pub fn run(config_dir: &Path, subcmd: RunSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RunSubcommand::List { project } => {
            let project = project.resolve(config_dir)?;
            list(&project, json)
        }
        RunSubcommand::Task {
            project,
            dry_run,
            task,
            args,
        } => {
            let project = project.resolve(config_dir)?;
            let tasks = TaskDefinitionResolver::new(&GitCli).load(&project.path);
            if !tasks.tasks.contains_key(&task) {
                anyhow::bail!(
                    "no task '{task}' in project '{}' (available: {})",
                    project.name,
                    available(&tasks)
                );
            }
            execute(&project, &tasks, &task, &args, dry_run, json)
        }
        RunSubcommand::New {
            task,
            project,
            cmd,
            bash,
            python,
            pwsh,
            batch,
            branch,
        } => {
            let project = project.resolve(config_dir)?;
            let template = if bash {
                Some(ScriptTemplate::Bash)
            } else if python {
                Some(ScriptTemplate::Python)
            } else if pwsh {
                Some(ScriptTemplate::Pwsh)
            } else if batch {
                Some(ScriptTemplate::Batch)
            } else {
                None
            };
            create(&project, &task, cmd, template, branch, json)
        }
    }
}

/// Propagate a child's exit code without printing anything.
pub fn child_exit(code: i32) -> anyhow::Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(CliExit::Child(code).into())
    }
}

/// Run (or with `dry_run`, only plan) a task from the effective set.
pub fn execute(
    project: &Project,
    tasks: &EffectiveTaskSet,
    name: &str,
    args: &[String],
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    for d in &tasks.diagnostics {
        tracing::warn!("{d}");
    }
    let ctx = ExecutionContext::for_project(&project.path, tasks.branch.name().map(str::to_string));
    let executor = TaskExecutor::new(ctx);

    if dry_run {
        let def = tasks
            .get(name)
            .ok_or_else(|| ExecError::TaskNotFound(name.to_string()))?;
        let planned = executor.plan(def, args)?;
        if json {
            print_json(&serde_json::json!({
                "task": name,
                "command": planned,
                "result": ExecutionResult::not_attempted(),
            }))?;
        } else {
            println!("{}", planned.display());
            println!("  (in {})", planned.cwd.display());
        }
        return Ok(());
    }

    let result = executor
        .run_named(&tasks.tasks, name, args)
        .with_context(|| format!("task '{name}' failed"))?;
    child_exit(result.exit_code)
}

fn available(tasks: &EffectiveTaskSet) -> String {
    if tasks.is_empty() {
        "none".to_string()
    } else {
        tasks.tasks.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

fn origin_label(tasks: &EffectiveTaskSet, name: &str) -> String {
    match (tasks.origin(name), tasks.branch.name()) {
        (Some(TaskOrigin::Overlay), Some(b)) => format!("branch:{b}"),
        _ => "project".to_string(),
    }
}

fn list(project: &Project, json: bool) -> anyhow::Result<()> {
    let tasks = TaskDefinitionResolver::new(&GitCli).load(&project.path);

    if json {
        let items: Vec<_> = tasks
            .tasks
            .iter()
            .map(|(name, def)| {
                serde_json::json!({
                    "name": name,
                    "kind": def.kind().as_str(),
                    "definition": def.summary(),
                    "origin": origin_label(&tasks, name),
                })
            })
            .collect();
        print_json(&serde_json::json!({
            "project": project.name,
            "branch": tasks.branch.name(),
            "degraded": tasks.is_degraded(),
            "tasks": items,
            "diagnostics": tasks.diagnostics.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
        }))?;
        return Ok(());
    }

    if let BranchState::Unavailable(reason) = &tasks.branch {
        eprintln!("note: branch unavailable ({reason}); showing project tasks only");
    }
    for d in &tasks.diagnostics {
        warn(d);
    }
    if tasks.is_empty() {
        println!(
            "No tasks in '{}'. Create one with `ek run new <name> --cmd \"...\"`.",
            project.name
        );
        return Ok(());
    }
    let rows: Vec<Vec<String>> = tasks
        .tasks
        .iter()
        .map(|(name, def)| {
            vec![
                name.clone(),
                def.kind().to_string(),
                def.summary(),
                origin_label(&tasks, name),
            ]
        })
        .collect();
    print_table(&["TASK", "KIND", "DEFINITION", "ORIGIN"], &rows);
    Ok(())
}

fn create(
    project: &Project,
    task: &str,
    cmd: Option<String>,
    template: Option<ScriptTemplate>,
    branch: bool,
    json: bool,
) -> anyhow::Result<()> {
    paths::validate_name(task)?;
    if crate::builtin_verbs().contains(task) {
        warn(format_args!(
            "'{task}' is also a builtin command; run it with `ek run task {task}`"
        ));
    }

    let config_path = if branch {
        match GitCli.current_branch(&project.path) {
            BranchState::Branch(b) if paths::is_safe_branch_path(&b) => {
                paths::branch_config_path(&project.path, &b)
            }
            BranchState::Branch(b) => anyhow::bail!("branch '{b}' cannot be used as a directory name"),
            BranchState::Unavailable(reason) => {
                anyhow::bail!("cannot write a branch task: branch unavailable ({reason})")
            }
        }
    } else {
        paths::project_config_path(&project.path)
    };

    let (def, script) = match (template, cmd) {
        (Some(t), _) => {
            let s = scaffold_script(&project.path, task, t)?;
            (s.task.clone(), Some(s))
        }
        (None, Some(c)) => (TaskDefinition::shell(c), None),
        (None, None) => anyhow::bail!("provide --cmd or one of --bash, --python, --pwsh, --batch"),
    };

    let mut file = TaskFile::load(&config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    file.set_task(task, &def);
    file.save(&config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    if json {
        print_json(&serde_json::json!({
            "task": task,
            "kind": def.kind().as_str(),
            "definition": def.summary(),
            "config": config_path,
            "script": script.as_ref().map(|s| &s.path),
            "script_created": script.as_ref().is_some_and(|s| s.created),
        }))?;
        return Ok(());
    }
    if let Some(s) = &script {
        let verb = if s.created { "Scaffolded" } else { "Reused existing" };
        println!("{verb} {}", s.path.display());
    }
    println!("Task '{task}' -> {} ({})", def.summary(), config_path.display());
    Ok(())
}
