use crate::output::{print_json, print_table};
use crate::root::ProjectArgs;
use anyhow::Context;
use clap::Subcommand;
use ek_core::comment::CommentLog;
use ek_core::defaults::Defaults;
use std::path::Path;

#[derive(Subcommand)]
pub enum CommentSubcommand {
    /// Add a comment to the project or one of its tasks
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Attach the comment to a task
        #[arg(long)]
        task: Option<String>,
        /// Author (default: the user name from `ek setup`)
        #[arg(long)]
        by: Option<String>,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// List comments, optionally only those on a task
    List {
        #[arg(long)]
        task: Option<String>,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Resolve (remove) a comment
    Resolve {
        id: String,
        #[command(flatten)]
        project: ProjectArgs,
    },
}

pub fn run(config_dir: &Path, subcmd: CommentSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CommentSubcommand::Add {
            text,
            task,
            by,
            project,
        } => {
            let root = project.resolve(config_dir)?.path;
            let author = by.or_else(|| Defaults::load(config_dir).user.name);
            let body = text.join(" ");
            let mut log = load(&root)?;
            let id = log.add(body.clone(), task.clone(), author);
            save(&log, &root)?;
            if json {
                print_json(&serde_json::json!({ "id": id, "body": body, "task": task }))?;
            } else {
                println!("Added comment [{id}]");
            }
        }
        CommentSubcommand::List { task, project } => {
            let root = project.resolve(config_dir)?.path;
            let log = load(&root)?;
            let comments: Vec<_> = log.for_task(task.as_deref()).collect();
            if json {
                print_json(&comments)?;
            } else if comments.is_empty() {
                let scope = task.map(|t| format!(" on task '{t}'")).unwrap_or_default();
                println!("No comments{scope}.");
            } else {
                let rows: Vec<Vec<String>> = comments
                    .iter()
                    .map(|c| {
                        vec![
                            c.id.clone(),
                            c.task.clone().unwrap_or_else(|| "-".to_string()),
                            c.author.clone().unwrap_or_default(),
                            c.body.clone(),
                        ]
                    })
                    .collect();
                print_table(&["ID", "TASK", "AUTHOR", "BODY"], &rows);
            }
        }
        CommentSubcommand::Resolve { id, project } => {
            let root = project.resolve(config_dir)?.path;
            let mut log = load(&root)?;
            log.resolve(&id)?;
            save(&log, &root)?;
            if json {
                print_json(&serde_json::json!({ "id": id, "resolved": true }))?;
            } else {
                println!("Resolved comment [{id}]");
            }
        }
    }
    Ok(())
}

fn load(root: &Path) -> anyhow::Result<CommentLog> {
    CommentLog::load(root).context("failed to load comments")
}

fn save(log: &CommentLog, root: &Path) -> anyhow::Result<()> {
    log.save(root).context("failed to save comments")
}
