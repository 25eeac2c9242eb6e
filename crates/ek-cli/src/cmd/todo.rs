use crate::output::{print_json, print_table};
use crate::root::ProjectArgs;
use anyhow::Context;
use clap::Subcommand;
use ek_core::todo::TodoList;
use std::path::Path;

#[derive(Subcommand)]
pub enum TodoSubcommand {
    /// Add a TODO item
    Add {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// List TODO items (open ones unless --all)
    List {
        #[arg(long)]
        all: bool,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Mark an item done (e.g. T3)
    Done {
        id: String,
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Delete an item
    Remove {
        id: String,
        #[command(flatten)]
        project: ProjectArgs,
    },
}

pub fn run(config_dir: &Path, subcmd: TodoSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TodoSubcommand::Add { text, project } => {
            let root = project.resolve(config_dir)?.path;
            let mut list = load(&root)?;
            let item = list.add(text.join(" ")).clone();
            save(&list, &root)?;
            if json {
                print_json(&item)?;
            } else {
                println!("Added [{}] {}", item.id, item.text);
            }
        }
        TodoSubcommand::List { all, project } => {
            let root = project.resolve(config_dir)?.path;
            let list = load(&root)?;
            let items: Vec<_> = list.items.iter().filter(|t| all || !t.done).collect();
            if json {
                print_json(&items)?;
            } else if items.is_empty() {
                println!("Nothing to do.");
            } else {
                let rows: Vec<Vec<String>> = items
                    .iter()
                    .map(|t| {
                        vec![
                            t.id.clone(),
                            if t.done { "x" } else { " " }.to_string(),
                            t.text.clone(),
                            t.created_at.format("%Y-%m-%d").to_string(),
                        ]
                    })
                    .collect();
                print_table(&["ID", "DONE", "TEXT", "CREATED"], &rows);
            }
        }
        TodoSubcommand::Done { id, project } => {
            let root = project.resolve(config_dir)?.path;
            let mut list = load(&root)?;
            let item = list.complete(&id)?.clone();
            save(&list, &root)?;
            if json {
                print_json(&item)?;
            } else {
                println!("Done [{}] {}", item.id, item.text);
            }
        }
        TodoSubcommand::Remove { id, project } => {
            let root = project.resolve(config_dir)?.path;
            let mut list = load(&root)?;
            let item = list.remove(&id)?;
            save(&list, &root)?;
            if json {
                print_json(&serde_json::json!({ "id": item.id, "removed": true }))?;
            } else {
                println!("Removed [{}] {}", item.id, item.text);
            }
        }
    }
    Ok(())
}

fn load(root: &Path) -> anyhow::Result<TodoList> {
    TodoList::load(root).context("failed to load todo list")
}

fn save(list: &TodoList, root: &Path) -> anyhow::Result<()> {
    list.save(root).context("failed to save todo list")
}
