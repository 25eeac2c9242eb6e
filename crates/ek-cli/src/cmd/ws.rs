use crate::output::{print_json, print_table};
use crate::root::load_registry;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum WsSubcommand {
    /// List workspaces
    List,
    /// Switch the current workspace, creating it if needed
    Use { name: String },
}

pub fn run(config_dir: &Path, subcmd: WsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WsSubcommand::List => list(config_dir, json),
        WsSubcommand::Use { name } => use_ws(config_dir, &name, json),
    }
}

fn list(config_dir: &Path, json: bool) -> anyhow::Result<()> {
    let registry = load_registry(config_dir)?;

    if json {
        let items: Vec<_> = registry
            .workspaces
            .iter()
            .map(|(name, ws)| {
                serde_json::json!({
                    "name": name,
                    "projects": ws.projects.len(),
                    "current": *name == registry.current_workspace,
                })
            })
            .collect();
        print_json(&items)?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = registry
        .workspaces
        .iter()
        .map(|(name, ws)| {
            let marker = if *name == registry.current_workspace { "*" } else { "" };
            vec![marker.to_string(), name.clone(), ws.projects.len().to_string()]
        })
        .collect();
    print_table(&["", "WORKSPACE", "PROJECTS"], &rows);
    Ok(())
}

fn use_ws(config_dir: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let mut registry = load_registry(config_dir)?;
    let created = registry.use_workspace(name)?;
    registry.save(config_dir).context("failed to save registry")?;

    if json {
        print_json(&serde_json::json!({ "workspace": name, "created": created }))?;
    } else if created {
        println!("Created and switched to workspace '{name}'");
    } else {
        println!("Switched to workspace '{name}'");
    }
    Ok(())
}
