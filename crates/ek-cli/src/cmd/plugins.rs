use crate::output::{print_json, print_table};
use ek_core::plugin::{ExecDiscovery, PluginRegistry, PluginState};
use std::collections::BTreeSet;
use std::path::Path;

pub fn run(config_dir: &Path, builtins: &BTreeSet<String>, json: bool) -> anyhow::Result<()> {
    let mut registry = PluginRegistry::new(builtins.iter().cloned());
    registry.discover(&[&ExecDiscovery::standard(config_dir)]);
    registry.load_all();

    let descriptors = registry.descriptors();
    let loaded = descriptors
        .iter()
        .filter(|d| matches!(d.state(), PluginState::Loaded(_)))
        .count();

    if json {
        let items: Vec<_> = descriptors
            .iter()
            .map(|d| {
                serde_json::json!({
                    "name": d.namespace(),
                    "source": d.source(),
                    "status": d.state().label(),
                    "error": match d.state() {
                        PluginState::Failed(e) => Some(e.to_string()),
                        _ => None,
                    },
                    "commands": d.commands(),
                })
            })
            .collect();
        return print_json(&items);
    }

    if descriptors.is_empty() {
        println!(
            "No plugins found. Put an `ek-<name>` executable in {} or on PATH.",
            ek_core::paths::plugins_dir(config_dir).display()
        );
        return Ok(());
    }

    let rows: Vec<Vec<String>> = descriptors
        .iter()
        .map(|d| {
            let detail = match d.state() {
                PluginState::Failed(e) => e.to_string(),
                _ => d
                    .commands()
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            };
            vec![
                d.namespace().to_string(),
                d.state().label().to_string(),
                d.source().to_string(),
                detail,
            ]
        })
        .collect();
    print_table(&["NAME", "STATUS", "SOURCE", "COMMANDS / ERROR"], &rows);
    println!(
        "\n{} plugin(s): {loaded} loaded, {} failed",
        descriptors.len(),
        descriptors.len() - loaded
    );
    Ok(())
}
