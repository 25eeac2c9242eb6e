use crate::output::{print_fields, print_json};
use anyhow::Context;
use ek_core::defaults::{Defaults, IgnorePolicy};
use ek_core::ignore::EXPLAIN;
use ek_core::paths;
use std::io::{BufRead, Write};
use std::path::Path;

/// Store user defaults. Values not given as flags are asked for on stdin,
/// with the current value as the default answer.
pub fn run(config_dir: &Path, user: Option<String>, ignore_policy: Option<String>, json: bool) -> anyhow::Result<()> {
    let mut defaults = Defaults::load(config_dir);
    let interactive = user.is_none() || ignore_policy.is_none();
    if interactive && !json {
        eprintln!("Eagle Kit setup (press Enter to keep the value in brackets)\n");
    }

    let user = match user {
        Some(u) => u,
        None => {
            let current = defaults
                .user
                .name
                .clone()
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_default();
            prompt("User name", &current)?
        }
    };

    let policy: IgnorePolicy = match ignore_policy {
        Some(p) => p.parse::<IgnorePolicy>()?,
        None => {
            eprintln!("{EXPLAIN}\n");
            let current = defaults.preferences.ignore_policy;
            loop {
                let answer = prompt("Ignore policy for .eagle/", current.as_str())?;
                match answer.parse::<IgnorePolicy>() {
                    Ok(p) => break p,
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    };

    defaults.user.name = (!user.trim().is_empty()).then(|| user.trim().to_string());
    defaults.preferences.ignore_policy = policy;
    defaults.first_run_done = true;
    defaults
        .save(config_dir)
        .context("failed to save defaults")?;

    if json {
        print_json(&serde_json::json!({
            "user": defaults.user.name,
            "ignore_policy": policy,
            "path": paths::defaults_path(config_dir),
        }))?;
    } else {
        print_fields(&[
            ("User", defaults.user.name.clone().unwrap_or_else(|| "-".to_string())),
            ("Ignore policy", policy.to_string()),
            ("Saved to", paths::defaults_path(config_dir).display().to_string()),
        ]);
    }
    Ok(())
}

/// Ask on stderr, read one line from stdin. EOF or an empty answer keeps
/// `default`.
fn prompt(label: &str, default: &str) -> anyhow::Result<String> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{label} [{default}]: ")?;
    stderr.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim();
    Ok(if answer.is_empty() {
        default.to_string()
    } else {
        answer.to_string()
    })
}
