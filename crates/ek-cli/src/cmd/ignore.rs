use crate::output::{print_json, print_table};
use clap::Subcommand;
use ek_core::defaults::IgnorePolicy;
use ek_core::ignore::{self, EXPLAIN};
use ek_core::vcs::GitCli;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum IgnoreSubcommand {
    /// Describe the strategies
    Explain,
    /// Show which ignore files already list .eagle/
    Status {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Add .eagle/ to .git/info/exclude (not versioned)
    Local {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Add .eagle/ to the repository's .gitignore
    Repo {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Add .eagle/ to the global git excludes file
    Global,
}

pub fn run(subcmd: IgnoreSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        IgnoreSubcommand::Explain => {
            println!("{EXPLAIN}");
            Ok(())
        }
        IgnoreSubcommand::Status { path } => status(&path, json),
        IgnoreSubcommand::Local { path } => apply(IgnorePolicy::Local, &path, json),
        IgnoreSubcommand::Repo { path } => apply(IgnorePolicy::Repo, &path, json),
        IgnoreSubcommand::Global => apply(IgnorePolicy::Global, Path::new("."), json),
    }
}

fn apply(policy: IgnorePolicy, path: &Path, json: bool) -> anyhow::Result<()> {
    let outcome = ignore::apply(&GitCli, policy, path)?;
    if json {
        return print_json(&outcome);
    }
    if let Some(file) = &outcome.file {
        if outcome.changed {
            println!("Added .eagle/ to {}", file.display());
        } else {
            println!(".eagle/ already listed in {}", file.display());
        }
    }
    Ok(())
}

fn status(path: &Path, json: bool) -> anyhow::Result<()> {
    let rows = ignore::status(&GitCli, path)?;
    if json {
        return print_json(&rows);
    }
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.scope.to_string(),
                if r.contains { "yes" } else { "no" }.to_string(),
                r.file
                    .as_ref()
                    .map(|f| f.display().to_string())
                    .unwrap_or_else(|| "(not configured)".to_string()),
            ]
        })
        .collect();
    print_table(&["SCOPE", "IGNORED", "FILE"], &table);
    Ok(())
}
