use anyhow::Context;
use clap::Subcommand;
use ek_core::shell::{self, ShellKind};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ShellSubcommand {
    /// Print the `ek` shell function (eval it in your rc file)
    Init {
        /// sh, bash, zsh or fish (default: from $SHELL)
        #[arg(long)]
        shell: Option<ShellKind>,
    },
    /// Write the shell function into your rc file
    Install {
        #[arg(long)]
        shell: Option<ShellKind>,
        /// rc file to edit (default depends on the shell)
        #[arg(long)]
        rc: Option<PathBuf>,
    },
}

pub fn run(subcmd: ShellSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ShellSubcommand::Init { shell } => {
            let kind = shell.unwrap_or_else(ShellKind::detect);
            print!("{}", shell::init_block(kind));
            Ok(())
        }
        ShellSubcommand::Install { shell, rc } => {
            let kind = shell.unwrap_or_else(ShellKind::detect);
            let rc = match rc {
                Some(rc) => rc,
                None => {
                    let home = home::home_dir().context("home directory not found; pass --rc")?;
                    kind.rc_file(&home)
                }
            };
            shell::install(kind, &rc).with_context(|| format!("failed to update {}", rc.display()))?;
            println!("Installed the ek {kind} function in {}", rc.display());
            println!("Open a new shell or run: source {}", rc.display());
            Ok(())
        }
    }
}
