mod cmd;
mod dispatch;
mod output;
mod root;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::{
    comment::CommentSubcommand, ignore::IgnoreSubcommand, run::RunSubcommand,
    shell::ShellSubcommand, todo::TodoSubcommand, ws::WsSubcommand,
};
use ek_core::executor::ExecError;
use ek_core::plugin::{ExecDiscovery, PluginRegistry};
use ek_core::router::{CommandRouter, Invocation};
use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ek",
    about = "Eagle Kit: track projects, run branch-aware project tasks, extend with plugins",
    after_help = "Any other word is looked up as a plugin namespace, then as a task of the current project:\n  ek build --release   is   ek run task build --release",
    version,
    propagate_version = true
)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a project directory
    Add {
        path: PathBuf,
        /// Project name (defaults to the directory name)
        #[arg(short = 'n', long)]
        name: Option<String>,
        /// Target workspace (defaults to the current one)
        #[arg(long, env = "EK_WORKSPACE")]
        ws: Option<String>,
    },

    /// List registered projects
    List {
        #[arg(long, env = "EK_WORKSPACE")]
        ws: Option<String>,
    },

    /// Show the project that owns the current directory
    Status {
        #[arg(long, env = "EK_WORKSPACE")]
        ws: Option<String>,
    },

    /// Print a project's path (the shell function turns this into a cd)
    Cd {
        project: String,
        #[arg(long, env = "EK_WORKSPACE")]
        ws: Option<String>,
    },

    /// Unregister a project (files are left untouched)
    #[command(alias = "rm")]
    Remove {
        project: String,
        #[arg(long, env = "EK_WORKSPACE")]
        ws: Option<String>,
    },

    /// List or switch workspaces
    Ws {
        #[command(subcommand)]
        subcommand: WsSubcommand,
    },

    /// List, run and create project tasks
    Run {
        #[command(subcommand)]
        subcommand: RunSubcommand,
    },

    /// Per-project TODO list
    Todo {
        #[command(subcommand)]
        subcommand: TodoSubcommand,
    },

    /// Per-project comments
    Comment {
        #[command(subcommand)]
        subcommand: CommentSubcommand,
    },

    /// Configure user name and default ignore policy
    Setup {
        /// User name
        #[arg(long)]
        user: Option<String>,
        /// local, repo, global or none
        #[arg(long)]
        ignore_policy: Option<String>,
    },

    /// Keep .eagle/ out of git
    Ignore {
        #[command(subcommand)]
        subcommand: IgnoreSubcommand,
    },

    /// Shell integration for `ek cd`
    Shell {
        #[command(subcommand)]
        subcommand: ShellSubcommand,
    },

    /// Show discovered plugins
    Plugins,
}

// ---------------------------------------------------------------------------
// CliExit: typed exit codes (main is the only caller of process::exit)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum CliExit {
    /// A task or plugin exited non-zero; its own output already explains why.
    Child(i32),
    /// Head token matched no builtin, plugin or task.
    Unresolved(String),
}

impl CliExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliExit::Child(c) => *c,
            CliExit::Unresolved(_) => 2,
        }
    }
}

impl std::fmt::Display for CliExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliExit::Child(code) => write!(f, "exited with code {code}"),
            CliExit::Unresolved(head) => write!(
                f,
                "unknown command or task: '{head}' (see `ek --help` and `ek run list`)"
            ),
        }
    }
}

impl std::error::Error for CliExit {}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let argv: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    let code = match run(argv) {
        Ok(()) => 0,
        Err(e) => report(&e),
    };
    std::process::exit(code);
}

/// Print `e` (unless it is a silent child exit) and pick the exit code.
fn report(e: &anyhow::Error) -> i32 {
    if let Some(clap_err) = e.downcast_ref::<clap::Error>() {
        let _ = clap_err.print();
        return clap_err.exit_code();
    }
    if let Some(CliExit::Child(code)) = e.downcast_ref::<CliExit>() {
        return *code;
    }
    // Print the full error chain (anyhow's alternate Display)
    eprintln!("error: {e:#}");
    if let Some(exit) = e.downcast_ref::<CliExit>() {
        exit.exit_code()
    } else if let Some(exec) = e.downcast_ref::<ExecError>() {
        exec.exit_code()
    } else {
        1
    }
}

/// Every subcommand name and alias, plus `help`.
fn builtin_verbs() -> BTreeSet<String> {
    let cmd = Cli::command();
    let mut verbs: BTreeSet<String> = cmd
        .get_subcommands()
        .flat_map(|s| std::iter::once(s.get_name()).chain(s.get_all_aliases()))
        .map(str::to_string)
        .collect();
    verbs.insert("help".to_string());
    verbs
}

fn run(argv: Vec<String>) -> anyhow::Result<()> {
    let config_dir = ek_core::paths::config_dir()?;

    let Some(inv) = Invocation::from_args(&argv) else {
        if argv.is_empty() {
            return no_arguments(&config_dir);
        }
        return run_builtin(&config_dir, &argv);
    };

    // Builtins win the route outright, so plugins are never started for them.
    let builtins = builtin_verbs();
    if builtins.contains(&inv.head) {
        return run_builtin(&config_dir, &argv);
    }

    let mut plugins = PluginRegistry::new(builtins.iter().cloned());
    plugins.discover(&[&ExecDiscovery::standard(&config_dir)]);
    for err in plugins.load_all() {
        tracing::warn!("{err}");
    }

    let catalog = dispatch::LazyTasks::new(&config_dir);
    let mut dispatcher = dispatch::CliDispatcher {
        argv: &argv,
        config_dir: &config_dir,
        plugins: &plugins,
        tasks: &catalog,
    };
    CommandRouter::new(&builtins, &plugins).route(&inv, &catalog, &mut dispatcher)
}

/// Bare `ek`: the setup wizard on first run from a terminal, help otherwise.
fn no_arguments(config_dir: &std::path::Path) -> anyhow::Result<()> {
    let defaults = ek_core::defaults::Defaults::load(config_dir);
    if defaults.first_run_needed() && std::io::stdin().is_terminal() {
        return cmd::setup::run(config_dir, None, None, false);
    }
    Cli::command().print_help()?;
    println!();
    Ok(())
}

/// Parse the whole command line with clap and run the builtin.
pub(crate) fn run_builtin(config_dir: &std::path::Path, argv: &[String]) -> anyhow::Result<()> {
    let cli = Cli::try_parse_from(std::iter::once("ek").chain(argv.iter().map(String::as_str)))?;
    let json = cli.json;

    match cli.command {
        Commands::Add { path, name, ws } => {
            cmd::project::add(config_dir, &path, name.as_deref(), ws.as_deref(), json)
        }
        Commands::List { ws } => cmd::project::list(config_dir, ws.as_deref(), json),
        Commands::Status { ws } => cmd::project::status(config_dir, ws.as_deref(), json),
        Commands::Cd { project, ws } => cmd::project::cd(config_dir, &project, ws.as_deref()),
        Commands::Remove { project, ws } => {
            cmd::project::remove(config_dir, &project, ws.as_deref(), json)
        }
        Commands::Ws { subcommand } => cmd::ws::run(config_dir, subcommand, json),
        Commands::Run { subcommand } => cmd::run::run(config_dir, subcommand, json),
        Commands::Todo { subcommand } => cmd::todo::run(config_dir, subcommand, json),
        Commands::Comment { subcommand } => cmd::comment::run(config_dir, subcommand, json),
        Commands::Setup {
            user,
            ignore_policy,
        } => cmd::setup::run(config_dir, user, ignore_policy, json),
        Commands::Ignore { subcommand } => cmd::ignore::run(subcommand, json),
        Commands::Shell { subcommand } => cmd::shell::run(subcommand),
        Commands::Plugins => cmd::plugins::run(config_dir, &builtin_verbs(), json),
    }
}
