//! Task execution.
//!
//! [`TaskExecutor::plan`] turns a [`TaskDefinition`] into a concrete
//! [`PlannedCommand`] without spawning anything; [`TaskExecutor::execute`]
//! spawns it with inherited stdio inside a [`ChildScope`] and reports the
//! child's exit code.

use crate::paths;
use crate::signals::ChildScope;
use crate::task::{TaskDefinition, TaskEnv, TaskSet};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

pub const PROJECT_ROOT_ENV: &str = "EK_PROJECT_ROOT";
pub const BRANCH_ENV: &str = crate::vcs::BRANCH_ENV;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("failed to start `{command}`: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("script not found: {path} (searched {searched})")]
    ScriptNotFound { path: String, searched: String },

    #[error("script is not executable: {path} (chmod +x it or set `shell:` in the task)")]
    ScriptNotExecutable { path: String },
}

impl ExecError {
    /// Process exit code for this failure, following shell conventions.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::TaskNotFound(_) => 1,
            ExecError::SpawnFailure { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => 127,
                std::io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            ExecError::ScriptNotFound { .. } => 127,
            ExecError::ScriptNotExecutable { .. } => 126,
        }
    }
}

// ---------------------------------------------------------------------------
// Context / plan / result
// ---------------------------------------------------------------------------

/// Everything a task run depends on besides the definition itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub project_root: PathBuf,
    pub meta_dir: PathBuf,
    pub branch: Option<String>,
    /// Applied on top of the inherited environment, below the task's own.
    pub env: TaskEnv,
}

impl ExecutionContext {
    pub fn for_project(project_root: &Path, branch: Option<String>) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            meta_dir: paths::meta_dir(project_root),
            branch,
            env: TaskEnv::new(),
        }
    }

    /// Variables every child sees: the `EK_*` context first, then the
    /// context overlay.
    pub fn child_env(&self) -> TaskEnv {
        let mut env = TaskEnv::new();
        env.insert(
            PROJECT_ROOT_ENV.to_string(),
            self.project_root.display().to_string(),
        );
        if let Some(b) = &self.branch {
            env.insert(BRANCH_ENV.to_string(), b.clone());
        }
        env.extend(self.env.clone());
        env
    }
}

/// A fully resolved command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables set on top of the inherited environment.
    pub env: TaskEnv,
}

impl PlannedCommand {
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .envs(&self.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub exit_code: i32,
    /// False for dry runs.
    pub attempted: bool,
}

impl ExecutionResult {
    pub fn not_attempted() -> Self {
        Self {
            exit_code: 0,
            attempted: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TaskExecutor
// ---------------------------------------------------------------------------

pub struct TaskExecutor {
    ctx: ExecutionContext,
}

impl TaskExecutor {
    pub fn new(ctx: ExecutionContext) -> Self {
        Self { ctx }
    }

    /// Build the command for `def` with extra `args` appended.
    pub fn plan(&self, def: &TaskDefinition, args: &[String]) -> Result<PlannedCommand, ExecError> {
        let (program, argv) = match def {
            TaskDefinition::Shell { command, .. } => shell_invocation(command, args),
            TaskDefinition::Script {
                path, interpreter, ..
            } => {
                let script = self.resolve_script(path)?;
                let script_str = script.display().to_string();
                match interpreter {
                    Some(i) => {
                        let mut words = interpreter_argv(i);
                        let program = words.remove(0);
                        words.push(script_str);
                        words.extend(args.iter().cloned());
                        (program, words)
                    }
                    None => {
                        if !is_executable(&script) {
                            return Err(ExecError::ScriptNotExecutable { path: script_str });
                        }
                        (script_str, args.to_vec())
                    }
                }
            }
            TaskDefinition::CommandArray { argv, .. } => {
                let Some((program, rest)) = argv.split_first() else {
                    return Err(ExecError::SpawnFailure {
                        command: String::new(),
                        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argv"),
                    });
                };
                let mut rest = rest.to_vec();
                rest.extend(args.iter().cloned());
                (program.clone(), rest)
            }
        };

        let mut env = self.ctx.child_env();
        env.extend(def.env().clone());
        Ok(PlannedCommand {
            program,
            args: argv,
            cwd: self.ctx.project_root.clone(),
            env,
        })
    }

    /// Spawn `def` and block until it exits.
    pub fn execute(&self, def: &TaskDefinition, args: &[String]) -> Result<ExecutionResult, ExecError> {
        let planned = self.plan(def, args)?;
        tracing::debug!(command = %planned.display(), cwd = %planned.cwd.display(), "spawning task");
        let spawn_err = |source: std::io::Error| ExecError::SpawnFailure {
            command: planned.display(),
            source,
        };
        let scope = ChildScope::spawn(&mut planned.to_command()).map_err(&spawn_err)?;
        let status = scope.wait().map_err(spawn_err)?;
        let exit_code = exit_code_of(status);
        tracing::debug!(exit_code, "task finished");
        Ok(ExecutionResult {
            exit_code,
            attempted: true,
        })
    }

    pub fn run_named(&self, tasks: &TaskSet, name: &str, args: &[String]) -> Result<ExecutionResult, ExecError> {
        let def = tasks
            .get(name)
            .ok_or_else(|| ExecError::TaskNotFound(name.to_string()))?;
        self.execute(def, args)
    }

    /// Absolute paths as-is; relative paths against the project root, then
    /// against `.eagle/`.
    fn resolve_script(&self, path: &str) -> Result<PathBuf, ExecError> {
        let raw = paths::expand_tilde(path);
        let candidates = if raw.is_absolute() {
            vec![raw]
        } else {
            vec![self.ctx.project_root.join(&raw), self.ctx.meta_dir.join(&raw)]
        };
        candidates
            .iter()
            .find(|c| c.is_file())
            .cloned()
            .ok_or_else(|| ExecError::ScriptNotFound {
                path: path.to_string(),
                searched: candidates
                    .iter()
                    .map(|c| c.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `128 + N` for a child killed by signal N.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

#[cfg(unix)]
fn shell_invocation(command: &str, args: &[String]) -> (String, Vec<String>) {
    ("sh".to_string(), vec!["-c".to_string(), with_args(command, args)])
}

#[cfg(windows)]
fn shell_invocation(command: &str, args: &[String]) -> (String, Vec<String>) {
    ("cmd".to_string(), vec!["/C".to_string(), with_args(command, args)])
}

fn with_args(command: &str, args: &[String]) -> String {
    if args.is_empty() {
        return command.to_string();
    }
    let quoted: Vec<String> = args.iter().map(|a| shell_quote(a)).collect();
    format!("{command} {}", quoted.join(" "))
}

/// Quote `s` for a POSIX shell when it contains anything but safe characters.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,@%+".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Split an interpreter string into argv, expanding the well-known aliases.
fn interpreter_argv(interpreter: &str) -> Vec<String> {
    interpreter_argv_with(interpreter, |program| which::which(program).is_ok())
}

/// `python` falls back to `python3` when only the latter is installed.
fn interpreter_argv_with(interpreter: &str, on_path: impl Fn(&str) -> bool) -> Vec<String> {
    match interpreter.trim() {
        "pwsh" | "powershell" => vec![interpreter.trim().to_string(), "-File".to_string()],
        "cmd" | "bat" => vec!["cmd.exe".to_string(), "/c".to_string()],
        other => {
            let mut words: Vec<String> = other.split_whitespace().map(str::to_string).collect();
            if words.first().is_some_and(|w| w == "python") && !on_path("python") && on_path("python3") {
                words[0] = "python3".to_string();
            }
            words
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn executor(dir: &TempDir) -> TaskExecutor {
        TaskExecutor::new(ExecutionContext::for_project(dir.path(), Some("main".to_string())))
    }

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn task_env_wins_over_context_env() {
        let dir = TempDir::new().unwrap();
        let mut ctx = ExecutionContext::for_project(dir.path(), None);
        ctx.env.insert("MODE".to_string(), "ambient".to_string());
        let mut vars = TaskEnv::new();
        vars.insert("MODE".to_string(), "task".to_string());
        let def = TaskDefinition::shell("true").with_env(vars);

        let plan = TaskExecutor::new(ctx).plan(&def, &[]).unwrap();
        assert_eq!(plan.env["MODE"], "task");
        assert_eq!(plan.env[PROJECT_ROOT_ENV], dir.path().display().to_string());
        assert!(!plan.env.contains_key(BRANCH_ENV));
    }

    #[test]
    fn command_array_args_are_literal() {
        let dir = TempDir::new().unwrap();
        let def = TaskDefinition::command_array(["echo", "a; rm -rf /"]);
        let plan = executor(&dir).plan(&def, &strings(&["$(whoami)", "|x"])).unwrap();
        assert_eq!(plan.program, "echo");
        assert_eq!(plan.args, strings(&["a; rm -rf /", "$(whoami)", "|x"]));
    }

    #[test]
    fn interpreter_aliases() {
        assert_eq!(interpreter_argv("pwsh"), strings(&["pwsh", "-File"]));
        assert_eq!(interpreter_argv("bat"), strings(&["cmd.exe", "/c"]));
        assert_eq!(interpreter_argv("python3 -u"), strings(&["python3", "-u"]));
    }

    #[test]
    fn python_falls_back_to_python3() {
        let only_python3 = |p: &str| p == "python3";
        assert_eq!(interpreter_argv_with("python -u", only_python3), strings(&["python3", "-u"]));

        let both = |p: &str| p == "python" || p == "python3";
        assert_eq!(interpreter_argv_with("python", both), strings(&["python"]));

        let neither = |_: &str| false;
        assert_eq!(interpreter_argv_with("python", neither), strings(&["python"]));
    }

    #[test]
    fn quoting() {
        assert_eq!(shell_quote("plain-arg_1.txt"), "plain-arg_1.txt");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn missing_script_is_reported() {
        let dir = TempDir::new().unwrap();
        let def = TaskDefinition::script("scripts/nope.sh", None);
        let err = executor(&dir).plan(&def, &[]).unwrap_err();
        assert!(matches!(err, ExecError::ScriptNotFound { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn run_named_unknown_task() {
        let dir = TempDir::new().unwrap();
        let err = executor(&dir)
            .run_named(&TaskSet::new(), "ghost", &[])
            .unwrap_err();
        assert!(matches!(err, ExecError::TaskNotFound(_)));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(path: &Path, body: &str, mode: u32) {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
        }

        #[test]
        fn shell_exit_code_propagates() {
            let dir = TempDir::new().unwrap();
            let r = executor(&dir)
                .execute(&TaskDefinition::shell("exit 7"), &[])
                .unwrap();
            assert_eq!(r, ExecutionResult { exit_code: 7, attempted: true });
        }

        #[test]
        fn signal_death_maps_to_128_plus_n() {
            let dir = TempDir::new().unwrap();
            let r = executor(&dir)
                .execute(&TaskDefinition::shell("kill -TERM $$"), &[])
                .unwrap();
            assert_eq!(r.exit_code, 143);
        }

        #[test]
        fn shell_task_sees_its_env_over_inherited() {
            let dir = TempDir::new().unwrap();
            let mut vars = TaskEnv::new();
            vars.insert("HOME".to_string(), "/task-home".to_string());
            let def = TaskDefinition::shell(r#"test "$HOME" = /task-home"#).with_env(vars);
            assert_eq!(executor(&dir).execute(&def, &[]).unwrap().exit_code, 0);
        }

        #[test]
        fn shell_args_are_quoted() {
            let dir = TempDir::new().unwrap();
            let def = TaskDefinition::shell("printf '%s\\n'");
            let plan = executor(&dir).plan(&def, &strings(&["a b", "$HOME", "plain"])).unwrap();
            assert_eq!(plan.program, "sh");
            assert_eq!(plan.args[1], r"printf '%s\n' 'a b' '$HOME' plain");
        }

        #[test]
        fn command_array_reaches_child_literally() {
            let dir = TempDir::new().unwrap();
            let def = TaskDefinition::command_array([
                "sh",
                "-c",
                r#"test "$1" = 'x; exit 5 $(id)'"#,
                "sh",
                "x; exit 5 $(id)",
            ]);
            assert_eq!(executor(&dir).execute(&def, &[]).unwrap().exit_code, 0);
        }

        #[test]
        fn runs_in_project_root() {
            let dir = TempDir::new().unwrap();
            executor(&dir)
                .execute(&TaskDefinition::shell("pwd -P > where.txt"), &[])
                .unwrap();
            let where_ = std::fs::read_to_string(dir.path().join("where.txt")).unwrap();
            let expected = std::fs::canonicalize(dir.path()).unwrap();
            assert_eq!(where_.trim(), expected.display().to_string());
        }

        #[test]
        fn script_resolves_under_meta_dir_and_gets_args() {
            let dir = TempDir::new().unwrap();
            write_script(
                &dir.path().join(".eagle/scripts/build.sh"),
                "#!/bin/sh\nexit $1\n",
                0o755,
            );
            let def = TaskDefinition::script("scripts/build.sh", None);
            let r = executor(&dir).execute(&def, &strings(&["4"])).unwrap();
            assert_eq!(r.exit_code, 4);
        }

        #[test]
        fn project_root_wins_over_meta_dir() {
            let dir = TempDir::new().unwrap();
            write_script(&dir.path().join("scripts/b.sh"), "#!/bin/sh\nexit 1\n", 0o755);
            write_script(&dir.path().join(".eagle/scripts/b.sh"), "#!/bin/sh\nexit 2\n", 0o755);
            let plan = executor(&dir)
                .plan(&TaskDefinition::script("scripts/b.sh", None), &[])
                .unwrap();
            assert_eq!(plan.program, dir.path().join("scripts/b.sh").display().to_string());
        }

        #[test]
        fn non_executable_script_needs_interpreter() {
            let dir = TempDir::new().unwrap();
            write_script(&dir.path().join("run.sh"), "exit 3\n", 0o644);
            let err = executor(&dir)
                .plan(&TaskDefinition::script("run.sh", None), &[])
                .unwrap_err();
            assert!(matches!(err, ExecError::ScriptNotExecutable { .. }));

            let def = TaskDefinition::script("run.sh", Some("sh".to_string()));
            assert_eq!(executor(&dir).execute(&def, &[]).unwrap().exit_code, 3);
        }

        #[test]
        fn missing_program_is_spawn_failure() {
            let dir = TempDir::new().unwrap();
            let def = TaskDefinition::command_array(["ek-definitely-not-installed-xyz"]);
            let err = executor(&dir).execute(&def, &[]).unwrap_err();
            match &err {
                ExecError::SpawnFailure { command, .. } => {
                    assert_eq!(command, "ek-definitely-not-installed-xyz")
                }
                other => panic!("expected spawn failure, got {other:?}"),
            }
            assert_eq!(err.exit_code(), 127);
        }
    }
}
