//! Task definitions and the `.eagle/config.yaml` task file.
//!
//! A task entry's variant is decided by its YAML shape, in this order:
//!
//! 1. bare string → [`TaskDefinition::Shell`]
//! 2. sequence of scalars → [`TaskDefinition::CommandArray`]
//! 3. mapping with `type` → the tagged variant (`shell`, `script`, `exec`)
//! 4. mapping without `type`: `command` string → Shell, `command`/`argv`
//!    sequence → CommandArray
//!
//! Anything else is a per-task [`TaskParseError`]; the other tasks still load.

use crate::error::Result;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

pub type TaskEnv = BTreeMap<String, String>;

/// Mapping from task name to definition.
pub type TaskSet = BTreeMap<String, TaskDefinition>;

// ---------------------------------------------------------------------------
// TaskDefinition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDefinition {
    /// Run through the platform shell.
    Shell { command: String, env: TaskEnv },
    /// Run a script file, optionally through an interpreter.
    Script {
        path: String,
        interpreter: Option<String>,
        env: TaskEnv,
    },
    /// Spawn `argv[0]` directly with literal arguments; never touches a shell.
    CommandArray { argv: Vec<String>, env: TaskEnv },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Shell,
    Script,
    CommandArray,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Shell => "shell",
            TaskKind::Script => "script",
            TaskKind::CommandArray => "exec",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TaskDefinition {
    pub fn shell(command: impl Into<String>) -> Self {
        TaskDefinition::Shell {
            command: command.into(),
            env: TaskEnv::new(),
        }
    }

    pub fn script(path: impl Into<String>, interpreter: Option<String>) -> Self {
        TaskDefinition::Script {
            path: path.into(),
            interpreter,
            env: TaskEnv::new(),
        }
    }

    pub fn command_array<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaskDefinition::CommandArray {
            argv: argv.into_iter().map(Into::into).collect(),
            env: TaskEnv::new(),
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            TaskDefinition::Shell { .. } => TaskKind::Shell,
            TaskDefinition::Script { .. } => TaskKind::Script,
            TaskDefinition::CommandArray { .. } => TaskKind::CommandArray,
        }
    }

    pub fn env(&self) -> &TaskEnv {
        match self {
            TaskDefinition::Shell { env, .. }
            | TaskDefinition::Script { env, .. }
            | TaskDefinition::CommandArray { env, .. } => env,
        }
    }

    pub fn with_env(mut self, vars: TaskEnv) -> Self {
        match &mut self {
            TaskDefinition::Shell { env, .. }
            | TaskDefinition::Script { env, .. }
            | TaskDefinition::CommandArray { env, .. } => env.extend(vars),
        }
        self
    }

    /// One-line human description, used by `ek run list`.
    pub fn summary(&self) -> String {
        let body = match self {
            TaskDefinition::Shell { command, .. } => command.clone(),
            TaskDefinition::Script {
                path,
                interpreter: Some(i),
                ..
            } => format!("{i} {path}"),
            TaskDefinition::Script { path, .. } => path.clone(),
            TaskDefinition::CommandArray { argv, .. } => {
                serde_json::to_string(argv).unwrap_or_else(|_| argv.join(" "))
            }
        };
        if self.env().is_empty() {
            body
        } else {
            let keys: Vec<&str> = self.env().keys().map(String::as_str).collect();
            format!("{body}  (env: {})", keys.join(", "))
        }
    }

    /// Serialize back into the task-file schema, using the shortest shape
    /// that parses to the same definition.
    pub fn to_value(&self) -> Value {
        let env_value = |env: &TaskEnv| {
            let mut m = Mapping::new();
            for (k, v) in env {
                m.insert(Value::from(k.as_str()), Value::from(v.as_str()));
            }
            Value::Mapping(m)
        };
        match self {
            TaskDefinition::Shell { command, env } if env.is_empty() => {
                Value::from(command.as_str())
            }
            TaskDefinition::Shell { command, env } => {
                let mut m = Mapping::new();
                m.insert("type".into(), "shell".into());
                m.insert("command".into(), command.as_str().into());
                m.insert("env".into(), env_value(env));
                Value::Mapping(m)
            }
            TaskDefinition::Script {
                path,
                interpreter,
                env,
            } => {
                let mut m = Mapping::new();
                m.insert("type".into(), "script".into());
                m.insert("path".into(), path.as_str().into());
                if let Some(i) = interpreter {
                    m.insert("shell".into(), i.as_str().into());
                }
                if !env.is_empty() {
                    m.insert("env".into(), env_value(env));
                }
                Value::Mapping(m)
            }
            TaskDefinition::CommandArray { argv, env } if env.is_empty() => {
                Value::Sequence(argv.iter().map(|a| Value::from(a.as_str())).collect())
            }
            TaskDefinition::CommandArray { argv, env } => {
                let mut m = Mapping::new();
                m.insert("type".into(), "exec".into());
                m.insert(
                    "argv".into(),
                    Value::Sequence(argv.iter().map(|a| Value::from(a.as_str())).collect()),
                );
                m.insert("env".into(), env_value(env));
                Value::Mapping(m)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TaskScope / TaskParseError
// ---------------------------------------------------------------------------

/// Which configuration a task came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskScope {
    Project,
    Branch(String),
}

impl fmt::Display for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskScope::Project => f.write_str("project"),
            TaskScope::Branch(b) => write!(f, "branch:{b}"),
        }
    }
}

/// A task entry (or a whole task file, when `task` is `None`) that could not
/// be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskParseError {
    pub scope: TaskScope,
    pub task: Option<String>,
    pub reason: String,
}

impl fmt::Display for TaskParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task {
            Some(t) => write!(f, "{} task '{t}': {}", self.scope, self.reason),
            None => write!(f, "{} task file: {}", self.scope, self.reason),
        }
    }
}

impl std::error::Error for TaskParseError {}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse one task entry.
pub fn parse_task(value: &Value) -> std::result::Result<TaskDefinition, String> {
    match value {
        Value::String(command) => shell_from(command, TaskEnv::new()),
        Value::Sequence(items) => Ok(TaskDefinition::CommandArray {
            argv: parse_argv(items)?,
            env: TaskEnv::new(),
        }),
        Value::Mapping(m) => parse_mapping(m),
        Value::Tagged(t) => parse_task(&t.value),
        other => Err(format!(
            "expected a command string, a token list or a mapping, found {}",
            type_name(other)
        )),
    }
}

fn parse_mapping(m: &Mapping) -> std::result::Result<TaskDefinition, String> {
    let env = match m.get("env") {
        Some(v) => parse_env(v)?,
        None => TaskEnv::new(),
    };
    let tag = match m.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(other) => return Err(format!("'type' must be a string, found {}", type_name(other))),
        None => None,
    };
    match tag {
        Some("shell") => match m.get("command") {
            Some(Value::String(c)) => shell_from(c, env),
            Some(_) => Err("'command' must be a string for type 'shell'".to_string()),
            None => Err("type 'shell' requires 'command'".to_string()),
        },
        Some("script") => {
            let path = match m.get("path") {
                Some(Value::String(p)) if !p.trim().is_empty() => p.clone(),
                Some(Value::String(_)) => return Err("'path' is empty".to_string()),
                Some(_) => return Err("'path' must be a string".to_string()),
                None => return Err("type 'script' requires 'path'".to_string()),
            };
            let interpreter = match m.get("shell").or_else(|| m.get("interpreter")) {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Some(Value::String(_)) | Some(Value::Null) | None => None,
                Some(_) => return Err("'shell' must be a string".to_string()),
            };
            Ok(TaskDefinition::Script {
                path,
                interpreter,
                env,
            })
        }
        Some("exec") => match m.get("argv").or_else(|| m.get("command")) {
            Some(Value::Sequence(items)) => Ok(TaskDefinition::CommandArray {
                argv: parse_argv(items)?,
                env,
            }),
            Some(_) => Err("'argv' must be a list for type 'exec'".to_string()),
            None => Err("type 'exec' requires 'argv'".to_string()),
        },
        Some(other) => Err(format!(
            "unknown task type '{other}' (expected shell, script or exec)"
        )),
        None => match (m.get("command"), m.get("argv")) {
            (Some(Value::String(c)), _) => shell_from(c, env),
            (Some(Value::Sequence(items)), _) | (None, Some(Value::Sequence(items))) => {
                Ok(TaskDefinition::CommandArray {
                    argv: parse_argv(items)?,
                    env,
                })
            }
            _ if m.contains_key("path") => {
                Err("mapping with 'path' needs 'type: script'".to_string())
            }
            _ => Err("mapping needs 'type' or a 'command'".to_string()),
        },
    }
}

fn shell_from(command: &str, env: TaskEnv) -> std::result::Result<TaskDefinition, String> {
    if command.trim().is_empty() {
        return Err("empty command".to_string());
    }
    Ok(TaskDefinition::Shell {
        command: command.to_string(),
        env,
    })
}

fn parse_argv(items: &[Value]) -> std::result::Result<Vec<String>, String> {
    if items.is_empty() {
        return Err("empty command list".to_string());
    }
    items
        .iter()
        .enumerate()
        .map(|(i, v)| scalar_string(v).ok_or_else(|| format!("argv[{i}] must be a scalar")))
        .collect()
}

fn parse_env(value: &Value) -> std::result::Result<TaskEnv, String> {
    let Value::Mapping(m) = value else {
        return Err("'env' must be a mapping".to_string());
    };
    let mut env = TaskEnv::new();
    for (k, v) in m {
        let key = match k {
            Value::String(s) if !s.is_empty() && !s.contains('=') => s.clone(),
            _ => return Err(format!("invalid env variable name {}", render_key(k))),
        };
        let val = scalar_string(v).ok_or_else(|| format!("env '{key}' must be a scalar"))?;
        env.insert(key, val);
    }
    Ok(env)
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

fn render_key(k: &Value) -> String {
    scalar_string(k).unwrap_or_else(|| type_name(k).to_string())
}

/// Parse every entry of a `tasks:` mapping. Bad entries become errors; the
/// rest still load.
pub fn parse_tasks(tasks: &Mapping, scope: &TaskScope) -> (TaskSet, Vec<TaskParseError>) {
    let mut set = TaskSet::new();
    let mut errors = Vec::new();
    for (key, value) in tasks {
        let Some(name) = scalar_string(key).filter(|n| !n.trim().is_empty()) else {
            errors.push(TaskParseError {
                scope: scope.clone(),
                task: Some(render_key(key)),
                reason: "task names must be non-empty strings".to_string(),
            });
            continue;
        };
        match parse_task(value) {
            Ok(def) => {
                set.insert(name, def);
            }
            Err(reason) => errors.push(TaskParseError {
                scope: scope.clone(),
                task: Some(name),
                reason,
            }),
        }
    }
    (set, errors)
}

// ---------------------------------------------------------------------------
// TaskFile
// ---------------------------------------------------------------------------

/// A project or branch `config.yaml`. Keys other than `tasks` are preserved
/// when the file is rewritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFile {
    doc: Mapping,
}

impl TaskFile {
    /// A missing file is an empty task file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self> {
        let doc: Option<Mapping> = serde_yaml::from_str(data)?;
        Ok(Self {
            doc: doc.unwrap_or_default(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(&self.doc)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    /// The raw `tasks:` mapping. `Err` when the key exists with the wrong shape.
    pub fn tasks(&self) -> std::result::Result<Option<&Mapping>, String> {
        match self.doc.get("tasks") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Mapping(m)) => Ok(Some(m)),
            Some(other) => Err(format!("'tasks' must be a mapping, found {}", type_name(other))),
        }
    }

    /// Insert or replace a task. A malformed `tasks` value is replaced.
    pub fn set_task(&mut self, name: &str, def: &TaskDefinition) {
        if !matches!(self.doc.get("tasks"), Some(Value::Mapping(_))) {
            self.doc.insert("tasks".into(), Value::Mapping(Mapping::new()));
        }
        if let Some(Value::Mapping(tasks)) = self.doc.get_mut("tasks") {
            tasks.insert(Value::from(name), def.to_value());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
