//! Executable plugins.
//!
//! Any executable named `ek-<namespace>` in the user plugin directory or on
//! `PATH` is a plugin.
//!
//! # Protocol
//! - `ek-<ns> --ek-register`: prints one sub-command per line as
//!   `name<TAB>about`. Blank lines and `#` comments are ignored. A non-zero
//!   exit, or running past [`REGISTER_TIMEOUT`], is a registration failure.
//! - `ek-<ns> <args...>`: the actual dispatch, with inherited stdio. The
//!   project root and branch are passed as `EK_PROJECT_ROOT` / `EK_BRANCH`.

use super::{Capability, Discovered, Discovery, EntryRef, NamespaceHandle, PluginContext};
use crate::executor::{exit_code_of, BRANCH_ENV, PROJECT_ROOT_ENV};
use crate::paths;
use crate::signals::ChildScope;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::time::Duration;

pub const PLUGIN_PREFIX: &str = "ek-";
pub const REGISTER_FLAG: &str = "--ek-register";

/// How long `--ek-register` may run before the plugin is marked failed.
pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(3);

// ---------------------------------------------------------------------------
// ExecPlugin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecPlugin {
    path: PathBuf,
    register_timeout: Duration,
}

/// Captured result of `--ek-register`.
struct RegisterOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl ExecPlugin {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            register_timeout: REGISTER_TIMEOUT,
        }
    }

    pub fn with_register_timeout(mut self, timeout: Duration) -> Self {
        self.register_timeout = timeout;
        self
    }

    /// Run `--ek-register`, killing the plugin if it outlives the timeout.
    /// Pipes are drained on their own threads so a chatty plugin cannot
    /// block on a full pipe.
    fn run_register(&self) -> Result<RegisterOutput, String> {
        let mut child = Command::new(&self.path)
            .arg(REGISTER_FLAG)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("failed to run {}: {e}", self.path.display()))?;

        let pid = child.id();
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(child.wait());
        });
        let status = match rx.recv_timeout(self.register_timeout) {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(format!("failed to wait for {}: {e}", self.path.display())),
            Err(_) => {
                kill_process(pid);
                return Err(format!(
                    "{REGISTER_FLAG} timed out after {}ms",
                    self.register_timeout.as_millis()
                ));
            }
        };

        Ok(RegisterOutput {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut r) = pipe {
            let _ = r.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

#[cfg(unix)]
fn kill_process(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_process(pid: u32) {
    let _ = Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

impl Capability for ExecPlugin {
    fn register(&self, handle: &mut NamespaceHandle) -> Result<(), String> {
        let output = self.run_register()?;

        if !output.status.success() {
            let hint: String = output.stderr.trim().chars().take(200).collect();
            return Err(format!(
                "{REGISTER_FLAG} exited with {}{}",
                exit_code_of(output.status),
                if hint.is_empty() { String::new() } else { format!(": {hint}") }
            ));
        }

        for line in output.stdout.lines() {
            let line = line.trim_end();
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let (name, about) = line.split_once('\t').unwrap_or((line, ""));
            handle.command(name.trim(), about.trim())?;
        }
        Ok(())
    }

    fn dispatch(&self, args: &[String], ctx: &PluginContext) -> Result<i32, String> {
        let mut cmd = Command::new(&self.path);
        cmd.args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(root) = &ctx.project_root {
            cmd.env(PROJECT_ROOT_ENV, root);
        }
        if let Some(branch) = &ctx.branch {
            cmd.env(BRANCH_ENV, branch);
        }
        cmd.envs(&ctx.env);

        let scope = ChildScope::spawn(&mut cmd)
            .map_err(|e| format!("failed to start {}: {e}", self.path.display()))?;
        let status = scope
            .wait()
            .map_err(|e| format!("failed to wait for {}: {e}", self.path.display()))?;
        Ok(exit_code_of(status))
    }
}

// ---------------------------------------------------------------------------
// ExecDiscovery
// ---------------------------------------------------------------------------

/// Scans directories, in order, for `ek-*` executables.
#[derive(Debug, Clone)]
pub struct ExecDiscovery {
    dirs: Vec<PathBuf>,
}

impl ExecDiscovery {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// `<config dir>/plugins` followed by every `PATH` entry.
    pub fn standard(config_dir: &Path) -> Self {
        let mut dirs = vec![paths::plugins_dir(config_dir)];
        if let Some(path) = std::env::var_os("PATH") {
            dirs.extend(std::env::split_paths(&path));
        }
        Self::new(dirs)
    }

    fn scan_dir(dir: &Path, seen: &mut BTreeSet<PathBuf>, out: &mut Vec<Discovered>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let mut found: Vec<(String, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let file_name = e.file_name().to_string_lossy().into_owned();
                let namespace = plugin_namespace(&file_name)?;
                Some((namespace, e.path()))
            })
            .collect();
        found.sort();

        for (namespace, path) in found {
            let canonical = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if !seen.insert(canonical) {
                continue;
            }
            let source = path.display().to_string();
            let entry = if paths::validate_name(&namespace).is_err() {
                EntryRef::Unresolved(format!("'{namespace}' is not a valid namespace name"))
            } else if !path.is_file() {
                EntryRef::Unresolved("not a regular file".to_string())
            } else if !is_executable(&path) {
                EntryRef::Unresolved("not executable".to_string())
            } else {
                EntryRef::Resolved(Box::new(ExecPlugin::new(&path)))
            };
            out.push(Discovered {
                namespace,
                source,
                entry,
            });
        }
    }
}

impl Discovery for ExecDiscovery {
    fn discover(&self) -> Vec<Discovered> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for dir in &self.dirs {
            Self::scan_dir(dir, &mut seen, &mut out);
        }
        out
    }
}

/// `ek-docker` → `docker`. Windows executables drop their extension.
fn plugin_namespace(file_name: &str) -> Option<String> {
    let rest = file_name.strip_prefix(PLUGIN_PREFIX)?;
    let rest = if cfg!(windows) {
        rest.strip_suffix(".exe")
            .or_else(|| rest.strip_suffix(".cmd"))
            .or_else(|| rest.strip_suffix(".bat"))
            .unwrap_or(rest)
    } else {
        rest
    };
    (!rest.is_empty()).then(|| rest.to_string())
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
