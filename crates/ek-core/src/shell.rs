//! Shell integration.
//!
//! A child process cannot change its parent's working directory, so `ek cd`
//! only prints a path. The `ek` shell function installed here wraps the binary
//! and performs the `cd` itself.

use crate::error::Result;
use crate::io::upsert_marked_block;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MARKER_START: &str = "# >>> eaglekit shell integration >>>";
pub const MARKER_END: &str = "# <<< eaglekit shell integration <<<";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Sh,
    Bash,
    Zsh,
    Fish,
}

impl ShellKind {
    pub const ALL: [ShellKind; 4] = [ShellKind::Sh, ShellKind::Bash, ShellKind::Zsh, ShellKind::Fish];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShellKind::Sh => "sh",
            ShellKind::Bash => "bash",
            ShellKind::Zsh => "zsh",
            ShellKind::Fish => "fish",
        }
    }

    /// Guess from `$SHELL`, defaulting to bash.
    pub fn detect() -> Self {
        std::env::var("SHELL")
            .ok()
            .and_then(|s| {
                Path::new(&s)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.parse().ok())
            })
            .unwrap_or(ShellKind::Bash)
    }

    /// The rc file the function is installed into.
    pub fn rc_file(&self, home: &Path) -> PathBuf {
        match self {
            ShellKind::Sh => home.join(".profile"),
            ShellKind::Bash => home.join(".bashrc"),
            ShellKind::Zsh => home.join(".zshrc"),
            ShellKind::Fish => home.join(".config/fish/conf.d/eaglekit.fish"),
        }
    }

    pub fn function(&self) -> &'static str {
        match self {
            ShellKind::Sh | ShellKind::Bash | ShellKind::Zsh => POSIX_FUNCTION,
            ShellKind::Fish => FISH_FUNCTION,
        }
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        ShellKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unsupported shell '{s}' (expected sh, bash, zsh or fish)"))
    }
}

const POSIX_FUNCTION: &str = r#"ek() {
    if [ "$1" = "cd" ] && [ $# -ge 2 ]; then
        shift
        __ek_dir="$(command ek cd "$@")" || return $?
        cd "$__ek_dir" || return $?
        unset __ek_dir
    else
        command ek "$@"
    fi
}
"#;

const FISH_FUNCTION: &str = r#"function ek
    if test (count $argv) -ge 2; and test "$argv[1]" = cd
        set -l dir (command ek cd $argv[2..-1]); or return $status
        cd $dir
    else
        command ek $argv
    end
end
"#;

/// The marked block written into rc files.
pub fn init_block(kind: ShellKind) -> String {
    format!("{MARKER_START}\n{}{MARKER_END}\n", kind.function())
}

/// Write or refresh the block in `rc`.
pub fn install(kind: ShellKind, rc: &Path) -> Result<()> {
    upsert_marked_block(rc, MARKER_START, MARKER_END, &init_block(kind))?;
    tracing::debug!(shell = %kind, rc = %rc.display(), "installed shell function");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_kinds() {
        assert_eq!("zsh".parse::<ShellKind>().unwrap(), ShellKind::Zsh);
        assert!("tcsh".parse::<ShellKind>().is_err());
    }

    #[test]
    fn install_is_idempotent_and_keeps_user_lines() {
        let dir = TempDir::new().unwrap();
        let rc = dir.path().join(".bashrc");
        std::fs::write(&rc, "export EDITOR=vim\n").unwrap();

        install(ShellKind::Bash, &rc).unwrap();
        install(ShellKind::Bash, &rc).unwrap();

        let text = std::fs::read_to_string(&rc).unwrap();
        assert!(text.starts_with("export EDITOR=vim\n"));
        assert_eq!(text.matches(MARKER_START).count(), 1);
        assert!(text.contains("command ek cd"));
    }

    #[test]
    fn fish_rc_lives_in_conf_d() {
        let rc = ShellKind::Fish.rc_file(Path::new("/home/u"));
        assert!(rc.ends_with("conf.d/eaglekit.fish"));
        assert!(init_block(ShellKind::Fish).contains("function ek"));
    }

    #[cfg(unix)]
    #[test]
    fn posix_function_forwards_every_cd_argument() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("bin");
        let target = dir.path().join("api");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(&target).unwrap();
        let target = std::fs::canonicalize(&target).unwrap();

        let log = dir.path().join("calls");
        let fake = bin.join("ek");
        std::fs::write(
            &fake,
            format!(
                "#!/bin/sh\necho \"$*\" >> '{}'\necho '{}'\n",
                log.display(),
                target.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let init = dir.path().join("init.sh");
        std::fs::write(&init, init_block(ShellKind::Sh)).unwrap();

        let path = format!("{}:{}", bin.display(), std::env::var("PATH").unwrap_or_default());
        let out = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!(". '{}'; ek cd api --ws work && pwd -P", init.display()))
            .env("PATH", path)
            .output()
            .unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), target.display().to_string());
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "cd api --ws work\n");
    }
}
