use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// A concurrently running `ek` never observes a torn registry or config file.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)?;
    Ok(())
}

/// Write a file only if it does not already exist. Returns true if written.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    atomic_write(path, data)?;
    Ok(true)
}

/// Replace content between `start_marker` and `end_marker` (inclusive) in a file.
///
/// Returns `true` if both markers were found and the file was updated, `false`
/// if the markers were not found (file unchanged).
pub fn replace_between_markers(
    path: &Path,
    start_marker: &str,
    end_marker: &str,
    replacement: &str,
) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    let content = std::fs::read_to_string(path)?;
    let Some(start_pos) = content.find(start_marker) else {
        return Ok(false);
    };
    let search_from = start_pos + start_marker.len();
    let Some(end_offset) = content[search_from..].find(end_marker) else {
        return Ok(false);
    };
    let end_pos = search_from + end_offset + end_marker.len();

    let mut updated = String::with_capacity(content.len());
    updated.push_str(&content[..start_pos]);
    updated.push_str(replacement);
    updated.push_str(&content[end_pos..]);

    atomic_write(path, updated.as_bytes())?;
    Ok(true)
}

/// Write `block` (which must start with `start_marker` and end with
/// `end_marker`) into `path`: replace the existing marked block, or append it.
pub fn upsert_marked_block(
    path: &Path,
    start_marker: &str,
    end_marker: &str,
    block: &str,
) -> Result<()> {
    if replace_between_markers(path, start_marker, end_marker, block)? {
        return Ok(());
    }
    let existing = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };
    let sep = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    let mut updated = existing;
    updated.push_str(sep);
    updated.push_str(block);
    if !block.ends_with('\n') {
        updated.push('\n');
    }
    atomic_write(path, updated.as_bytes())
}

/// Append `line` to `path` unless an identical line (ignoring surrounding
/// whitespace) is already present. Creates the file and its parents.
/// Returns true if the line was added.
pub fn ensure_line(path: &Path, line: &str) -> Result<bool> {
    let existing = if path.exists() {
        std::fs::read_to_string(path)?
    } else {
        String::new()
    };
    // Exact line match; a substring check would accept `.eagle/old`.
    if existing.lines().any(|l| l.trim() == line) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let sep = if existing.is_empty() || existing.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(f, "{sep}{line}")?;
    Ok(true)
}

/// Returns true if `path` contains `line` as an exact (trimmed) line.
pub fn contains_line(path: &Path, line: &str) -> bool {
    std::fs::read_to_string(path)
        .map(|c| c.lines().any(|l| l.trim() == line))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.yaml");
        atomic_write(&path, b"current_workspace: default").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "current_workspace: default"
        );
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".eagle/branches/release/config.yaml");
        atomic_write(&path, b"tasks: {}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn ensure_line_adds_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".gitignore");
        assert!(ensure_line(&path, ".eagle/").unwrap());
        assert!(contains_line(&path, ".eagle/"));
    }

    #[test]
    fn ensure_line_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("info/exclude");
        assert!(ensure_line(&path, ".eagle/").unwrap());
        assert!(!ensure_line(&path, ".eagle/").unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().filter(|l| *l == ".eagle/").count(), 1);
    }

    #[test]
    fn ensure_line_appends_after_unterminated_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".gitignore");
        std::fs::write(&path, "target").unwrap();
        ensure_line(&path, ".eagle/").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "target\n.eagle/\n");
    }

    #[test]
    fn upsert_marked_block_replaces_existing_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".bashrc");
        std::fs::write(&path, "export A=1\n").unwrap();
        upsert_marked_block(&path, "# >>> ek", "# <<< ek", "# >>> ek\nold\n# <<< ek").unwrap();
        upsert_marked_block(&path, "# >>> ek", "# <<< ek", "# >>> ek\nnew\n# <<< ek").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("export A=1\n"));
        assert!(content.contains("new"));
        assert!(!content.contains("old"));
        assert_eq!(content.matches("# >>> ek").count(), 1);
    }

    #[test]
    fn write_if_missing_skips_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build.sh");
        std::fs::write(&path, b"original").unwrap();
        let written = write_if_missing(&path, b"new").unwrap();
        assert!(!written);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
    }
}
