use crate::error::{EkError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Task the comment is attached to; `None` for the project itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `.eagle/comments.json`. Resolving a comment removes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentLog {
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl CommentLog {
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = paths::comments_path(project_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, project_root: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&paths::comments_path(project_root), data.as_bytes())
    }

    /// Append a comment and return its id.
    pub fn add(&mut self, body: impl Into<String>, task: Option<String>, author: Option<String>) -> String {
        self.seq += 1;
        let id = format!("C{}", self.seq);
        self.comments.push(Comment {
            id: id.clone(),
            body: body.into(),
            author,
            task,
            created_at: Utc::now(),
        });
        id
    }

    pub fn resolve(&mut self, id: &str) -> Result<Comment> {
        let pos = self
            .comments
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| EkError::CommentNotFound(id.to_string()))?;
        Ok(self.comments.remove(pos))
    }

    pub fn for_task<'a>(&'a self, task: Option<&'a str>) -> impl Iterator<Item = &'a Comment> + 'a {
        self.comments
            .iter()
            .filter(move |c| task.is_none() || c.task.as_deref() == task)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn add_and_resolve() {
        let mut log = CommentLog::default();
        let c1 = log.add("flaky on CI", Some("test".to_string()), Some("ana".to_string()));
        let c2 = log.add("needs a README", None, None);
        assert_eq!((c1.as_str(), c2.as_str()), ("C1", "C2"));

        let resolved = log.resolve("C1").unwrap();
        assert_eq!(resolved.author.as_deref(), Some("ana"));
        assert!(matches!(log.resolve("C1"), Err(EkError::CommentNotFound(_))));
        assert_eq!(log.add("again", None, None), "C3");
    }

    #[test]
    fn filter_by_task() {
        let mut log = CommentLog::default();
        log.add("a", Some("build".to_string()), None);
        log.add("b", None, None);
        assert_eq!(log.for_task(Some("build")).count(), 1);
        assert_eq!(log.for_task(None).count(), 2);
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut log = CommentLog::default();
        log.add("hello", None, None);
        log.save(dir.path()).unwrap();
        assert_eq!(CommentLog::load(dir.path()).unwrap(), log);
    }
}
