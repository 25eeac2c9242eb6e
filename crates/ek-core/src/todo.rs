use crate::error::{EkError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Todo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub done: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
}

/// `.eagle/todo.json`.
///
/// `seq` only ever grows, so ids stay unique after removals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub items: Vec<Todo>,
}

impl TodoList {
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = paths::todo_path(project_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, project_root: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        crate::io::atomic_write(&paths::todo_path(project_root), data.as_bytes())
    }

    pub fn add(&mut self, text: impl Into<String>) -> &Todo {
        self.seq += 1;
        self.items.push(Todo {
            id: format!("T{}", self.seq),
            text: text.into(),
            done: false,
            created_at: Utc::now(),
            done_at: None,
        });
        &self.items[self.items.len() - 1]
    }

    pub fn complete(&mut self, id: &str) -> Result<&Todo> {
        let item = self
            .items
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| EkError::TodoNotFound(id.to_string()))?;
        if !item.done {
            item.done = true;
            item.done_at = Some(Utc::now());
        }
        Ok(item)
    }

    pub fn remove(&mut self, id: &str) -> Result<Todo> {
        let pos = self
            .items
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| EkError::TodoNotFound(id.to_string()))?;
        Ok(self.items.remove(pos))
    }

    pub fn open_count(&self) -> usize {
        self.items.iter().filter(|t| !t.done).count()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
