use thiserror::Error;

#[derive(Debug, Error)]
pub enum EkError {
    #[error("project not found in workspace '{workspace}': {name}")]
    ProjectNotFound { workspace: String, name: String },

    #[error("no registered project contains {0}")]
    NoProjectForPath(String),

    #[error("path does not exist: {0}")]
    PathNotFound(String),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("invalid name '{0}': use letters, digits, '.', '_' or '-', starting with a letter or digit")]
    InvalidName(String),

    #[error("invalid ignore policy '{0}': expected local, repo, global or none")]
    InvalidIgnorePolicy(String),

    #[error("not a git repository: {0}")]
    NotARepository(String),

    #[error("git failed: {0}")]
    Git(String),

    #[error("todo not found: {0}")]
    TodoNotFound(String),

    #[error("comment not found: {0}")]
    CommentNotFound(String),

    #[error("home directory not found: set HOME or EK_CONFIG_DIR")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EkError>;
