use thiserror::Error;

/// Errors surfaced by the scheduling core and the CLI around it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file: {0}")]
    Config(#[from] toml::de::Error),

    /// A backup document was rejected; in-memory state is untouched.
    #[error("invalid backup document: {0}")]
    InvalidBackup(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("holiday tasks cannot be modified: {0}")]
    ImmutableHoliday(String),

    #[error("invalid task: {field} {reason}")]
    InvalidTask { field: &'static str, reason: String },

    #[error("invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    #[error("collaborator failed: {0}")]
    Collaborator(String),
}

impl Error {
    pub fn invalid_task(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidTask { field, reason: reason.into() }
    }

    pub fn invalid_input(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidInput { input: input.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
