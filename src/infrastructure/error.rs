use crate::domain::error::ScheduleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl InfraError {
    /// Stable machine-readable code reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schedule(error) => error.code(),
            Self::InvalidConfig(_) => "validation",
            Self::Io(_) | Self::Json(_) | Self::Sqlite(_) | Self::Internal(_) => "internal",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Schedule(ScheduleError::Validation(message.into()))
    }
}
