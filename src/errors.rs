use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("VALIDATION: {0}")]
    Validation(String),
    #[error("FORBIDDEN: {0}")]
    Forbidden(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFLICT: {0}")]
    Conflict(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Message without the code prefix, as shown to the user in a notice.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::Forbidden(message)
            | Self::NotFound(message)
            | Self::Conflict(message)
            | Self::Io(message)
            | Self::Internal(message) => message,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &value {
            if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                return Self::Conflict(message.clone().unwrap_or_else(|| value.to_string()));
            }
        }
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
