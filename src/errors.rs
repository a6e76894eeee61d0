use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("NOTEBOOK_NOT_FOUND: {0}")]
    NotebookNotFound(String),
    #[error("EVENT_NOT_FOUND: {0}")]
    EventNotFound(String),
    #[error("EVENT_ALREADY_UNDONE: {0}")]
    EventAlreadyUndone(String),
    #[error("EVENT_CONFLICT: {0}")]
    EventConflict(String),
    #[error("UNDO_UNSUPPORTED: {0}")]
    UndoUnsupported(String),
    #[error("UNDO_UNSUPPORTED_PAYLOAD: {0}")]
    UndoUnsupportedPayload(String),
    #[error("INVALID_EVENT: {0}")]
    InvalidEvent(String),
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("TRANSACTION_UNSUPPORTED: {0}")]
    TransactionUnsupported(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotebookNotFound(_) => "NOTEBOOK_NOT_FOUND",
            Self::EventNotFound(_) => "EVENT_NOT_FOUND",
            Self::EventAlreadyUndone(_) => "EVENT_ALREADY_UNDONE",
            Self::EventConflict(_) => "EVENT_CONFLICT",
            Self::UndoUnsupported(_) => "UNDO_UNSUPPORTED",
            Self::UndoUnsupportedPayload(_) => "UNDO_UNSUPPORTED_PAYLOAD",
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::TransactionUnsupported(_) => "TRANSACTION_UNSUPPORTED",
            Self::Io(_) => "IO_FAILURE",
            Self::Internal(_) => "INTERNAL",
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
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn display_is_prefixed_with_the_error_code() {
        let error = AppError::EventConflict("newer event evt-2 exists".to_string());
        assert_eq!(error.code(), "EVENT_CONFLICT");
        assert_eq!(error.to_string(), "EVENT_CONFLICT: newer event evt-2 exists");
    }
}
