//! Root error type for the binary
//!
//! Component errors stay local to their modules; this aggregates what can
//! stop the process at startup or while serving.

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum PtcError {
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PtcError {
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Get error code for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            PtcError::Config(_) => "CONFIG_ERROR",
            PtcError::Logging(_) => "LOGGING_ERROR",
            PtcError::Storage(_) => "STORAGE_ERROR",
            PtcError::Server(_) => "SERVER_ERROR",
            PtcError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PtcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = PtcError::server("bind failed");
        assert!(err.to_string().contains("bind failed"));
        assert_eq!(err.error_code(), "SERVER_ERROR");

        let err: PtcError = StorageError::Connection("pool exhausted".into()).into();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
    }
}
