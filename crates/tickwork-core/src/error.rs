//! Unified error types for Tickwork.

use thiserror::Error;

/// Result type alias using TickworkError.
pub type Result<T> = std::result::Result<T, TickworkError>;

#[derive(Error, Debug)]
pub enum TickworkError {
    // Registration errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl TickworkError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TickworkError::Validation("no trigger".into());
        assert_eq!(err.to_string(), "Validation error: no trigger");

        let err = TickworkError::DuplicateTask("nightly".into());
        assert!(err.to_string().contains("nightly"));
    }

    #[test]
    fn test_error_constructors() {
        let e1 = TickworkError::validation("test");
        assert!(matches!(e1, TickworkError::Validation(_)));

        let e2 = TickworkError::config("test");
        assert!(matches!(e2, TickworkError::Config(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TickworkError = io_err.into();
        assert!(matches!(err, TickworkError::Io(_)));
    }
}
