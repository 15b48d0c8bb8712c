//! Error types module
//!
//! This module provides the core error type shared by Dropper components. Storage
//! and upload tracking have their own narrower error enums; they convert into
//! `AppError` at the binary boundary.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => AppError::NotFound(err.to_string()),
            _ => AppError::Internal(format!("IO error: {}", err)),
        }
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        AppError::InvalidInput(format!("Date parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err: AppError = io::Error::new(io::ErrorKind::NotFound, "missing.txt").into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.to_string(), "Internal error: IO error: denied");
    }

    #[test]
    fn date_parse_errors_are_invalid_input() {
        let err: AppError = chrono::DateTime::parse_from_rfc3339("yesterday")
            .unwrap_err()
            .into();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
