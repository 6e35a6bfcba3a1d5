//! Errors for the GPS emulator
use thiserror::Error;

use crate::models::Mdn;

/// A record or value failed validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid MDN: {0}")]
    InvalidMdn(String),

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("Latitude and longitude must be given together")]
    PartialPosition,

    #[error("GPS status FIXED requires a position")]
    MissingPosition,

    #[error("Unknown GPS status: {0}")]
    UnknownGpsStatus(String),

    #[error("Unknown power status: {0}")]
    UnknownPowerStatus(String),

    #[error("Field {0} cannot be empty")]
    EmptyField(&'static str),
}

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("No emulator registered for MDN {0}")]
    NotFound(Mdn),

    #[error("Emulator for MDN {0} is already active")]
    AlreadyActive(Mdn),

    #[error("Emulator for MDN {0} is not active")]
    Inactive(Mdn),

    #[error("Transmission failed: {0}")]
    Transmission(String),

    #[error("Backend rejected log: {message} (code {code})")]
    BackendRejected { code: String, message: String },

    #[error("HTTP error")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Command error: {0}")]
    Cli(String),

    #[error("Database connection error: {0}")]
    DatabaseConnectionError(String),

    #[error("Database migration error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}

impl EmulatorError {
    /// HTTP-style status code for reporting the failure to callers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Cli(_) => 400,
            Self::NotFound(_) => 404,
            Self::AlreadyActive(_) | Self::Inactive(_) => 409,
            _ => 500,
        }
    }

    /// Whether the failure came from talking to the backend and may succeed on retry.
    pub fn is_transmission(&self) -> bool {
        matches!(
            self,
            Self::Transmission(_) | Self::BackendRejected { .. } | Self::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let mdn = Mdn::try_from(1234567890).unwrap();
        assert_eq!(
            EmulatorError::from(ValidationError::MissingField("mdn")).status_code(),
            400
        );
        assert_eq!(EmulatorError::NotFound(mdn).status_code(), 404);
        assert_eq!(EmulatorError::AlreadyActive(mdn).status_code(), 409);
        assert_eq!(
            EmulatorError::Transmission("refused".to_string()).status_code(),
            500
        );
    }

    #[test]
    fn transmission_errors_are_retryable() {
        assert!(EmulatorError::Transmission("timeout".to_string()).is_transmission());
        assert!(EmulatorError::BackendRejected {
            code: "999".to_string(),
            message: "bad".to_string()
        }
        .is_transmission());
        assert!(!EmulatorError::Cli("oops".to_string()).is_transmission());
    }
}
