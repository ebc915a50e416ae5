//! # Error Handling
//!
//! Application-level errors for keyward, defined with `thiserror`.
//!
//! Secret store faults never surface here; they are reported by
//! [`crate::secrets::SecretsError`] and absorbed by the secrets manager.
//! Only startup problems (bad settings, unreadable files) propagate.

/// Custom result type for keyward operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for keyward
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Settings could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings were loaded but are out of range
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::validation(format!("Validation failed: {}", errors))
    }
}
