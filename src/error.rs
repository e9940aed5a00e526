//! Error types for the sweeper

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sweeper
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Insecure keypair permissions: {0}")]
    InsecureKeypair(String),

    // Upstream errors
    #[error("Balance unavailable: {0}")]
    BalanceUnavailable(String),

    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Transfer submission failed: {0}")]
    LedgerSubmit(String),

    // Chat transport errors
    #[error("Chat transport error: {0}")]
    Chat(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Check if this error belongs to the fatal startup class
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::InvalidKeypair(_) | Error::InsecureKeypair(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(Error::InvalidKeypair("short".into()).is_configuration());
        assert!(Error::Config("no destination".into()).is_configuration());
        assert!(!Error::QuoteUnavailable("500".into()).is_configuration());
        assert!(!Error::LedgerSubmit("blockhash".into()).is_configuration());
    }

    #[test]
    fn test_error_display() {
        let err = Error::QuoteUnavailable("HTTP 500".to_string());
        assert_eq!(err.to_string(), "Quote unavailable: HTTP 500");
    }
}
