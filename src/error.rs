//! Error types for the Turnstile library.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors, raised at construction time
    #[error("Configuration error: {0}")]
    Config(String),

    /// The storage backend failed during a get/put/reset operation
    #[error("Storage backend '{backend}' unavailable: {source}")]
    StoreUnavailable {
        /// Diagnostic name of the backend that failed
        backend: &'static str,
        /// Underlying transport or backend error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An insert was attempted for a key that already holds state
    #[error("Rate limit state for key '{0}' already exists")]
    DuplicateKey(String),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, Error>;
