//! Error types for the relay pool.

use thiserror::Error;

/// Errors that can cross the library boundary.
///
/// Failures local to a single candidate (probe errors, a failed insert during
/// validation) are logged and absorbed where they happen and never show up
/// here.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client construction error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The candidate source could not be fetched.
    #[error("Relay source {url} unavailable: {reason}")]
    SourceUnavailable { url: String, reason: String },

    /// A value that should have been a dotted IPv4 address.
    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// The store never reached the minimum pool population.
    #[error("Pool under-populated: {available}/{required} relays after {attempts} attempts")]
    PoolUnderPopulated {
        available: usize,
        required: usize,
        attempts: u32,
    },

    /// The selector ran out of attempts without finding a usable relay.
    #[error("No usable relay after {attempts} attempts")]
    SelectionExhausted { attempts: u32 },

    /// A bulk import worker panicked or was cancelled.
    #[error("Import worker failed: {0}")]
    Worker(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
