//! Crate-level error type for the application glue.

use thiserror::Error;

/// Errors surfaced by the daemon, chamber controller, and settings store.
///
/// Driver-level failures stay in [`crate::peripheral::DriverError`]; this
/// type covers what the glue around them can run into.
#[derive(Error, Debug)]
pub enum Error {
    /// Hardware access failed.
    #[error("hardware error: {0}")]
    Hardware(String),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result type for application operations.
pub type Result<T> = std::result::Result<T, Error>;
