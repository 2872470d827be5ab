//! Error types for oscpeer-core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Address or pattern does not start with `/`, or is empty
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Address pattern failed to compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Timetag could not be represented
    #[error("invalid timetag: {0}")]
    InvalidTimetag(String),
}
