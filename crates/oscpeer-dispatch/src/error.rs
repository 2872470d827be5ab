//! Dispatch error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    /// Handler registration with a malformed address pattern
    #[error("pattern error: {0}")]
    Pattern(#[from] oscpeer_core::Error),
}
