//! Peer transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PeerError>;

#[derive(Error, Debug)]
pub enum PeerError {
    /// Invalid construction arguments
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    /// Outgoing packet could not be serialized
    #[error("encode error: {0}")]
    Encode(String),

    /// Frame exceeds the configured maximum
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// `stop_listening` invoked from the receive thread itself; a handler
    /// must not tear down the loop that is running it
    #[error("stop_listening called from the receive thread")]
    StopFromReceiveThread,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
