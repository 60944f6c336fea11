//! Error types for the Voicelink gateway

use thiserror::Error;

/// Result type alias for Voicelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Voicelink gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device unavailable or access denied
    #[error("audio device error: {0}")]
    Device(String),

    /// Audio processing error
    #[error("audio error: {0}")]
    Audio(String),

    /// Inbound frame rejected by the protocol validator
    #[error("invalid frame: {0}")]
    Validation(#[from] crate::protocol::FrameError),

    /// Upstream conversational session error
    #[error("upstream session error: {0}")]
    Upstream(String),

    /// Transport channel error
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
