use deskpilot_core::{CoreError, StreamState};
use deskpilot_providers::ProviderError;
use thiserror::Error;

/// Text-mode conversation errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Model error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool rounds ({0}) exceeded without a final answer")]
    ToolRoundsExceeded(usize),

    #[error("Config error: {0}")]
    Config(#[from] CoreError),
}

/// Failures of the bidirectional realtime channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("connection closed by server")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio stream error: {0}")]
    Stream(String),
}

/// Streaming controller errors.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("stream already active")]
    AlreadyActive,

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: StreamState,
    },

    #[error("connect timed out after {0}ms")]
    ConnectTimeout(u64),

    #[error("start cancelled by stop")]
    Cancelled,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
