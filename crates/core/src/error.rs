use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid session config: {0}")]
    InvalidConfig(String),

    #[error("Malformed audio: {0}")]
    MalformedAudio(String),
}
