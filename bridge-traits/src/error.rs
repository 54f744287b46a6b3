use thiserror::Error;

/// Failure reported by a host capability.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host could not take a log entry.
    #[error("Log sink rejected entry: {0}")]
    SinkRejected(String),
}

impl BridgeError {
    pub fn sink(err: impl std::fmt::Display) -> Self {
        BridgeError::SinkRejected(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
