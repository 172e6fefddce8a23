use bytes::Bytes;
use thiserror::Error;

/// Raw reply of a broadcast node. Classification happens in the broadcaster so
/// every client implementation shares the same success rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResponse {
    pub status: u16,
    pub body: Bytes,
}

impl SubmitResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failures of a single node call. Pollers degrade all of them to "no data";
/// broadcasters record them verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeClientError {
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl NodeClientError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeClientError::Timeout => "timeout",
            NodeClientError::Transport(_) => "transport",
            NodeClientError::Status(_) => "status",
            NodeClientError::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for NodeClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}
