use std::fmt;

/// Where a terminal stream failure came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorOrigin {
    /// The backend sent an explicit `error` frame.
    #[default]
    Peer,
    /// The connection failed or closed mid-stream and the client synthesized
    /// the `error` frame.
    Transport,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer => f.write_str("backend"),
            Self::Transport => f.write_str("transport"),
        }
    }
}

/// Terminal failure recorded in reducer state after an `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[error("{origin} error: {message}")]
pub struct StreamError {
    pub origin: ErrorOrigin,
    pub message: String,
}

impl StreamError {
    pub fn new(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
        }
    }
}

/// Errors returned before a stream exists, or by the non-streaming helpers.
///
/// Failures after a stream has been opened are never returned as `Err`; they
/// arrive as a terminal `error` frame instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration (bad URL, unparsable env value, etc.).
    #[error("config error: {0}")]
    Config(String),
    /// Request payload rejected before it was sent.
    #[error("validation error: {0}")]
    Validation(String),
    /// The backend could not be reached at all.
    #[error("connection failed: {0}")]
    Connect(String),
    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// A non-streaming response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Returns the HTTP status when the backend rejected the request.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
