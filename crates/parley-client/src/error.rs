//! Errors seen by the stream consumer.

use serde::Deserialize;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No response arrived, or the response body broke off.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The server answered with a non-success status. `message` is the
    /// server's `{error}` text when it sent one.
    #[error("server rejected the request ({status}): {message}")]
    Status { status: u16, message: String },

    /// One frame of the chunk stream could not be decoded. Later frames
    /// are still read.
    #[error("Malformed stream frame: {0}")]
    Parse(String),

    #[error("client misconfigured: {0}")]
    Config(String),
}

/// `{error}` body the server sends with 4xx and 5xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: String,
}
