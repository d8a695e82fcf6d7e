//! Error types for credential and token operations

/// Errors from credential loading, token decoding and token refresh.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or unusable local configuration (no access token, no refresh
    /// token). Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote endpoint answered with a non-success status.
    #[error("remote returned {status}: {body}")]
    Remote { status: u16, body: String },

    /// The remote endpoint answered 2xx but the body was unusable.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The request never produced a response (connect, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("cancelled")]
    Cancelled,

    #[error("token decode error: {0}")]
    TokenDecode(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// HTTP status carried by a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
