//! Error types for usage polling

/// Errors from one account poll or from the polling loop.
///
/// Everything except `Cancelled` is captured into the failing account's
/// result; `Cancelled` unwinds the whole pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("remote returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("credential store error: {0}")]
    Credential(String),

    #[error("cancelled")]
    Cancelled,
}

impl Error {
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

impl From<codex_auth::Error> for Error {
    fn from(err: codex_auth::Error) -> Self {
        use codex_auth::Error as Auth;
        match err {
            Auth::Configuration(msg) => Error::Configuration(msg),
            Auth::Remote { status, body } => Error::Remote { status, body },
            Auth::Protocol(msg) => Error::Protocol(msg),
            Auth::Http(msg) => Error::Http(msg),
            Auth::Cancelled => Error::Cancelled,
            other @ (Auth::TokenDecode(_) | Auth::CredentialParse(_) | Auth::Io(_)) => {
                Error::Credential(other.to_string())
            }
        }
    }
}

/// Result alias for poll operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_keep_their_category() {
        let remote: Error = codex_auth::Error::Remote {
            status: 401,
            body: "expired".into(),
        }
        .into();
        assert_eq!(remote.status(), Some(401));

        let cancelled: Error = codex_auth::Error::Cancelled.into();
        assert!(cancelled.is_cancelled());

        let config: Error = codex_auth::Error::Configuration("no access_token".into()).into();
        assert!(matches!(config, Error::Configuration(_)));
    }

    #[test]
    fn local_credential_failures_fold_into_credential() {
        let err: Error = codex_auth::Error::CredentialParse("bad json".into()).into();
        assert!(matches!(err, Error::Credential(ref msg) if msg.contains("bad json")));
        assert_eq!(err.status(), None);
    }
}
