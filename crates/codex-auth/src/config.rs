//! Immutable settings for the refresh client and staleness checks

use std::time::Duration;

use crate::constants::{
    CODEX_CLIENT_ID, EXPIRY_SKEW_SECS, REFRESH_SCOPE, REFRESH_TIMEOUT_SECS, TOKEN_ENDPOINT,
};

/// Token endpoint, client identity and expiry skew.
///
/// Built once at startup (from defaults or the config file) and cloned into
/// each component that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub scope: String,
    pub expiry_skew: Duration,
    /// Per-request timeout for the token endpoint
    pub timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: TOKEN_ENDPOINT.to_string(),
            client_id: CODEX_CLIENT_ID.to_string(),
            scope: REFRESH_SCOPE.to_string(),
            expiry_skew: Duration::from_secs(EXPIRY_SKEW_SECS),
            timeout: Duration::from_secs(REFRESH_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_codex_cli() {
        let config = AuthConfig::default();
        assert_eq!(config.token_url, "https://auth.openai.com/oauth/token");
        assert_eq!(config.client_id, "app_EMoamEEZ73f0CkXaXp7hrann");
        assert_eq!(config.scope, "openid profile email");
        assert_eq!(config.expiry_skew, Duration::from_secs(60));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }
}
