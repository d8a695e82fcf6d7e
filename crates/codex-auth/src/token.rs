//! OAuth refresh-token exchange
//!
//! One POST to the configured token endpoint per refresh. The endpoint may
//! rotate the id token and the refresh token; the access token is the only
//! field a successful response must carry.

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::cancel::cancellable;
use crate::config::AuthConfig;
use crate::error::{Error, Result};

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: Secret<String>,
    pub id_token: Option<Secret<String>>,
    pub refresh_token: Option<Secret<String>>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    grant_type: &'static str,
    refresh_token: &'a str,
    scope: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
}

/// Exchanges refresh tokens at the token endpoint.
#[derive(Debug, Clone)]
pub struct RefreshClient {
    http: reqwest::Client,
    config: AuthConfig,
}

impl RefreshClient {
    pub fn new(http: reqwest::Client, config: AuthConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Exchange `refresh_token` for a new token pair.
    ///
    /// An empty refresh token fails with `Configuration` before any request
    /// is made. Cancellation before or during the call yields `Cancelled`;
    /// an endpoint slower than `AuthConfig::timeout` yields `Http`.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str, cancel: &CancellationToken) -> Result<TokenPair> {
        if refresh_token.is_empty() {
            return Err(Error::Configuration(
                "no refresh token available, sign in again".into(),
            ));
        }
        cancellable(cancel, self.exchange(refresh_token)).await
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair> {
        let request = RefreshRequest {
            client_id: &self.config.client_id,
            grant_type: "refresh_token",
            refresh_token,
            scope: &self.config.scope,
        };

        let response = self
            .http
            .post(&self.config.token_url)
            .json(&request)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading token refresh response: {e}")))?;

        if !status.is_success() {
            return Err(Error::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Protocol(format!("invalid refresh response: {e}")))?;

        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Protocol("refresh response has no access_token".into()))?;

        debug!(
            rotated_id_token = parsed.id_token.is_some(),
            rotated_refresh_token = parsed.refresh_token.is_some(),
            "token refresh succeeded"
        );

        Ok(TokenPair {
            access_token: Secret::new(access_token),
            id_token: parsed.id_token.filter(|t| !t.is_empty()).map(Secret::new),
            refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()).map(Secret::new),
        })
    }
}
