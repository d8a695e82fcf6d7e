//! OpenAI OAuth constants
//!
//! Public OAuth client configuration matching the Codex CLI. These values
//! are not secrets; they identify the public client application. They are
//! only defaults: every component takes an [`AuthConfig`](crate::AuthConfig)
//! so tests and config files can point somewhere else.

/// OpenAI's public OAuth client ID (same as Codex CLI)
pub const CODEX_CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

/// Token endpoint for refresh-token grants
pub const TOKEN_ENDPOINT: &str = "https://auth.openai.com/oauth/token";

/// Scope requested on every refresh
pub const REFRESH_SCOPE: &str = "openid profile email";

/// An access token is treated as stale this many seconds before its `exp`.
pub const EXPIRY_SKEW_SECS: u64 = 60;

/// Upper bound on one refresh round trip
pub const REFRESH_TIMEOUT_SECS: u64 = 30;

/// Namespaced claim object carrying ChatGPT account data inside the id token.
pub const AUTH_CLAIMS_KEY: &str = "https://api.openai.com/auth";

/// Namespaced claim object carrying profile data (email fallback).
pub const PROFILE_CLAIMS_KEY: &str = "https://api.openai.com/profile";
