//! OpenAI OAuth credential handling for the usage monitor
//!
//! Everything needed to keep one account's bearer token usable: reading and
//! rewriting its `auth.json`, reading claims out of its tokens without
//! verification, and exchanging its refresh token at the token endpoint.
//! The crate performs no polling and holds no global state; endpoints and
//! skew arrive through [`AuthConfig`].
//!
//! Credential flow for one poll:
//! 1. `CredentialStore::load()` reads the bundle fresh from disk
//! 2. `jwt::is_stale()` checks the access token's `exp` against the skew
//! 3. `RefreshClient::refresh()` exchanges the refresh token when needed
//! 4. `CredentialBundle::apply_refresh()` + `CredentialStore::save()` persist it
//! 5. `jwt::decode_identity()` re-reads the (possibly rotated) id token

pub mod cancel;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod token;

pub use cancel::cancellable;
pub use config::AuthConfig;
pub use constants::*;
pub use credentials::{CredentialBundle, CredentialStore};
pub use error::{Error, Result};
pub use jwt::{Identity, decode_identity, decode_payload, is_stale};
pub use token::{RefreshClient, TokenPair};
