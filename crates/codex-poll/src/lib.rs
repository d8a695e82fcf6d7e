//! Usage polling for Codex accounts
//!
//! Polls the ChatGPT usage endpoint for one or more accounts, keeping each
//! account's credentials fresh along the way. Accounts are polled strictly in
//! configuration order, one at a time.
//!
//! Poll lifecycle for one account (`session`):
//! 1. Bundle read fresh from disk via `codex_auth::CredentialStore`
//! 2. Stale access token + refresh token → refresh and persist first
//! 3. Usage fetched with the bearer token and account id header
//! 4. 401 + refresh token → refresh, persist, retry exactly once
//! 5. Result assembled; failures land in `AccountResult::error`
//!
//! `scheduler` runs that for all accounts once, or on a fixed cadence until
//! the cancellation token trips.

pub mod config;
pub mod error;
pub mod scheduler;
pub mod session;
pub mod usage;
pub mod window;

#[cfg(test)]
mod test_support;

pub use config::{PollConfig, UsageConfig};
pub use error::{Error, Result};
pub use scheduler::{PollAction, PollEvent, PollState, Poller, handle_event};
pub use session::{AccountLocation, AccountResult, AccountSession, UsageSource};
pub use usage::{RateWindow, UsageClient, UsageSnapshot};
pub use window::{WindowStatus, window_label};
