//! Per-account poll: refresh when needed, fetch usage, retry once on 401
//!
//! A session reads the account's bundle fresh from disk, refreshes the
//! access token proactively when it is about to expire, fetches usage, and
//! on a 401 refreshes and retries exactly once. Every refresh is persisted
//! before the session continues, so the file on disk never lags the token
//! that was last used successfully.
//!
//! Ordinary failures end up in [`AccountResult::error`]; only cancellation
//! is returned as `Err` so the scheduler can stop mid-pass.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use codex_auth::{CredentialBundle, CredentialStore, Identity, RefreshClient, decode_identity};
use common::Secret;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::usage::{UsageClient, UsageSnapshot};
use crate::window::WindowStatus;

/// A configured account: display name plus bundle path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLocation {
    pub name: String,
    pub path: PathBuf,
}

impl AccountLocation {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Outcome of one account poll, ready for presentation.
///
/// When `error` is set the usage fields are empty and must be ignored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountResult {
    pub name: String,
    pub email: Option<String>,
    pub account_id: Option<String>,
    pub plan_type: Option<String>,
    pub allowed: Option<bool>,
    pub limit_reached: Option<bool>,
    pub primary: Option<WindowStatus>,
    pub secondary: Option<WindowStatus>,
    pub fetched_at: DateTime<Utc>,
    pub last_refresh: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AccountResult {
    fn from_snapshot(
        name: &str,
        progress: &Progress,
        snapshot: UsageSnapshot,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.to_string(),
            email: progress.identity.email.clone(),
            account_id: progress.account_id.clone(),
            plan_type: snapshot
                .plan_type
                .or_else(|| progress.identity.plan_type.clone()),
            allowed: snapshot.allowed,
            limit_reached: snapshot.limit_reached,
            primary: snapshot.primary.as_ref().map(WindowStatus::from_window),
            secondary: snapshot.secondary.as_ref().map(WindowStatus::from_window),
            fetched_at,
            last_refresh: progress.last_refresh,
            error: None,
        }
    }

    fn failed(name: &str, progress: &Progress, error: &Error, fetched_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            email: progress.identity.email.clone(),
            account_id: progress.account_id.clone(),
            plan_type: progress.identity.plan_type.clone(),
            allowed: None,
            limit_reached: None,
            primary: None,
            secondary: None,
            fetched_at,
            last_refresh: progress.last_refresh,
            error: Some(error.to_string()),
        }
    }
}

/// What a session has learned so far; survives into a failed result.
#[derive(Debug, Default)]
struct Progress {
    identity: Identity,
    account_id: Option<String>,
    last_refresh: Option<DateTime<Utc>>,
}

impl Progress {
    /// Re-derive identity and account id from the bundle's current tokens.
    fn observe(&mut self, bundle: &CredentialBundle) {
        self.identity = bundle.id_token().map(decode_identity).unwrap_or_default();
        self.account_id = bundle
            .account_id()
            .map(str::to_owned)
            .or_else(|| self.identity.account_id.clone());
        self.last_refresh = bundle.last_refresh();
    }
}

/// Something that can poll one account. The scheduler depends on this
/// rather than on [`AccountSession`] so passes can be driven without HTTP.
///
/// Uses `Pin<Box<dyn Future>>` for dyn-compatibility (`Arc<dyn UsageSource>`).
pub trait UsageSource: Send + Sync {
    fn poll_account<'a>(
        &'a self,
        account: &'a AccountLocation,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<AccountResult>> + Send + 'a>>;
}

/// Polls accounts against the token and usage endpoints.
#[derive(Debug, Clone)]
pub struct AccountSession {
    refresh: RefreshClient,
    usage: UsageClient,
}

impl AccountSession {
    pub fn new(refresh: RefreshClient, usage: UsageClient) -> Self {
        Self { refresh, usage }
    }

    /// Poll one account. Returns `Err` only when cancelled.
    #[instrument(skip_all, fields(account = %account.name))]
    pub async fn run(
        &self,
        account: &AccountLocation,
        cancel: &CancellationToken,
    ) -> Result<AccountResult> {
        let fetched_at = Utc::now();
        let mut progress = Progress::default();

        match self.poll(account, cancel, &mut progress).await {
            Ok(snapshot) => Ok(AccountResult::from_snapshot(
                &account.name,
                &progress,
                snapshot,
                fetched_at,
            )),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(error = %e, "account poll failed");
                Ok(AccountResult::failed(&account.name, &progress, &e, fetched_at))
            }
        }
    }

    async fn poll(
        &self,
        account: &AccountLocation,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<UsageSnapshot> {
        let store = CredentialStore::new(&account.path);
        let mut bundle = store.load().await?;
        progress.observe(&bundle);

        let access_token = bundle.require_access_token()?;
        let skew = self.refresh.config().expiry_skew;
        if codex_auth::is_stale(access_token, Utc::now(), skew) {
            if bundle.refresh_token().is_some() {
                info!("access token stale, refreshing before fetch");
                self.refresh_and_persist(&store, &mut bundle, cancel, progress)
                    .await?;
            } else {
                debug!("access token stale and no refresh token, letting the server decide");
            }
        }

        match self.fetch(&bundle, progress, cancel).await {
            Err(Error::Remote { status: 401, .. }) if bundle.refresh_token().is_some() => {
                info!("usage endpoint returned 401, refreshing and retrying once");
                self.refresh_and_persist(&store, &mut bundle, cancel, progress)
                    .await?;
                self.fetch(&bundle, progress, cancel).await
            }
            other => other,
        }
    }

    async fn fetch(
        &self,
        bundle: &CredentialBundle,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<UsageSnapshot> {
        let access_token = bundle.require_access_token()?;
        self.usage
            .fetch(access_token, progress.account_id.as_deref(), cancel)
            .await
    }

    /// Refresh, fold the new tokens into `bundle`, write it back, and
    /// re-derive identity from the possibly rotated id token.
    async fn refresh_and_persist(
        &self,
        store: &CredentialStore,
        bundle: &mut CredentialBundle,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<()> {
        let refresh_token = Secret::from(bundle.refresh_token().unwrap_or_default());
        let tokens = self.refresh.refresh(refresh_token.expose(), cancel).await?;

        bundle.apply_refresh(&tokens, Utc::now());
        store.save(bundle).await?;
        progress.observe(bundle);
        Ok(())
    }
}

impl UsageSource for AccountSession {
    fn poll_account<'a>(
        &'a self,
        account: &'a AccountLocation,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<AccountResult>> + Send + 'a>> {
        Box::pin(self.run(account, cancel))
    }
}
