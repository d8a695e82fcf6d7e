//! Usage endpoint client
//!
//! One authenticated GET per call. The response's `rate_limit` object is
//! flattened into a [`UsageSnapshot`]; field names are accepted in both
//! snake_case and camelCase, and numeric fields in integer or float form.

use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use codex_auth::cancellable;

use crate::config::{ACCOUNT_ID_HEADER, UsageConfig};
use crate::error::{Error, Result};

const CLIENT_USER_AGENT: &str = concat!("codex-usage-monitor/", env!("CARGO_PKG_VERSION"));

/// Rate-limit status for one account at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSnapshot {
    pub allowed: Option<bool>,
    pub limit_reached: Option<bool>,
    pub plan_type: Option<String>,
    pub primary: Option<RateWindow>,
    pub secondary: Option<RateWindow>,
}

/// One rolling window as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct RateWindow {
    pub used_percent: f64,
    pub limit_window_seconds: Option<u64>,
    /// Unix seconds
    pub reset_at: Option<i64>,
}

/// Field lookup accepting the snake_case or camelCase key. When a body
/// carries both, the snake_case value wins.
fn field<'a>(object: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    object
        .get(snake)
        .filter(|v| !v.is_null())
        .or_else(|| object.get(camel).filter(|v| !v.is_null()))
}

/// Integral seconds from a JSON number; fractional values are truncated.
fn whole_number(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}

fn parse_window(value: &Value) -> Option<RateWindow> {
    let window = value.as_object()?;
    Some(RateWindow {
        used_percent: field(window, "used_percent", "usedPercent")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        limit_window_seconds: field(window, "limit_window_seconds", "limitWindowSeconds")
            .and_then(whole_number)
            .and_then(|secs| u64::try_from(secs).ok()),
        reset_at: field(window, "reset_at", "resetAt").and_then(whole_number),
    })
}

/// Parse a usage response body.
///
/// Only a body that is not a JSON object, or one without a `rate_limit`
/// object, is rejected. Fields of an unexpected type read as absent.
pub fn parse_usage(body: &str) -> Result<UsageSnapshot> {
    let response: Value = serde_json::from_str(body)
        .map_err(|e| Error::Protocol(format!("invalid usage response: {e}")))?;
    let response = response
        .as_object()
        .ok_or_else(|| Error::Protocol("usage response is not an object".into()))?;
    let rate_limit = field(response, "rate_limit", "rateLimit")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Protocol("usage response has no rate_limit".into()))?;

    Ok(UsageSnapshot {
        allowed: rate_limit.get("allowed").and_then(Value::as_bool),
        limit_reached: field(rate_limit, "limit_reached", "limitReached").and_then(Value::as_bool),
        plan_type: field(response, "plan_type", "planType")
            .and_then(Value::as_str)
            .map(str::to_owned),
        primary: field(rate_limit, "primary_window", "primaryWindow").and_then(parse_window),
        secondary: field(rate_limit, "secondary_window", "secondaryWindow").and_then(parse_window),
    })
}

/// Fetches usage snapshots with a bearer token.
#[derive(Debug, Clone)]
pub struct UsageClient {
    http: reqwest::Client,
    config: UsageConfig,
}

impl UsageClient {
    pub fn new(http: reqwest::Client, config: UsageConfig) -> Self {
        Self { http, config }
    }

    /// Fetch the current snapshot. Non-2xx responses fail with `Remote`
    /// carrying the status so callers can react to 401.
    #[instrument(skip_all, fields(has_account_id = account_id.is_some()))]
    pub async fn fetch(
        &self,
        access_token: &str,
        account_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<UsageSnapshot> {
        cancellable(cancel, self.request(access_token, account_id)).await
    }

    async fn request(&self, access_token: &str, account_id: Option<&str>) -> Result<UsageSnapshot> {
        let mut request = self
            .http
            .get(&self.config.usage_url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .timeout(self.config.timeout);
        if let Some(account_id) = account_id {
            request = request.header(ACCOUNT_ID_HEADER, account_id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(format!("usage request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("reading usage response: {e}")))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "usage endpoint rejected request");
            return Err(Error::Remote {
                status: status.as_u16(),
                body,
            });
        }

        parse_usage(&body)
    }
}
