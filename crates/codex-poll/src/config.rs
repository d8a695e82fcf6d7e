//! Immutable settings for the usage client and the poll loop

use std::time::Duration;

/// Usage endpoint (ChatGPT backend, same one the Codex CLI reads)
pub const USAGE_ENDPOINT: &str = "https://chatgpt.com/backend-api/wham/usage";

/// Header carrying the ChatGPT account id alongside the bearer token
pub const ACCOUNT_ID_HEADER: &str = "ChatGPT-Account-Id";

/// Time between the starts of two successive passes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on one wait step; also the worst-case cancellation latency
pub const DEFAULT_TICK: Duration = Duration::from_millis(500);

pub const DEFAULT_USAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageConfig {
    pub usage_url: String,
    pub timeout: Duration,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            usage_url: USAGE_ENDPOINT.to_string(),
            timeout: DEFAULT_USAGE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub tick: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            tick: DEFAULT_TICK,
        }
    }
}
