//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Every section is optional; a missing default config file means built-in
//! defaults. Credential files are only referenced by path here, never read.

use std::path::{Path, PathBuf};
use std::time::Duration;

use codex_auth::AuthConfig;
use codex_poll::{AccountLocation, PollConfig, UsageConfig};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "codex-usage-monitor.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub auth: AuthSection,
    pub usage: UsageSection,
    pub poll: PollSection,
    pub accounts: Vec<AccountEntry>,
}

/// Token endpoint and refresh client identity
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSection {
    pub token_url: String,
    pub client_id: String,
    pub scope: String,
    pub expiry_skew_secs: u64,
    pub timeout_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        let defaults = AuthConfig::default();
        Self {
            token_url: defaults.token_url,
            client_id: defaults.client_id,
            scope: defaults.scope,
            expiry_skew_secs: defaults.expiry_skew.as_secs(),
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UsageSection {
    pub usage_url: String,
    pub timeout_secs: u64,
}

impl Default for UsageSection {
    fn default() -> Self {
        let defaults = UsageConfig::default();
        Self {
            usage_url: defaults.usage_url,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

/// Repeating-mode cadence
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSection {
    pub interval_secs: u64,
    pub tick_millis: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        let defaults = PollConfig::default();
        Self {
            interval_secs: defaults.interval.as_secs(),
            tick_millis: defaults.tick.as_millis() as u64,
        }
    }
}

/// One `[[accounts]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountEntry {
    pub name: Option<String>,
    pub path: String,
}

/// Where the config file comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    /// Named by `--config` or `CONFIG_PATH`; must exist.
    pub explicit: bool,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `source`, falling back to defaults when the implicit default
    /// file does not exist.
    pub fn load_from(source: &ConfigPath) -> common::Result<Self> {
        if !source.explicit && !source.path.exists() {
            return Ok(Self::default());
        }
        Self::load(&source.path)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> ConfigPath {
        if let Some(p) = cli_path {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigPath {
            path: PathBuf::from(DEFAULT_CONFIG_FILE),
            explicit: false,
        }
    }

    fn validate(&self) -> common::Result<()> {
        for (field, url) in [
            ("auth.token_url", &self.auth.token_url),
            ("usage.usage_url", &self.usage.usage_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{field} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.auth.client_id.trim().is_empty() {
            return Err(common::Error::Config("auth.client_id must not be empty".into()));
        }

        if self.auth.timeout_secs == 0 {
            return Err(common::Error::Config(
                "auth.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.usage.timeout_secs == 0 {
            return Err(common::Error::Config(
                "usage.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.poll.interval_secs == 0 {
            return Err(common::Error::Config(
                "poll.interval_secs must be greater than 0".into(),
            ));
        }

        if self.poll.tick_millis == 0 {
            return Err(common::Error::Config(
                "poll.tick_millis must be greater than 0".into(),
            ));
        }

        if Duration::from_millis(self.poll.tick_millis) > Duration::from_secs(self.poll.interval_secs)
        {
            return Err(common::Error::Config(format!(
                "poll.tick_millis ({}) must not exceed poll.interval_secs ({}s)",
                self.poll.tick_millis, self.poll.interval_secs
            )));
        }

        if let Some(entry) = self.accounts.iter().find(|a| a.path.trim().is_empty()) {
            return Err(common::Error::Config(format!(
                "account {:?} has an empty path",
                entry.name.as_deref().unwrap_or("<unnamed>")
            )));
        }

        Ok(())
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            token_url: self.auth.token_url.clone(),
            client_id: self.auth.client_id.clone(),
            scope: self.auth.scope.clone(),
            expiry_skew: Duration::from_secs(self.auth.expiry_skew_secs),
            timeout: Duration::from_secs(self.auth.timeout_secs),
        }
    }

    pub fn usage_config(&self) -> UsageConfig {
        UsageConfig {
            usage_url: self.usage.usage_url.clone(),
            timeout: Duration::from_secs(self.usage.timeout_secs),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll.interval_secs),
            tick: Duration::from_millis(self.poll.tick_millis),
        }
    }

    /// Accounts to poll, in order.
    ///
    /// Resolution order:
    /// 1. `--auth` paths from the command line
    /// 2. `[[accounts]]` from the config file
    /// 3. `$CODEX_HOME/auth.json`
    /// 4. `~/.codex/auth.json`
    ///
    /// Only the implicit locations (3, 4) are checked for existence; a named
    /// file that is missing shows up as that account's error instead.
    pub fn resolve_accounts(&self, cli_paths: &[String]) -> common::Result<Vec<AccountLocation>> {
        if !cli_paths.is_empty() {
            return Ok(cli_paths
                .iter()
                .map(|p| AccountLocation::new(p.as_str(), expand_home(p)))
                .collect());
        }

        if !self.accounts.is_empty() {
            return Ok(self
                .accounts
                .iter()
                .map(|entry| {
                    let name = entry.name.clone().unwrap_or_else(|| entry.path.clone());
                    AccountLocation::new(name, expand_home(&entry.path))
                })
                .collect());
        }

        let mut candidates = Vec::new();
        if let Ok(home) = std::env::var("CODEX_HOME")
            && !home.is_empty()
        {
            candidates.push(expand_home(&home).join("auth.json"));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".codex").join("auth.json"));
        }

        candidates
            .into_iter()
            .find(|p| p.is_file())
            .map(|p| vec![AccountLocation::new("default", p)])
            .ok_or_else(|| {
                common::Error::Config(
                    "no credential file found: pass --auth <path>, add [[accounts]] to the config, \
                     or set CODEX_HOME"
                        .into(),
                )
            })
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
