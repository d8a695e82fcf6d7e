//! Credential bundle storage
//!
//! A bundle is one account's `auth.json`. The file is treated as an opaque
//! JSON object: only the token fields and `last_refresh` are interpreted, and
//! everything else is written back untouched. Token fields live under a
//! nested `tokens` object in the Codex CLI layout; a flat layout with the
//! fields at the top level is also accepted.
//!
//! Writes use temp-file + rename so a crash mid-write never leaves a
//! truncated bundle behind. There is no locking: one process per bundle.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::token::TokenPair;

const TOKENS_KEY: &str = "tokens";
const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";
const ID_TOKEN: &str = "id_token";
const ACCOUNT_ID: &str = "account_id";
const LAST_REFRESH: &str = "last_refresh";

/// One account's credentials as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialBundle {
    raw: Map<String, Value>,
}

impl CredentialBundle {
    /// Parse a bundle from JSON text. The top level must be an object.
    pub fn from_json(contents: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(contents) {
            Ok(Value::Object(raw)) => Ok(Self { raw }),
            Ok(other) => Err(Error::CredentialParse(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
            Err(e) => Err(Error::CredentialParse(format!("parsing credential file: {e}"))),
        }
    }

    /// Pretty-printed JSON with a trailing newline, as written to disk.
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.raw)
            .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;
        json.push('\n');
        Ok(json)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.token_field(ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.token_field(REFRESH_TOKEN)
    }

    pub fn id_token(&self) -> Option<&str> {
        self.token_field(ID_TOKEN)
    }

    pub fn account_id(&self) -> Option<&str> {
        self.token_field(ACCOUNT_ID)
    }

    /// Parsed `last_refresh`; unparseable timestamps read as absent.
    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.raw
            .get(LAST_REFRESH)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The access token, or a configuration error when it is missing.
    pub fn require_access_token(&self) -> Result<&str> {
        self.access_token().ok_or_else(|| {
            Error::Configuration("credential bundle has no access_token".into())
        })
    }

    /// Fold a refresh response into the bundle and stamp `last_refresh`.
    ///
    /// `id_token` and `refresh_token` are only replaced when the token
    /// endpoint rotated them.
    pub fn apply_refresh(&mut self, tokens: &TokenPair, refreshed_at: DateTime<Utc>) {
        self.set_token_field(ACCESS_TOKEN, tokens.access_token.expose());
        if let Some(id_token) = &tokens.id_token {
            self.set_token_field(ID_TOKEN, id_token.expose());
        }
        if let Some(refresh_token) = &tokens.refresh_token {
            self.set_token_field(REFRESH_TOKEN, refresh_token.expose());
        }
        self.raw.insert(
            LAST_REFRESH.into(),
            Value::String(refreshed_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
    }

    fn token_field(&self, key: &str) -> Option<&str> {
        self.raw
            .get(TOKENS_KEY)
            .and_then(Value::as_object)
            .and_then(|tokens| tokens.get(key))
            .or_else(|| self.raw.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    fn set_token_field(&mut self, key: &str, value: &str) {
        match self.raw.get_mut(TOKENS_KEY) {
            Some(Value::Object(tokens)) => {
                tokens.insert(key.into(), Value::String(value.into()));
            }
            _ => {
                self.raw.insert(key.into(), Value::String(value.into()));
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Reads and rewrites the bundle at one location.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the bundle fresh from disk.
    ///
    /// A missing file is a configuration error: there is nothing to poll
    /// with, and retrying will not help.
    pub async fn load(&self) -> Result<CredentialBundle> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::Configuration(format!(
                    "credential file not found: {}",
                    self.path.display()
                )));
            }
            Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
        };
        let bundle = CredentialBundle::from_json(&contents)?;
        debug!(path = %self.path.display(), "loaded credential bundle");
        Ok(bundle)
    }

    /// Persist the bundle in place.
    pub async fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        write_atomic(&self.path, &bundle.to_json_pretty()?).await?;
        info!(path = %self.path.display(), "persisted refreshed credentials");
        Ok(())
    }
}

/// Write `contents` next to `path` and rename it over the target.
///
/// File permissions are 0600 on unix since the file carries OAuth tokens.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("credentials");

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, contents.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    Ok(())
}
