//! Unverified JWT payload decoding
//!
//! Reads claims out of access and id tokens without checking signatures.
//! The remote service is the authority on token validity; this module only
//! needs `exp` for the staleness check and a few identity claims for display.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::constants::{AUTH_CLAIMS_KEY, PROFILE_CLAIMS_KEY};
use crate::error::{Error, Result};

/// Identity claims pulled from an id token. Every field is best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub email: Option<String>,
    pub account_id: Option<String>,
    pub plan_type: Option<String>,
}

/// Decode the payload segment of a `header.payload.signature` token.
///
/// Returns `Ok(None)` when the token has fewer than two segments. Returns
/// `Err(TokenDecode)` when the payload is not valid base64 or not JSON.
pub fn decode_payload(token: &str) -> Result<Option<Value>> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload)) = (segments.next(), segments.next()) else {
        return Ok(None);
    };

    let bytes = decode_segment(payload)?;
    let claims = serde_json::from_slice(&bytes)
        .map_err(|e| Error::TokenDecode(format!("payload is not JSON: {e}")))?;
    Ok(Some(claims))
}

/// base64url → standard alphabet, re-pad, decode.
fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    let mut standard: String = segment
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while standard.len() % 4 != 0 {
        standard.push('=');
    }

    STANDARD
        .decode(standard.as_bytes())
        .map_err(|e| Error::TokenDecode(format!("payload is not base64url: {e}")))
}

/// The numeric `exp` claim of a token, in unix seconds.
pub fn expiry(token: &str) -> Option<i64> {
    let claims = match decode_payload(token) {
        Ok(Some(claims)) => claims,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "access token payload undecodable, skipping expiry check");
            return None;
        }
    };

    let exp = claims.get("exp")?;
    exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))
}

/// Whether an access token should be refreshed before use.
///
/// A token without a readable `exp` is never stale: the remote call decides.
pub fn is_stale(access_token: &str, now: DateTime<Utc>, skew: Duration) -> bool {
    match expiry(access_token) {
        Some(exp) => now.timestamp() >= exp.saturating_sub(skew.as_secs() as i64),
        None => false,
    }
}

/// Decode identity claims from an id token, logging and returning an empty
/// identity when the token cannot be read.
pub fn decode_identity(id_token: &str) -> Identity {
    match decode_payload(id_token) {
        Ok(Some(claims)) => identity_from_claims(&claims),
        Ok(None) => Identity::default(),
        Err(e) => {
            warn!(error = %e, "failed to decode id token, identity unavailable");
            Identity::default()
        }
    }
}

/// Extract identity fields from decoded id token claims.
pub fn identity_from_claims(claims: &Value) -> Identity {
    let auth = claims.get(AUTH_CLAIMS_KEY);
    let email = claim_str(claims.get("email")).or_else(|| {
        claims
            .get(PROFILE_CLAIMS_KEY)
            .and_then(|profile| claim_str(profile.get("email")))
    });

    Identity {
        email,
        account_id: auth.and_then(|a| claim_str(a.get("chatgpt_account_id"))),
        plan_type: auth.and_then(|a| claim_str(a.get("chatgpt_plan_type"))),
    }
}

fn claim_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}
