//! In-process token and usage endpoints for tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use codex_auth::{AuthConfig, RefreshClient};

use crate::config::UsageConfig;
use crate::session::{AccountLocation, AccountSession};
use crate::usage::UsageClient;

/// Unsigned token whose payload is `claims`.
pub(crate) fn make_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{header}.{payload}.sig")
}

/// Access token expiring `offset_secs` from now (negative = already expired).
pub(crate) fn token_expiring_in(label: &str, offset_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    make_token(&json!({"exp": exp, "jti": label}))
}

pub(crate) fn id_token(email: &str, account_id: &str, plan: &str) -> String {
    make_token(&json!({
        "email": email,
        "https://api.openai.com/auth": {
            "chatgpt_account_id": account_id,
            "chatgpt_plan_type": plan
        }
    }))
}

pub(crate) fn usage_body(primary_used: f64) -> Value {
    json!({
        "plan_type": "plus",
        "rate_limit": {
            "allowed": true,
            "limit_reached": false,
            "primary_window": {
                "used_percent": primary_used,
                "limit_window_seconds": 18000,
                "reset_at": 1767225600
            },
            "secondary_window": {
                "used_percent": 40.0,
                "limit_window_seconds": 604800,
                "reset_at": 1767830400
            }
        }
    })
}

/// Write `bundle` as `<dir>/<name>.json` and return its location.
pub(crate) async fn write_bundle(dir: &Path, name: &str, bundle: &Value) -> AccountLocation {
    let path = dir.join(format!("{name}.json"));
    tokio::fs::write(&path, serde_json::to_string_pretty(bundle).unwrap())
        .await
        .unwrap();
    AccountLocation::new(name, path)
}

/// URL of a listener that accepts connections and never answers.
pub(crate) async fn silent_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/oauth/token")
}

#[derive(Clone)]
struct MockState {
    /// Bearer tokens the usage endpoint accepts; `None` accepts any.
    accepted: Arc<Mutex<Option<Vec<String>>>>,
    refresh_response: Arc<Mutex<(StatusCode, Value)>>,
    usage_response: Arc<Mutex<Value>>,
    usage_delay: Arc<Mutex<Duration>>,
    refresh_calls: Arc<AtomicUsize>,
    usage_calls: Arc<AtomicUsize>,
    refresh_requests: Arc<Mutex<Vec<Value>>>,
    bearer_tokens: Arc<Mutex<Vec<String>>>,
    account_headers: Arc<Mutex<Vec<Option<String>>>>,
}

pub(crate) struct MockBackend {
    base_url: String,
    state: MockState,
}

async fn token_handler(
    State(state): State<MockState>,
    Json(request): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);
    state.refresh_requests.lock().unwrap().push(request);
    let (status, body) = state.refresh_response.lock().unwrap().clone();
    (status, Json(body))
}

async fn usage_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.usage_calls.fetch_add(1, Ordering::SeqCst);
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    let account = headers
        .get("chatgpt-account-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.bearer_tokens.lock().unwrap().push(bearer.clone());
    state.account_headers.lock().unwrap().push(account);

    let delay = *state.usage_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let allowed = match &*state.accepted.lock().unwrap() {
        Some(tokens) => tokens.contains(&bearer),
        None => true,
    };
    if !allowed {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "token expired"})),
        );
    }
    (StatusCode::OK, Json(state.usage_response.lock().unwrap().clone()))
}

impl MockBackend {
    /// Serve both endpoints on an ephemeral port. By default every bearer
    /// token is accepted and refreshes hand out `at_refreshed`.
    pub(crate) async fn start() -> Self {
        let state = MockState {
            accepted: Arc::new(Mutex::new(None)),
            refresh_response: Arc::new(Mutex::new((
                StatusCode::OK,
                json!({"access_token": "at_refreshed", "refresh_token": "rt_rotated"}),
            ))),
            usage_response: Arc::new(Mutex::new(usage_body(15.0))),
            usage_delay: Arc::new(Mutex::new(Duration::ZERO)),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            usage_calls: Arc::new(AtomicUsize::new(0)),
            refresh_requests: Arc::new(Mutex::new(Vec::new())),
            bearer_tokens: Arc::new(Mutex::new(Vec::new())),
            account_headers: Arc::new(Mutex::new(Vec::new())),
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route("/oauth/token", post(token_handler))
            .route("/backend-api/wham/usage", get(usage_handler))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub(crate) fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            token_url: format!("{}/oauth/token", self.base_url),
            ..AuthConfig::default()
        }
    }

    pub(crate) fn usage_client(&self) -> UsageClient {
        UsageClient::new(
            reqwest::Client::new(),
            UsageConfig {
                usage_url: format!("{}/backend-api/wham/usage", self.base_url),
                ..UsageConfig::default()
            },
        )
    }

    pub(crate) fn session(&self) -> AccountSession {
        AccountSession::new(
            RefreshClient::new(reqwest::Client::new(), self.auth_config()),
            self.usage_client(),
        )
    }

    pub(crate) fn accept_only(&self, tokens: &[&str]) {
        *self.state.accepted.lock().unwrap() =
            Some(tokens.iter().map(|t| t.to_string()).collect());
    }

    pub(crate) fn set_refresh_response(&self, status: StatusCode, body: Value) {
        *self.state.refresh_response.lock().unwrap() = (status, body);
    }

    pub(crate) fn set_usage_delay(&self, delay: Duration) {
        *self.state.usage_delay.lock().unwrap() = delay;
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn usage_calls(&self) -> usize {
        self.state.usage_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_requests(&self) -> Vec<Value> {
        self.state.refresh_requests.lock().unwrap().clone()
    }

    pub(crate) fn bearer_tokens(&self) -> Vec<String> {
        self.state.bearer_tokens.lock().unwrap().clone()
    }

    pub(crate) fn account_headers(&self) -> Vec<Option<String>> {
        self.state.account_headers.lock().unwrap().clone()
    }
}
