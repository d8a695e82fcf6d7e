//! Codex usage monitor
//!
//! Single-binary CLI that:
//! 1. Resolves the Codex credential files to watch
//! 2. Refreshes expired access tokens and writes them back
//! 3. Fetches rate-limit usage for each account
//! 4. Prints the result once, or redraws it every interval with `--watch`

mod config;
mod keyboard;
mod render;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use codex_auth::RefreshClient;
use codex_poll::{AccountResult, AccountSession, PollState, Poller, UsageClient};
use crossterm::{cursor, terminal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;
const EXIT_CANCELLED: u8 = 130;

/// Parsed command line
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    config: Option<String>,
    auth: Vec<String>,
    watch: bool,
    json: bool,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self> {
        let mut parsed = Args::default();
        let mut iter = args.iter().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--config" => {
                    parsed.config = Some(iter.next().context("--config needs a path")?.clone());
                }
                "--auth" => {
                    parsed.auth.push(iter.next().context("--auth needs a path")?.clone());
                }
                "--watch" => parsed.watch = true,
                "--json" => parsed.json = true,
                other => anyhow::bail!(
                    "unknown argument: {other} (usage: codex-usage-monitor [--config <path>] \
                     [--auth <path>]... [--watch] [--json])"
                ),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let args = Args::parse(&args)?;

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.path.display(), explicit = config_path.explicit, "loading configuration");
    let config = Config::load_from(&config_path).with_context(|| {
        format!("failed to load config from {}", config_path.path.display())
    })?;

    let accounts = config
        .resolve_accounts(&args.auth)
        .context("failed to resolve accounts")?;
    info!(
        accounts = accounts.len(),
        usage_url = %config.usage.usage_url,
        watch = args.watch,
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let session = AccountSession::new(
        RefreshClient::new(http.clone(), config.auth_config()),
        UsageClient::new(http, config.usage_config()),
    );
    let poller = Poller::new(Arc::new(session), accounts, config.poll_config());

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let status = if args.watch {
        watch(&poller, &cancel, args.json).await?
    } else {
        once(&poller, &cancel, args.json, &mut std::io::stdout()).await?
    };
    Ok(ExitCode::from(status))
}

/// Tracing goes to stderr so stdout carries only the rendered view.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Single pass written to `out`. Exit status is 1 when any account failed,
/// 130 when cancelled.
async fn once(
    poller: &Poller,
    cancel: &CancellationToken,
    json: bool,
    out: &mut impl Write,
) -> Result<u8> {
    let results = match poller.poll_once(cancel).await {
        Ok(results) => results,
        Err(e) if e.is_cancelled() => {
            info!("cancelled before the pass completed");
            return Ok(EXIT_CANCELLED);
        }
        Err(e) => return Err(e).context("poll failed"),
    };

    let output = if json {
        render::render_json(&results).context("failed to serialize results")? + "\n"
    } else {
        render::render_cards(&results, Utc::now())
    };
    out.write_all(output.as_bytes())?;
    out.flush()?;

    Ok(if results.iter().any(|r| r.error.is_some()) {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    })
}

/// Repeating mode until cancelled by a quit key, a signal, or a failure.
async fn watch(poller: &Poller, cancel: &CancellationToken, json: bool) -> Result<u8> {
    // JSON output is for pipes; only the interactive view takes the keyboard.
    let raw_mode = if json {
        None
    } else {
        match keyboard::RawModeGuard::enable() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(error = %e, "raw mode unavailable, quit with Ctrl+C");
                None
            }
        }
    };
    let listener = raw_mode
        .as_ref()
        .map(|_| keyboard::spawn_quit_listener(cancel.clone()));
    let raw = raw_mode.is_some();

    let state = poller
        .run(cancel, |results| present_pass(results, json, raw))
        .await;

    // Release the listener before leaving raw mode
    cancel.cancel();
    if let Some(listener) = listener {
        let _ = listener.await;
    }
    drop(raw_mode);

    match state {
        PollState::Error(e) => {
            eprintln!("codex-usage-monitor: {e}");
            Ok(EXIT_FAILURE)
        }
        _ => Ok(EXIT_SUCCESS),
    }
}

fn present_pass(results: &[AccountResult], json: bool, raw: bool) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    if json {
        let line = serde_json::to_string(results)?;
        writeln!(stdout, "{line}")?;
    } else {
        let frame = render::render_frame(results, Utc::now());
        let frame = if raw {
            render::raw_line_endings(&frame)
        } else {
            frame
        };
        crossterm::queue!(
            stdout,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        stdout.write_all(frame.as_bytes())?;
    }
    stdout.flush()
}

/// Cancel on SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = ctrl_c => info!("received SIGINT, stopping"),
        _ = terminate => info!("received SIGTERM, stopping"),
    }
    cancel.cancel();
}
