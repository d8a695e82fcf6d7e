//! Poll scheduler
//!
//! Pure state machine plus a driver. `handle_event` receives events and
//! returns `(new_state, action)`; `Poller::run` executes the waiting and
//! polling each action implies.
//!
//! The cadence is measured between the starts of successive passes, so a
//! slow pass does not push every later pass back. Waits are split into
//! ticks no longer than `PollConfig::tick`, each raced against the
//! cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::PollConfig;
use crate::error::{Error, Result};
use crate::session::{AccountLocation, AccountResult, UsageSource};

/// Scheduler states. `Cancelled` and `Error` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Running {
        /// Start of the most recent pass
        last_pass: Option<Instant>,
    },
    Cancelled,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// Repeating mode requested
    Start,
    /// A pass is about to begin
    PassStarted { at: Instant },
    /// A wait step or a pass finished; time to decide what is next
    Tick { now: Instant },
    /// A pass or its consumer failed for a reason other than cancellation
    PassFailed(String),
    /// Cancellation token tripped
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    RunPass,
    Sleep(Duration),
    Stop,
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(
    state: PollState,
    event: PollEvent,
    config: &PollConfig,
) -> (PollState, PollAction) {
    match (state, event) {
        // Terminal states absorb everything
        (PollState::Cancelled, _) => (PollState::Cancelled, PollAction::Stop),
        (PollState::Error(e), _) => (PollState::Error(e), PollAction::Stop),

        (_, PollEvent::Cancel) => (PollState::Cancelled, PollAction::Stop),

        (PollState::Idle, PollEvent::Start) => (
            PollState::Running { last_pass: None },
            PollAction::RunPass,
        ),
        (PollState::Idle, _) => (PollState::Idle, PollAction::None),

        (PollState::Running { .. }, PollEvent::PassStarted { at }) => (
            PollState::Running {
                last_pass: Some(at),
            },
            PollAction::None,
        ),

        (PollState::Running { .. }, PollEvent::PassFailed(e)) => {
            (PollState::Error(e), PollAction::Stop)
        }

        (PollState::Running { last_pass: None }, PollEvent::Tick { .. }) => (
            PollState::Running { last_pass: None },
            PollAction::RunPass,
        ),

        (PollState::Running { last_pass: Some(last) }, PollEvent::Tick { now }) => {
            let elapsed = now.saturating_duration_since(last);
            let remaining = config.interval.saturating_sub(elapsed);
            let action = if remaining.is_zero() {
                PollAction::RunPass
            } else {
                PollAction::Sleep(remaining.min(config.tick))
            };
            (
                PollState::Running {
                    last_pass: Some(last),
                },
                action,
            )
        }

        (state @ PollState::Running { .. }, PollEvent::Start) => (state, PollAction::None),
    }
}

/// Drives passes over the configured accounts.
pub struct Poller {
    source: Arc<dyn UsageSource>,
    accounts: Vec<AccountLocation>,
    config: PollConfig,
}

impl Poller {
    pub fn new(
        source: Arc<dyn UsageSource>,
        accounts: Vec<AccountLocation>,
        config: PollConfig,
    ) -> Self {
        Self {
            source,
            accounts,
            config,
        }
    }

    /// Poll every account once, in configuration order.
    ///
    /// Per-account failures are inside the returned results. `Err` means
    /// the pass was cancelled.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<Vec<AccountResult>> {
        let mut results = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            results.push(self.source.poll_account(account, cancel).await?);
        }
        Ok(results)
    }

    /// Poll repeatedly until cancelled or until `on_pass` fails.
    ///
    /// `on_pass` receives each completed pass (typically the presenter).
    /// Returns the terminal state: `Cancelled` after a cancellation,
    /// `Error` after a pass or presenter failure (logged here).
    pub async fn run<F, E>(&self, cancel: &CancellationToken, mut on_pass: F) -> PollState
    where
        F: FnMut(&[AccountResult]) -> std::result::Result<(), E>,
        E: std::fmt::Display,
    {
        let config = self.config;
        let (mut state, mut action) = handle_event(PollState::Idle, PollEvent::Start, &config);
        info!(
            accounts = self.accounts.len(),
            interval_secs = config.interval.as_secs(),
            "polling started"
        );

        loop {
            match action {
                PollAction::RunPass => {
                    let started = Instant::now();
                    (state, _) = handle_event(state, PollEvent::PassStarted { at: started }, &config);
                    debug!("pass started");

                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(Error::Cancelled),
                        results = self.poll_once(cancel) => results,
                    };
                    let event = match outcome {
                        Ok(results) => match on_pass(&results) {
                            Ok(()) => PollEvent::Tick { now: Instant::now() },
                            Err(e) => PollEvent::PassFailed(e.to_string()),
                        },
                        Err(Error::Cancelled) => PollEvent::Cancel,
                        Err(e) => PollEvent::PassFailed(e.to_string()),
                    };
                    (state, action) = handle_event(state, event, &config);
                }
                PollAction::Sleep(step) => {
                    let event = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => PollEvent::Cancel,
                        _ = tokio::time::sleep(step) => PollEvent::Tick { now: Instant::now() },
                    };
                    (state, action) = handle_event(state, event, &config);
                }
                PollAction::None => {
                    (state, action) =
                        handle_event(state, PollEvent::Tick { now: Instant::now() }, &config);
                }
                PollAction::Stop => break,
            }
        }

        match &state {
            PollState::Error(e) => error!(error = %e, "polling stopped after failure"),
            _ => info!("polling cancelled"),
        }
        state
    }
}
