//! Rate window labels and display values

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::usage::RateWindow;

const HOUR_SECS: u64 = 60 * 60;
const DAY_SECS: u64 = 24 * HOUR_SECS;
const WEEK_SECS: u64 = 7 * DAY_SECS;
const MONTH_SECS: u64 = 30 * DAY_SECS;

/// Human label for a window length.
///
/// Up to a day the label is the length in whole hours (rounded, never below
/// `1h`); beyond that it is `weekly`, `monthly` or `annual`. Boundaries are
/// inclusive on the shorter label.
pub fn window_label(limit_window_seconds: u64) -> String {
    if limit_window_seconds <= DAY_SECS {
        let hours = (limit_window_seconds as f64 / HOUR_SECS as f64).round().max(1.0);
        format!("{}h", hours as u64)
    } else if limit_window_seconds <= WEEK_SECS {
        "weekly".to_string()
    } else if limit_window_seconds <= MONTH_SECS {
        "monthly".to_string()
    } else {
        "annual".to_string()
    }
}

/// One rate window as handed to the presenter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStatus {
    /// As reported by the server; never clamped.
    pub used_percent: f64,
    pub label: Option<String>,
    pub resets_at: Option<DateTime<Utc>>,
}

impl WindowStatus {
    pub fn from_window(window: &RateWindow) -> Self {
        Self {
            used_percent: window.used_percent,
            label: window.limit_window_seconds.map(window_label),
            resets_at: window
                .reset_at
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
        }
    }

    pub fn remaining_percent(&self) -> f64 {
        (100.0 - self.used_percent).max(0.0)
    }
}
