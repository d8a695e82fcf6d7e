//! Plain-text and JSON presentation of poll results
//!
//! Everything here is a pure function of the results and the current time;
//! writing to the terminal happens in `main`.

use chrono::{DateTime, Utc};
use codex_poll::{AccountResult, WindowStatus};

const BAR_WIDTH: usize = 20;
const MAX_ERROR_CHARS: usize = 200;

pub const QUIT_HINT: &str = "press q, Esc or Ctrl+C to quit";

/// One card per account, separated by a blank line.
pub fn render_cards(results: &[AccountResult], now: DateTime<Utc>) -> String {
    results
        .iter()
        .map(|r| render_card(r, now))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full watch-mode frame: cards, update time and quit hint.
pub fn render_frame(results: &[AccountResult], now: DateTime<Utc>) -> String {
    let mut out = render_cards(results, now);
    out.push_str(&format!(
        "\nupdated {}  ({QUIT_HINT})\n",
        now.format("%H:%M:%S UTC")
    ));
    out
}

pub fn render_json(results: &[AccountResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}

/// Raw mode does not translate `\n`, so every line needs its own `\r`.
pub fn raw_line_endings(text: &str) -> String {
    text.replace('\n', "\r\n")
}

fn render_card(result: &AccountResult, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();

    let title = match &result.email {
        Some(email) => format!("== {} ({email}) ==", result.name),
        None => format!("== {} ==", result.name),
    };
    lines.push(title);

    if let Some(error) = &result.error {
        lines.push(format!("error: {}", truncate(error, MAX_ERROR_CHARS)));
        return lines.join("\n") + "\n";
    }

    let mut facts = Vec::new();
    if let Some(plan) = &result.plan_type {
        facts.push(format!("plan: {plan}"));
    }
    if let Some(account) = &result.account_id {
        facts.push(format!("account: {account}"));
    }
    if !facts.is_empty() {
        lines.push(facts.join("   "));
    }

    if result.limit_reached == Some(true) || result.allowed == Some(false) {
        lines.push("status: LIMIT REACHED".to_string());
    }

    for (fallback, window) in [("primary", &result.primary), ("secondary", &result.secondary)] {
        if let Some(window) = window {
            lines.push(render_window(fallback, window, now));
        }
    }

    if let Some(refreshed) = result.last_refresh {
        lines.push(format!("token refreshed {}", relative(refreshed, now)));
    }

    lines.join("\n") + "\n"
}

fn render_window(fallback: &str, window: &WindowStatus, now: DateTime<Utc>) -> String {
    let label = window.label.as_deref().unwrap_or(fallback);
    let mut line = format!(
        "{label:<9} [{}] {:>3.0}% used, {:.0}% left",
        bar(window.used_percent, BAR_WIDTH),
        window.used_percent,
        window.remaining_percent(),
    );
    if let Some(resets_at) = window.resets_at {
        line.push_str(&format!("  resets {}", relative(resets_at, now)));
    }
    line
}

/// Filled share of `width` cells; out-of-range percentages clamp for
/// drawing only.
pub fn bar(used_percent: f64, width: usize) -> String {
    let clamped = used_percent.clamp(0.0, 100.0);
    let filled = ((clamped / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "#".repeat(filled), "-".repeat(width - filled))
}

/// `in 2h 5m`, `3m ago`, or `now` for anything under a minute away.
pub fn relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = at.signed_duration_since(now);
    let secs = delta.num_seconds();
    if secs.abs() < 60 {
        return "now".to_string();
    }
    let span = compact_duration(secs.unsigned_abs());
    if secs > 0 {
        format!("in {span}")
    } else {
        format!("{span} ago")
    }
}

fn compact_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    match (days, hours) {
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h"),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    fn ok_result() -> AccountResult {
        AccountResult {
            name: "work".into(),
            email: Some("dev@example.com".into()),
            account_id: Some("acct-1".into()),
            plan_type: Some("plus".into()),
            allowed: Some(true),
            limit_reached: Some(false),
            primary: Some(WindowStatus {
                used_percent: 25.0,
                label: Some("5h".into()),
                resets_at: Some(now() + Duration::minutes(125)),
            }),
            secondary: Some(WindowStatus {
                used_percent: 40.0,
                label: Some("weekly".into()),
                resets_at: Some(now() + Duration::days(3) + Duration::hours(4)),
            }),
            fetched_at: now(),
            last_refresh: None,
            error: None,
        }
    }

    #[test]
    fn card_shows_identity_and_windows() {
        let card = render_cards(&[ok_result()], now());
        assert!(card.starts_with("== work (dev@example.com) =="));
        assert!(card.contains("plan: plus   account: acct-1"));
        assert!(card.contains("5h        [#####---------------]  25% used, 75% left  resets in 2h 5m"));
        assert!(card.contains("weekly"));
        assert!(card.contains("resets in 3d 4h"));
        assert!(!card.contains("LIMIT"));
    }

    #[test]
    fn error_card_hides_usage_fields() {
        let mut result = ok_result();
        result.error = Some("remote returned 401: {\"detail\":\"expired\"}".into());
        let card = render_cards(&[result], now());
        assert!(card.contains("error: remote returned 401"));
        assert!(!card.contains("plan:"));
        assert!(!card.contains("used"));
    }

    #[test]
    fn long_errors_are_truncated_to_one_line() {
        let mut result = ok_result();
        result.error = Some(format!("line one\n{}", "x".repeat(500)));
        let card = render_cards(&[result], now());
        let error_line = card.lines().find(|l| l.starts_with("error:")).unwrap();
        assert!(error_line.ends_with("..."));
        assert!(error_line.contains("line one x"));
    }

    #[test]
    fn limit_reached_is_flagged() {
        let mut result = ok_result();
        result.limit_reached = Some(true);
        assert!(render_cards(&[result], now()).contains("status: LIMIT REACHED"));
    }

    #[test]
    fn window_without_label_uses_position() {
        let mut result = ok_result();
        result.primary.as_mut().unwrap().label = None;
        result.secondary = None;
        let card = render_cards(&[result], now());
        assert!(card.contains("primary   ["));
    }

    #[test]
    fn over_limit_percent_is_shown_but_bar_clamped() {
        assert_eq!(bar(130.0, 10), "##########");
        assert_eq!(bar(-5.0, 4), "----");
        assert_eq!(bar(50.0, 4), "##--");
    }

    #[test]
    fn relative_times() {
        assert_eq!(relative(now() + Duration::seconds(30), now()), "now");
        assert_eq!(relative(now() + Duration::minutes(5), now()), "in 5m");
        assert_eq!(relative(now() - Duration::minutes(90), now()), "1h 30m ago");
        assert_eq!(relative(now() + Duration::days(2), now()), "in 2d 0h");
    }

    #[test]
    fn frame_ends_with_quit_hint() {
        let frame = render_frame(&[ok_result()], now());
        assert!(frame.contains("updated 12:00:00 UTC"));
        assert!(frame.trim_end().ends_with(&format!("({QUIT_HINT})")));
    }

    #[test]
    fn raw_mode_line_endings() {
        assert_eq!(raw_line_endings("a\nb\n"), "a\r\nb\r\n");
    }

    #[test]
    fn json_output_uses_rfc3339_and_omits_empty_error() {
        let json = render_json(&[ok_result()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["name"], "work");
        assert_eq!(value[0]["fetched_at"], "2026-01-01T12:00:00Z");
        assert_eq!(value[0]["primary"]["used_percent"], 25.0);
        assert!(value[0].get("error").is_none());
    }
}
