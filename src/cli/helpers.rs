//! Shared helper functions for CLI commands.

use console::{style, StyledObject};

use crate::models::IngestionOutcome;

/// Format milliseconds for display.
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

/// Outcome colored by severity.
pub fn styled_outcome(outcome: IngestionOutcome) -> StyledObject<&'static str> {
    let text = outcome.as_str();
    match outcome {
        IngestionOutcome::Success => style(text).green(),
        IngestionOutcome::Partial | IngestionOutcome::InProgress => style(text).yellow(),
        IngestionOutcome::Blocked | IngestionOutcome::Error => style(text).red(),
    }
}

/// Shorten a string to `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
