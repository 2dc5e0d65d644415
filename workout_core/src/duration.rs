//! Duration text formats.
//!
//! Two spellings exist in a workout block:
//! - the compact time literal (`1m 30s`, `45s`) used for countdown targets
//!   and live timer display
//! - the human form (`1 min 30 sec`) persisted into recorded durations and
//!   the workout `duration:` field
//!
//! The human form never matches the time-literal grammar, which is what lets
//! the parser tell a countdown target from an already-recorded value.

use once_cell::sync::Lazy;
use regex::Regex;

static TIME_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)m)?\s*(?:(\d+)s)?$").expect("time literal pattern is valid")
});

static HUMAN_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(\d+)\s*hr)?\s*(?:(\d+)\s*min)?\s*(?:(\d+)\s*sec)?$")
        .expect("human duration pattern is valid")
});

/// A classified duration parameter value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DurationValue {
    /// A time literal: the exercise counts down from this many seconds
    Target(u64),
    /// Any other text: elapsed time recorded when the exercise finished
    Recorded(String),
}

impl DurationValue {
    pub fn classify(value: &str) -> Self {
        match parse_time_literal(value) {
            Some(secs) => DurationValue::Target(secs),
            None => DurationValue::Recorded(value.trim().to_string()),
        }
    }
}

fn capture_u64(caps: &regex::Captures<'_>, group: usize) -> Option<Option<u64>> {
    match caps.get(group) {
        Some(m) => m.as_str().parse::<u64>().ok().map(Some),
        None => Some(None),
    }
}

/// Parse a compact time literal (`11m 33s`, `45s`, `2m`) into seconds
///
/// At least one component must be present. Returns `None` for anything else,
/// including values too large for `u64`.
pub fn parse_time_literal(text: &str) -> Option<u64> {
    let text = text.trim();
    let caps = TIME_LITERAL.captures(text)?;
    let minutes = capture_u64(&caps, 1)?;
    let seconds = capture_u64(&caps, 2)?;

    if minutes.is_none() && seconds.is_none() {
        return None;
    }

    minutes
        .unwrap_or(0)
        .checked_mul(60)?
        .checked_add(seconds.unwrap_or(0))
}

fn parse_human(text: &str) -> Option<u64> {
    let caps = HUMAN_DURATION.captures(text)?;
    let hours = capture_u64(&caps, 1)?;
    let minutes = capture_u64(&caps, 2)?;
    let seconds = capture_u64(&caps, 3)?;

    if hours.is_none() && minutes.is_none() && seconds.is_none() {
        return None;
    }

    hours
        .unwrap_or(0)
        .checked_mul(3600)?
        .checked_add(minutes.unwrap_or(0).checked_mul(60)?)?
        .checked_add(seconds.unwrap_or(0))
}

/// Parse either duration spelling into seconds
pub fn parse_duration(text: &str) -> Option<u64> {
    let text = text.trim();
    parse_time_literal(text).or_else(|| parse_human(text))
}

/// Compact form: `1m 30s`, `45s`, `0s` (minutes only when non-zero)
pub fn format_duration(secs: u64) -> String {
    let minutes = secs / 60;
    let seconds = secs % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Compact form with a sign, for countdowns that ran into overtime
pub fn format_signed_duration(secs: i64) -> String {
    let formatted = format_duration(secs.unsigned_abs());
    if secs < 0 {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

/// Human form: `1 hr 2 min 5 sec`, `45 sec`, `0 sec`
///
/// Zero components are dropped; seconds are kept when nothing else remains.
pub fn format_duration_human(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    let mut parts = Vec::with_capacity(3);
    if hours > 0 {
        parts.push(format!("{} hr", hours));
    }
    if minutes > 0 {
        parts.push(format!("{} min", minutes));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{} sec", seconds));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_literal_forms() {
        assert_eq!(parse_time_literal("11m 33s"), Some(693));
        assert_eq!(parse_time_literal("45s"), Some(45));
        assert_eq!(parse_time_literal("2m"), Some(120));
        assert_eq!(parse_time_literal("1m30s"), Some(90));
        assert_eq!(parse_time_literal("  90s "), Some(90));
        assert_eq!(parse_time_literal("0s"), Some(0));
    }

    #[test]
    fn test_parse_time_literal_rejects_other_text() {
        assert_eq!(parse_time_literal(""), None);
        assert_eq!(parse_time_literal("   "), None);
        assert_eq!(parse_time_literal("1 min 30 sec"), None);
        assert_eq!(parse_time_literal("90"), None);
        assert_eq!(parse_time_literal("1h"), None);
        assert_eq!(parse_time_literal("30s 1m"), None);
        assert_eq!(parse_time_literal("99999999999999999999s"), None);
    }

    #[test]
    fn test_format_duration_examples() {
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(120), "2m 0s");
        assert_eq!(format_duration(3725), "62m 5s");
    }

    #[test]
    fn test_format_duration_human_examples() {
        assert_eq!(format_duration_human(0), "0 sec");
        assert_eq!(format_duration_human(45), "45 sec");
        assert_eq!(format_duration_human(90), "1 min 30 sec");
        assert_eq!(format_duration_human(120), "2 min");
        assert_eq!(format_duration_human(3725), "1 hr 2 min 5 sec");
        assert_eq!(format_duration_human(3600), "1 hr");
    }

    #[test]
    fn test_human_form_is_never_a_time_literal() {
        for secs in [0, 1, 59, 60, 61, 3599, 3600, 7322] {
            let human = format_duration_human(secs);
            assert_eq!(parse_time_literal(&human), None, "{}", human);
            assert_eq!(parse_duration(&human), Some(secs), "{}", human);
        }
    }

    #[test]
    fn test_classify_duration_values() {
        assert_eq!(DurationValue::classify("1m 30s"), DurationValue::Target(90));
        assert_eq!(
            DurationValue::classify("1 min 32 sec"),
            DurationValue::Recorded("1 min 32 sec".into())
        );
    }

    #[test]
    fn test_signed_duration() {
        assert_eq!(format_signed_duration(75), "1m 15s");
        assert_eq!(format_signed_duration(-12), "-12s");
        assert_eq!(format_signed_duration(0), "0s");
    }
}
