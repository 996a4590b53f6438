//! Short human phrasing for timestamps in status lines.
//!
//! Both functions take `now` so output is deterministic in tests.

use chrono::{DateTime, TimeDelta, Utc};

/// Largest whole unit in `delta`, e.g. `(3, "hour")`. `delta` must be
/// non-negative.
fn largest_unit(delta: TimeDelta) -> (i64, &'static str) {
    match (delta.num_days(), delta.num_hours(), delta.num_minutes()) {
        (d, _, _) if d > 0 => (d, "day"),
        (_, h, _) if h > 0 => (h, "hour"),
        (_, _, m) if m > 0 => (m, "minute"),
        _ => (delta.num_seconds(), "second"),
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// Time left until `target`, e.g. `in 3h 20m`, `in 45s`, `in 2 days`.
#[must_use]
pub fn format_countdown(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let left = target - now;
    if left <= TimeDelta::zero() {
        return "now".to_string();
    }

    let minutes = left.num_minutes() % 60;
    match largest_unit(left) {
        (days, "day") if left.num_hours() > 24 => format!("in {}", plural(days, "day")),
        _ if left.num_hours() > 0 => format!("in {}h {minutes}m", left.num_hours()),
        (m, "minute") => format!("in {m}m"),
        (s, _) => format!("in {s}s"),
    }
}

/// Distance between `target` and `now`, e.g. `5 minutes ago`.
#[must_use]
pub fn format_relative_time(target: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now - target;
    if delta.num_seconds().abs() < 60 {
        return "just now".to_string();
    }

    let (magnitude, direction) = if delta > TimeDelta::zero() {
        (delta, "ago")
    } else {
        (-delta, "from now")
    };
    let (count, unit) = largest_unit(magnitude);
    format!("{} {direction}", plural(count, unit))
}
