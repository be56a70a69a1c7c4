use chrono::{DateTime, Utc};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

/// A start in the future counts as zero, so the result never drops below `total_seconds`.
pub fn calculate_total_time(
    total_seconds: u64,
    currently_active: bool,
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> u64 {
    let Some(started_at) = started_at.filter(|_| currently_active) else {
        return total_seconds;
    };
    total_seconds.saturating_add(whole_seconds_between(started_at, now))
}

pub fn whole_seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    let millis = (to - from).num_milliseconds().max(0);
    (millis / 1000) as u64
}

pub fn format_time_tracking(
    total_seconds: u64,
    currently_active: bool,
    started_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    let seconds = calculate_total_time(total_seconds, currently_active, started_at, now);
    let hours = seconds / SECONDS_PER_HOUR;
    let minutes = (seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    format!("{hours}:{minutes:02}")
}

pub fn format_duration_verbose(seconds: u64) -> String {
    let days = seconds / SECONDS_PER_DAY;
    let hours = (seconds % SECONDS_PER_DAY) / SECONDS_PER_HOUR;
    let minutes = (seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
