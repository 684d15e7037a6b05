use chrono::{DateTime, TimeDelta, Utc};

/// Generates a random ID.
pub fn random_id() -> u32 {
    rand::random()
}

/// Mean of a list of time deltas, `None` when empty.
pub fn mean_duration(total: TimeDelta, count: usize) -> Option<TimeDelta> {
    if count == 0 {
        return None;
    }
    let count = i32::try_from(count).ok()?;
    Some(total / count)
}

/// Human-readable span between two instants, e.g. `3088 days 01:00:00`.
pub fn format_duration(delta: TimeDelta) -> String {
    let sign = if delta < TimeDelta::zero() { "-" } else { "" };
    let delta = delta.abs();
    let days = delta.num_days();
    let secs = delta.num_seconds() - days * 86_400;
    format!(
        "{sign}{days} days {:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Formats a timestamp the way the statistics table prints it.
pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
#[test]
fn mean_of_durations() {
    assert_eq!(mean_duration(TimeDelta::days(10), 4), Some(TimeDelta::hours(60)));
    assert_eq!(mean_duration(TimeDelta::days(10), 0), None);
}

#[cfg(test)]
#[test]
fn duration_formatting() {
    let delta = TimeDelta::days(3088) + TimeDelta::hours(1);
    assert_eq!(format_duration(delta), "3088 days 01:00:00");
    assert_eq!(format_duration(-TimeDelta::minutes(90)), "-0 days 01:30:00");
}
