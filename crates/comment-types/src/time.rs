use chrono::{DateTime, Utc};

/// Human-readable distance between `then` and `now`, e.g. "5m ago".
///
/// Anything older than a week falls back to an absolute date ("Mar 4, 2025").
/// Timestamps in the future read as "just now".
pub fn format_relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let minutes = secs / 60;
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{}d ago", days);
    }
    then.format("%b %-d, %Y").to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_recent_timestamps() {
        let now = now();
        assert_eq!(format_relative_time(now, now), "just now");
        assert_eq!(format_relative_time(now - Duration::seconds(59), now), "just now");
        assert_eq!(format_relative_time(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_relative_time(now - Duration::days(6), now), "6d ago");
    }

    #[test]
    fn test_future_timestamp_reads_as_just_now() {
        let now = now();
        assert_eq!(format_relative_time(now + Duration::hours(1), now), "just now");
    }

    #[test]
    fn test_old_timestamps_use_absolute_date() {
        let then = Utc.with_ymd_and_hms(2025, 3, 4, 9, 30, 0).unwrap();
        assert_eq!(format_relative_time(then, now()), "Mar 4, 2025");
    }
}
