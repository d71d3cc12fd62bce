use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

/// Human-readable uptime: "3d 4h", "5h 12m", "42m", "< 1m".
pub fn humanize_uptime(delta: Duration) -> String {
    let total_minutes = delta.num_minutes().max(0);
    if total_minutes < 1 {
        return "< 1m".to_string();
    }

    let days = total_minutes / (24 * 60);
    let hours = (total_minutes % (24 * 60)) / 60;
    let minutes = total_minutes % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(format!("{minutes}m"));
    }

    parts.join(" ")
}

/// Wall-clock time in the configured display timezone, UTC otherwise.
pub fn format_clock(dt: DateTime<Utc>, tz: Option<Tz>) -> String {
    match tz {
        Some(tz) => dt.with_timezone(&tz).format("%H:%M:%S").to_string(),
        None => dt.format("%H:%M:%S").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Duration::seconds(30), "< 1m" ; "under a minute")]
    #[test_case(Duration::seconds(-5), "< 1m" ; "negative clamps")]
    #[test_case(Duration::minutes(42), "42m" ; "minutes only")]
    #[test_case(Duration::hours(52), "2d 4h" ; "days drop zero minutes")]
    #[test_case(Duration::days(1) + Duration::hours(2) + Duration::minutes(3), "1d 2h 3m" ; "full form")]
    fn uptime_formats(delta: Duration, expected: &str) {
        assert_eq!(humanize_uptime(delta), expected);
    }

    #[test]
    fn clock_applies_timezone() {
        let dt = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_clock(dt, None), "12:00:00");
        assert_eq!(
            format_clock(dt, Some(chrono_tz::Europe::Berlin)),
            "14:00:00"
        );
    }
}
