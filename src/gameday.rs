//! Game-day heuristic for the refresh interval.
//!
//! Premier League matches cluster in known UK-time windows; inside them the
//! worker polls fast, outside it slows down. The worker treats
//! [`refresh_interval`] as opaque — the windows here are a heuristic, not a
//! fixture schedule.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, Timelike, Utc, Weekday};
use std::time::Duration;

use crate::config::ScraperConfig;

/// Refresh interval for the next cycle. A nonzero static interval in the
/// config overrides the heuristic entirely.
pub fn refresh_interval(config: &ScraperConfig) -> Duration {
    if config.static_interval_secs > 0 {
        return Duration::from_secs(config.static_interval_secs);
    }
    if is_game_day_at(Utc::now()) {
        Duration::from_secs(config.gameday_interval_secs)
    } else {
        Duration::from_secs(config.non_gameday_interval_secs)
    }
}

/// Whether `now` falls in a UK-local match window:
/// weekends 12:00–22:59, Tue–Thu 18:00–22:59, Friday 20:00–22:30.
pub fn is_game_day_at(now: DateTime<Utc>) -> bool {
    let uk = now + ChronoDuration::hours(uk_utc_offset(now));
    let weekday = uk.weekday();
    let hour = uk.hour();
    let minute = uk.minute();

    let weekend = matches!(weekday, Weekday::Sat | Weekday::Sun) && (12..=22).contains(&hour);
    let midweek = matches!(weekday, Weekday::Tue | Weekday::Wed | Weekday::Thu)
        && (18..=22).contains(&hour);
    let friday_evening = weekday == Weekday::Fri
        && (hour == 20 || hour == 21 || (hour == 22 && minute <= 30));

    weekend || midweek || friday_evening
}

/// UK offset from UTC in hours: BST (+1) between the last Sundays of March
/// and October, GMT (0) otherwise.
fn uk_utc_offset(now: DateTime<Utc>) -> i64 {
    let year = now.year();
    let bst_start = last_sunday(year, 3);
    let bst_end = last_sunday(year, 10);
    let date = now.date_naive();
    if date >= bst_start && date < bst_end {
        1
    } else {
        0
    }
}

fn last_sunday(year: i32, month: u32) -> NaiveDate {
    let last_day = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid date")
    .pred_opt()
    .expect("valid date");
    let back = last_day.weekday().num_days_from_sunday();
    last_day - ChronoDuration::days(back as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_last_sunday() {
        assert_eq!(last_sunday(2026, 3), NaiveDate::from_ymd_opt(2026, 3, 29).unwrap());
        assert_eq!(last_sunday(2026, 10), NaiveDate::from_ymd_opt(2026, 10, 25).unwrap());
    }

    #[test]
    fn test_saturday_afternoon_is_game_day() {
        // Sat 2026-01-10 15:00 UTC, GMT season.
        assert!(is_game_day_at(utc(2026, 1, 10, 15, 0)));
    }

    #[test]
    fn test_saturday_morning_is_not() {
        assert!(!is_game_day_at(utc(2026, 1, 10, 9, 0)));
    }

    #[test]
    fn test_midweek_evening_is_game_day() {
        // Wed 2026-01-14 19:00 UTC.
        assert!(is_game_day_at(utc(2026, 1, 14, 19, 0)));
    }

    #[test]
    fn test_monday_evening_is_not() {
        assert!(!is_game_day_at(utc(2026, 1, 12, 19, 0)));
    }

    #[test]
    fn test_friday_window_edges() {
        // Fri 2026-01-16, UK == UTC in January.
        assert!(is_game_day_at(utc(2026, 1, 16, 20, 0)));
        assert!(is_game_day_at(utc(2026, 1, 16, 22, 30)));
        assert!(!is_game_day_at(utc(2026, 1, 16, 22, 31)));
        assert!(!is_game_day_at(utc(2026, 1, 16, 19, 59)));
    }

    #[test]
    fn test_bst_shifts_the_window() {
        // Sat 2026-08-01 11:30 UTC is 12:30 UK (BST) — inside the window.
        assert!(is_game_day_at(utc(2026, 8, 1, 11, 30)));
        // The same UTC instant in January would be 11:30 UK — outside.
        assert!(!is_game_day_at(utc(2026, 1, 10, 11, 30)));
    }

    #[test]
    fn test_static_interval_overrides_heuristic() {
        let config = ScraperConfig {
            active: true,
            max_gameweek: 38,
            gameday_interval_secs: 120,
            non_gameday_interval_secs: 600,
            static_interval_secs: 45,
            entries: vec![1],
        };
        assert_eq!(refresh_interval(&config), Duration::from_secs(45));
    }
}
