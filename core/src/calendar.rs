//! Week/day <-> calendar date mapping for the weekly meal grid.
//!
//! Week 1 day 0 is the epoch Monday. Only Monday-Friday have grid columns, so
//! weekend dates map onto the Friday of their week.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Regional timezone used to decide what "today" is.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Number of grid columns per week (Monday to Friday).
pub const WORKDAYS: u8 = 5;

/// Largest week number accepted from user input (roughly a century).
pub const MAX_WEEK: u32 = 5200;

pub const DAY_NAMES: [&str; WORKDAYS as usize] =
    ["Segunda", "Terça", "Quarta", "Quinta", "Sexta"];

/// The Monday that is week 1, day 0: 2026-01-05.
#[must_use]
pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 5).expect("valid epoch date")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WeekDay {
    pub week: u32,
    pub day: u8,
}

/// Calendar date of a grid coordinate: `epoch + (week-1)*7 + day` days.
#[must_use]
pub fn date_of(week: u32, day: u8) -> NaiveDate {
    let offset = (i64::from(week) - 1) * 7 + i64::from(day);
    epoch()
        .checked_add_signed(Duration::days(offset))
        .unwrap_or(NaiveDate::MAX)
}

/// Grid coordinate of a calendar date. Dates before the epoch clamp to week 1
/// day 0; Saturday and Sunday clamp to Friday.
#[must_use]
pub fn week_day_of(date: NaiveDate) -> WeekDay {
    let diff_days = date.signed_duration_since(epoch()).num_days();
    if diff_days < 0 {
        return WeekDay { week: 1, day: 0 };
    }
    let week = u32::try_from(diff_days / 7 + 1).unwrap_or(u32::MAX);
    let day = (diff_days % 7).min(i64::from(WORKDAYS) - 1) as u8;
    WeekDay { week, day }
}

#[must_use]
pub fn week_of(date: NaiveDate) -> u32 {
    week_day_of(date).week
}

#[must_use]
pub fn day_of(date: NaiveDate) -> u8 {
    week_day_of(date).day
}

/// Today's calendar date in `tz`, from that zone's local calendar fields.
#[must_use]
pub fn today(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

#[must_use]
pub fn current_week_day(now: DateTime<Utc>, tz: Tz) -> WeekDay {
    week_day_of(today(now, tz))
}

#[must_use]
pub fn day_name(day: u8) -> &'static str {
    DAY_NAMES[usize::from(day.min(WORKDAYS - 1))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_week_one_day_zero_is_epoch() {
        assert_eq!(date_of(1, 0), epoch());
        assert_eq!(epoch(), d(2026, 1, 5));
        assert_eq!(epoch().weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn test_date_of_offsets() {
        assert_eq!(date_of(1, 4), d(2026, 1, 9));
        assert_eq!(date_of(2, 0), d(2026, 1, 12));
        assert_eq!(date_of(2, 3), d(2026, 1, 15));
        assert_eq!(date_of(10, 0), d(2026, 3, 9));
    }

    #[test]
    fn test_round_trip_for_every_grid_cell() {
        for week in (1..=120).chain(MAX_WEEK - 2..=MAX_WEEK + 2).chain([20_000, 100_000]) {
            for day in 0..WORKDAYS {
                let date = date_of(week, day);
                let back = date_of(week_of(date), day_of(date));
                assert_eq!(back, date, "week {week} day {day}");
                assert_eq!(week_day_of(date), WeekDay { week, day });
            }
        }
    }

    #[test]
    fn test_dates_before_epoch_clamp() {
        let before = d(2025, 12, 31);
        assert_eq!(week_of(before), 1);
        assert_eq!(day_of(before), 0);
        assert_eq!(week_day_of(d(1999, 1, 1)), WeekDay { week: 1, day: 0 });
    }

    #[test]
    fn test_epoch_plus_ten_days() {
        let date = epoch() + Duration::days(10);
        assert_eq!(week_of(date), 2);
        assert_eq!(day_of(date), 3);
    }

    #[test]
    fn test_weekend_maps_to_friday() {
        // Saturday and Sunday of week 1
        assert_eq!(week_day_of(d(2026, 1, 10)), WeekDay { week: 1, day: 4 });
        assert_eq!(week_day_of(d(2026, 1, 11)), WeekDay { week: 1, day: 4 });
        // Next Monday starts week 2
        assert_eq!(week_day_of(d(2026, 1, 12)), WeekDay { week: 2, day: 0 });
    }

    #[test]
    fn test_today_uses_regional_calendar_date() {
        // 02:00 UTC is still the previous evening in São Paulo (UTC-3)
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 2, 0, 0).unwrap();
        assert_eq!(today(now, DEFAULT_TIMEZONE), d(2026, 1, 14));
        assert_eq!(
            current_week_day(now, DEFAULT_TIMEZONE),
            WeekDay { week: 2, day: 2 }
        );

        let later = Utc.with_ymd_and_hms(2026, 1, 15, 3, 0, 0).unwrap();
        assert_eq!(
            current_week_day(later, DEFAULT_TIMEZONE),
            WeekDay { week: 2, day: 3 }
        );
    }

    #[test]
    fn test_today_across_daylight_saving_change() {
        // US clocks spring forward on 2026-03-08; New York is UTC-4 afterwards.
        let tz = chrono_tz::America::New_York;
        let sunday_night = Utc.with_ymd_and_hms(2026, 3, 9, 3, 30, 0).unwrap();
        assert_eq!(today(sunday_night, tz), d(2026, 3, 8));
        assert_eq!(
            current_week_day(sunday_night, tz),
            WeekDay { week: 9, day: 4 }
        );

        let monday_morning = Utc.with_ymd_and_hms(2026, 3, 9, 4, 30, 0).unwrap();
        assert_eq!(today(monday_morning, tz), d(2026, 3, 9));
        assert_eq!(
            current_week_day(monday_morning, tz),
            WeekDay { week: 10, day: 0 }
        );
    }

    #[test]
    fn test_day_names() {
        assert_eq!(day_name(0), "Segunda");
        assert_eq!(day_name(4), "Sexta");
        assert_eq!(day_name(9), "Sexta");
    }
}
