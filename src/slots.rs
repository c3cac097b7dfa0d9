//! Pure temporal logic shared by the conflict checker, the availability
//! scanner and the schedule projector. No I/O here.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};

use crate::error::ApiError;

/// Operating hours for classrooms, minutes from midnight.
pub const OPEN_MINUTES: i64 = 7 * 60;
pub const CLOSE_MINUTES: i64 = 18 * 60;
pub const SLOT_STEP_MINUTES: i64 = 30;

/// Half-open interval overlap: [s1,e1) and [s2,e2) collide iff
/// `s1 < e2 && e1 > s2`. Back-to-back bookings (e1 == s2) do not.
pub fn overlaps(s1: NaiveTime, e1: NaiveTime, s2: NaiveTime, e2: NaiveTime) -> bool {
    s1 < e2 && e1 > s2
}

/// Academic week of `date` counted from the semester start.
/// `ceil(days / 7)`, with the opening day itself belonging to week 1.
pub fn academic_week(semester_start: NaiveDate, date: NaiveDate) -> i32 {
    let days = (date - semester_start).num_days();
    let week = (days + 6).div_euclid(7);
    week.max(1) as i32
}

/// ISO 8601 weekday: 1 = Monday .. 7 = Sunday.
pub fn iso_weekday(date: NaiveDate) -> i32 {
    date.weekday().number_from_monday() as i32
}

pub fn is_weekend(date: NaiveDate) -> bool {
    iso_weekday(date) >= 6
}

pub fn day_name(iso_day: i32) -> &'static str {
    match iso_day {
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        7 => "Sunday",
        _ => "Unknown",
    }
}

/// The Monday beginning the calendar week `date` falls in.
pub fn week_monday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(iso_weekday(date) as i64 - 1)
}

/// Every Monday..Friday date in the inclusive range, ascending.
pub fn weekdays_in(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut d = from;
    while d <= to {
        if !is_weekend(d) {
            days.push(d);
        }
        d += Duration::days(1);
    }
    days
}

/// 30-minute-aligned `(start, end)` candidates of `duration_minutes` that fit
/// inside operating hours. A slot ending exactly at closing time is kept.
pub fn slot_candidates(duration_minutes: i64) -> Vec<(NaiveTime, NaiveTime)> {
    let mut slots = Vec::new();
    if duration_minutes <= 0 {
        return slots;
    }
    let mut start = OPEN_MINUTES;
    while start + duration_minutes <= CLOSE_MINUTES {
        slots.push((time_from_minutes(start), time_from_minutes(start + duration_minutes)));
        start += SLOT_STEP_MINUTES;
    }
    slots
}

fn time_from_minutes(minutes: i64) -> NaiveTime {
    NaiveTime::from_hms_opt(minutes as u32 / 60, minutes as u32 % 60, 0)
        .expect("minutes within a day")
}

pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::validation(field, "must be a date in YYYY-MM-DD format"))
}

/// Accepts both `HH:MM` and `HH:MM:SS` (the wire carries either).
pub fn parse_time(field: &'static str, raw: &str) -> Result<NaiveTime, ApiError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| ApiError::validation(field, "must be a time in HH:MM format (24-hour)"))
}

pub fn fmt_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn overlap_is_half_open() {
        assert!(overlaps(t(8, 0), t(10, 30), t(9, 0), t(11, 0)));
        assert!(overlaps(t(9, 0), t(11, 0), t(8, 0), t(10, 30)));
        // containment
        assert!(overlaps(t(8, 0), t(12, 0), t(9, 0), t(10, 0)));
        // back-to-back is free
        assert!(!overlaps(t(8, 0), t(10, 0), t(10, 0), t(12, 0)));
        assert!(!overlaps(t(10, 0), t(12, 0), t(8, 0), t(10, 0)));
        // disjoint
        assert!(!overlaps(t(7, 0), t(8, 0), t(9, 0), t(10, 0)));
    }

    #[test]
    fn academic_week_counts_from_semester_start() {
        let start = d("2024-08-26"); // a Monday
        assert_eq!(academic_week(start, start), 1);
        assert_eq!(academic_week(start, d("2024-08-30")), 1);
        assert_eq!(academic_week(start, d("2024-09-01")), 1);
        // day 7 still rounds into week 1, day 8 opens week 2
        assert_eq!(academic_week(start, d("2024-09-02")), 1);
        assert_eq!(academic_week(start, d("2024-09-03")), 2);
        assert_eq!(academic_week(start, d("2024-11-06")), 11);
    }

    #[test]
    fn iso_weekday_is_monday_one() {
        assert_eq!(iso_weekday(d("2025-11-10")), 1); // Monday
        assert_eq!(iso_weekday(d("2025-11-14")), 5); // Friday
        assert_eq!(iso_weekday(d("2025-11-16")), 7); // Sunday
    }

    #[test]
    fn week_monday_anchors_any_day() {
        assert_eq!(week_monday(d("2025-11-12")), d("2025-11-10"));
        assert_eq!(week_monday(d("2025-11-10")), d("2025-11-10"));
        assert_eq!(week_monday(d("2025-11-16")), d("2025-11-10"));
    }

    #[test]
    fn weekdays_skip_weekends() {
        let days = weekdays_in(d("2025-11-10"), d("2025-11-16"));
        assert_eq!(days.len(), 5);
        assert_eq!(days[0], d("2025-11-10"));
        assert_eq!(days[4], d("2025-11-14"));
    }

    #[test]
    fn slot_ending_at_close_is_kept() {
        let slots = slot_candidates(90);
        // 16:30 + 90min = 18:00 exactly
        assert!(slots.contains(&(t(16, 30), t(18, 0))));
        assert!(!slots.iter().any(|(s, _)| *s == t(17, 0)));
        // one minute longer no longer fits at 16:30
        let longer = slot_candidates(91);
        assert!(!longer.iter().any(|(s, _)| *s == t(16, 30)));
    }

    #[test]
    fn slot_grid_for_150_minutes() {
        let slots = slot_candidates(150);
        // starts 07:00 .. 15:30 inclusive, every half hour
        assert_eq!(slots.len(), 18);
        assert_eq!(slots.first().unwrap().0, t(7, 0));
        assert_eq!(slots.last().unwrap(), &(t(15, 30), t(18, 0)));
    }

    #[test]
    fn non_positive_duration_yields_no_slots() {
        assert!(slot_candidates(0).is_empty());
        assert!(slot_candidates(-30).is_empty());
    }

    #[test]
    fn time_parsing_accepts_both_forms() {
        assert_eq!(parse_time("start_time", "08:00").unwrap(), t(8, 0));
        assert_eq!(parse_time("start_time", "08:00:00").unwrap(), t(8, 0));
        assert!(parse_time("start_time", "8am").is_err());
    }
}
