//! VTIMEZONE synthesis from `chrono-tz` region data.

use crate::ical::generator::encode_rrule;
use crate::ical::model::{Frequency, RecurrenceEnd, RecurrenceRule, WeekdayNum};
use chrono::{DateTime, Datelike, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// UTC and its common synonyms never get a VTIMEZONE component.
fn is_utc_synonym(tzid: &str) -> bool {
    matches!(tzid, "UTC" | "Z" | "Etc/UTC" | "GMT")
}

fn offset_seconds_at(tz: Tz, instant: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&instant.naive_utc()).fix().local_minus_utc()
}

/// Format a UTC offset as `±HHMM`.
fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.unsigned_abs();
    format!("{sign}{:02}{:02}", abs / 3600, (abs % 3600) / 60)
}

/// Derive the `BYDAY`/`BYMONTHDAY` ordinal from a day-of-month indicator:
/// 1-7 -> 1, 8-14 -> 2, 15-21 -> 3, 22-28 -> 4, else negative (last-of-month).
fn ordinal_for_day_of_month(day: u32) -> i32 {
    match day {
        1..=7 => 1,
        8..=14 => 2,
        15..=21 => 3,
        22..=28 => 4,
        _ => -1,
    }
}

fn transition_rrule(date: NaiveDate) -> RecurrenceRule {
    let ordinal = ordinal_for_day_of_month(date.day());
    let mut rule = RecurrenceRule {
        freq: Frequency::Yearly,
        interval: 1,
        end: RecurrenceEnd::Forever,
        by_month: vec![date.month()],
        ..Default::default()
    };
    rule.by_day = vec![WeekdayNum {
        ordinal: Some(ordinal),
        weekday: date.weekday(),
    }];
    rule
}

/// Resolve a region's abbreviation at a representative instant, falling
/// back to the numeric offset if formatting fails.
fn tzname_at(tz: Tz, instant: DateTime<Utc>) -> String {
    let local = instant.with_timezone(&tz);
    let name = format!("{}", local.format("%Z"));
    if name.is_empty() || name.chars().all(|c| c.is_ascii_digit() || c == '+' || c == '-') {
        format_offset(offset_seconds_at(tz, instant))
    } else {
        name
    }
}

/// Synthesize a `VTIMEZONE` block for `tzid`, or `None` for an unrecognized
/// or UTC-synonym identifier.
pub fn synthesize_vtimezone(tzid: &str) -> Option<String> {
    if is_utc_synonym(tzid) {
        return None;
    }
    let tz: Tz = tzid.parse().ok()?;

    let year = Utc::now().year();
    let jan = Utc.with_ymd_and_hms(year, 1, 15, 12, 0, 0).single()?;
    let jul = Utc.with_ymd_and_hms(year, 7, 15, 12, 0, 0).single()?;

    let jan_offset = offset_seconds_at(tz, jan);
    let jul_offset = offset_seconds_at(tz, jul);

    let mut out = String::new();
    out.push_str("BEGIN:VTIMEZONE\r\n");
    out.push_str(&format!("TZID:{tzid}\r\n"));

    if jan_offset == jul_offset {
        out.push_str("BEGIN:STANDARD\r\n");
        out.push_str("DTSTART:19700101T000000\r\n");
        out.push_str(&format!("TZOFFSETFROM:{}\r\n", format_offset(jan_offset)));
        out.push_str(&format!("TZOFFSETTO:{}\r\n", format_offset(jan_offset)));
        out.push_str(&format!("TZNAME:{}\r\n", tzname_at(tz, jan)));
        out.push_str("END:STANDARD\r\n");
        out.push_str("END:VTIMEZONE\r\n");
        return Some(out);
    }

    // Determine which of {Jan, Jul} is DAYLIGHT by the "offset increases on
    // transition into DAYLIGHT" rule.
    let (standard_offset, daylight_offset) = if jul_offset > jan_offset {
        (jan_offset, jul_offset)
    } else {
        (jul_offset, jan_offset)
    };
    let (standard_sample, daylight_sample) = if jul_offset > jan_offset { (jan, jul) } else { (jul, jan) };

    let standard_transition = find_transition_date(tz, daylight_sample, standard_sample, daylight_offset, standard_offset)
        .unwrap_or_else(|| standard_sample.naive_utc().date());
    let daylight_transition = find_transition_date(tz, standard_sample, daylight_sample, standard_offset, daylight_offset)
        .unwrap_or_else(|| daylight_sample.naive_utc().date());

    out.push_str("BEGIN:DAYLIGHT\r\n");
    out.push_str(&format!("DTSTART:{}\r\n", daylight_transition.format("%Y%m%dT020000")));
    out.push_str(&format!("TZOFFSETFROM:{}\r\n", format_offset(standard_offset)));
    out.push_str(&format!("TZOFFSETTO:{}\r\n", format_offset(daylight_offset)));
    out.push_str(&format!("TZNAME:{}\r\n", tzname_at(tz, daylight_sample)));
    out.push_str(&format!("RRULE:{}\r\n", encode_rrule(&transition_rrule(daylight_transition))));
    out.push_str("END:DAYLIGHT\r\n");

    out.push_str("BEGIN:STANDARD\r\n");
    out.push_str(&format!("DTSTART:{}\r\n", standard_transition.format("%Y%m%dT020000")));
    out.push_str(&format!("TZOFFSETFROM:{}\r\n", format_offset(daylight_offset)));
    out.push_str(&format!("TZOFFSETTO:{}\r\n", format_offset(standard_offset)));
    out.push_str(&format!("TZNAME:{}\r\n", tzname_at(tz, standard_sample)));
    out.push_str(&format!("RRULE:{}\r\n", encode_rrule(&transition_rrule(standard_transition))));
    out.push_str("END:STANDARD\r\n");

    out.push_str("END:VTIMEZONE\r\n");
    Some(out)
}

/// Binary-search the day on which the offset changes from `from_offset` to
/// `to_offset` between `start` (known to be `from_offset`) and `end` (known
/// to be `to_offset`).
fn find_transition_date(tz: Tz, start: DateTime<Utc>, end: DateTime<Utc>, from_offset: i32, to_offset: i32) -> Option<NaiveDate> {
    let (mut lo, mut hi) = if start < end { (start, end) } else { (end, start) };
    if offset_seconds_at(tz, lo) == to_offset || offset_seconds_at(tz, hi) == from_offset {
        // sample points don't bracket a single clean transition; give up.
        return None;
    }
    for _ in 0..40 {
        if (hi - lo).num_seconds() <= 3600 {
            break;
        }
        let mid = lo + (hi - lo) / 2;
        if offset_seconds_at(tz, mid) == from_offset {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(hi.naive_utc().date())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_synonyms_produce_no_vtimezone() {
        assert!(synthesize_vtimezone("UTC").is_none());
        assert!(synthesize_vtimezone("Etc/UTC").is_none());
        assert!(synthesize_vtimezone("GMT").is_none());
    }

    #[test]
    fn dst_region_emits_both_sub_components() {
        let vtz = synthesize_vtimezone("America/New_York").unwrap();
        assert!(vtz.contains("BEGIN:DAYLIGHT"));
        assert!(vtz.contains("BEGIN:STANDARD"));
        assert!(vtz.contains("TZID:America/New_York"));
    }

    #[test]
    fn fixed_offset_region_emits_single_standard() {
        let vtz = synthesize_vtimezone("Asia/Tokyo").unwrap();
        assert!(vtz.contains("BEGIN:STANDARD"));
        assert!(!vtz.contains("BEGIN:DAYLIGHT"));
    }

    #[test]
    fn offset_formatting_always_has_sign_and_four_digits() {
        assert_eq!(format_offset(0), "+0000");
        assert_eq!(format_offset(-18000), "-0500");
        assert_eq!(format_offset(3600), "+0100");
    }
}
