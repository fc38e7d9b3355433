//! RRULE windowed expansion.
//!
//! A pure function: given a master event and a `[range_start, range_end)`
//! window, produce the deterministic, total-ordered sequence of instance
//! start times that fall in the window, subtracting EXDATEs, respecting
//! `COUNT`/`UNTIL` globally rather than per-window, and substituting
//! override instances (matching UID + RECURRENCE-ID) for their generated
//! counterpart.
//!
//! Expansion walks one `FREQ`/`INTERVAL` period at a time (a week, a month,
//! a year, ...) and, within each period, generates the candidate instants
//! the `BY*` rule parts select — `BYMONTH`/`BYMONTHDAY`/`BYDAY` (with
//! ordinals) for `MONTHLY`/`YEARLY`, and `BYDAY` weekday lists for `WEEKLY`.
//! A period with no `BY*` parts falls back to the naive same-day-of-period
//! stepping DTSTART implies.

use crate::ical::model::{DateTimeValue, Event, Frequency, RecurrenceEnd, RecurrenceRule};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};

fn resolve_tz(tzid: &str) -> Option<chrono_tz::Tz> {
    tzid.parse().ok()
}

fn step_freq(freq: Frequency, interval: u32, naive: NaiveDateTime) -> Option<NaiveDateTime> {
    let interval = interval.max(1) as i64;
    match freq {
        Frequency::Secondly => naive.checked_add_signed(Duration::seconds(interval)),
        Frequency::Minutely => naive.checked_add_signed(Duration::minutes(interval)),
        Frequency::Hourly => naive.checked_add_signed(Duration::hours(interval)),
        Frequency::Daily => naive.checked_add_signed(Duration::days(interval)),
        Frequency::Weekly => naive.checked_add_signed(Duration::weeks(interval)),
        Frequency::Monthly => add_months(naive, interval as i32),
        Frequency::Yearly => add_months(naive, interval as i32 * 12),
    }
}

fn add_months(naive: NaiveDateTime, months: i32) -> Option<NaiveDateTime> {
    let total_month0 = naive.year() * 12 + (naive.month() as i32 - 1) + months;
    let year = total_month0.div_euclid(12);
    let month = total_month0.rem_euclid(12) as u32 + 1;
    let day = naive.day().min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).map(|d| NaiveDateTime::new(d, naive.time()))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    next.map(|n| (n - first).num_days() as u32).unwrap_or(31)
}

/// Days to add to a `wkst`-aligned week start to reach `day`.
fn days_from(wkst: Weekday, day: Weekday) -> i64 {
    (day.num_days_from_monday() as i64 - wkst.num_days_from_monday() as i64).rem_euclid(7)
}

/// The `wkst`-aligned start of the week containing `date`.
fn week_start(date: NaiveDate, wkst: Weekday) -> NaiveDate {
    date - Duration::days(days_from(wkst, date.weekday()))
}

fn monthday_to_date(year: i32, month: u32, day_num: i32) -> Option<NaiveDate> {
    let dim = days_in_month(year, month) as i32;
    let day = match day_num {
        d if d > 0 => d,
        d if d < 0 => dim + 1 + d,
        _ => return None,
    };
    if day < 1 || day > dim {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day as u32)
}

/// Every occurrence of `weekday` in `year`/`month`, in ascending order.
fn all_weekdays_of_month(year: i32, month: u32, weekday: Weekday) -> Vec<NaiveDate> {
    let dim = days_in_month(year, month);
    (1..=dim)
        .filter_map(|d| NaiveDate::from_ymd_opt(year, month, d))
        .filter(|d| d.weekday() == weekday)
        .collect()
}

/// The `ordinal`-th occurrence of `weekday` in `year`/`month` (1-based,
/// negative counts from the end). `None` if out of range.
fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, ordinal: i32) -> Option<NaiveDate> {
    if ordinal == 0 {
        return None;
    }
    let all = all_weekdays_of_month(year, month, weekday);
    if ordinal > 0 {
        all.get((ordinal - 1) as usize).copied()
    } else {
        let idx = all.len() as i32 + ordinal;
        if idx < 0 { None } else { all.get(idx as usize).copied() }
    }
}

/// Candidate dates within one `year`/`month`, applying `BYMONTHDAY`/`BYDAY`
/// (intersected when both are present) or, absent either, the same
/// day-of-month `fallback_day` implies (clamped to the month's length).
fn monthly_candidates(rule: &RecurrenceRule, year: i32, month: u32, time: NaiveTime, fallback_day: u32) -> Vec<NaiveDateTime> {
    if rule.by_month_day.is_empty() && rule.by_day.is_empty() {
        let day = fallback_day.min(days_in_month(year, month));
        return NaiveDate::from_ymd_opt(year, month, day)
            .map(|d| vec![NaiveDateTime::new(d, time)])
            .unwrap_or_default();
    }

    let mut dates: Vec<NaiveDate> = rule.by_month_day.iter().filter_map(|&d| monthday_to_date(year, month, d)).collect();

    if !rule.by_day.is_empty() {
        let mut byday_dates = Vec::new();
        for w in &rule.by_day {
            match w.ordinal {
                Some(ord) => byday_dates.extend(nth_weekday_of_month(year, month, w.weekday, ord)),
                None => byday_dates.extend(all_weekdays_of_month(year, month, w.weekday)),
            }
        }
        if dates.is_empty() {
            dates = byday_dates;
        } else {
            dates.retain(|d| byday_dates.contains(d));
        }
    }

    dates.into_iter().map(|d| NaiveDateTime::new(d, time)).collect()
}

/// All candidate instants for the period anchored at `period_anchor`
/// (itself stepped by `FREQ`/`INTERVAL` from `master`), before window
/// clipping, EXDATE removal, or `COUNT`/`UNTIL` accounting.
fn candidates_for_period(rule: &RecurrenceRule, period_anchor: NaiveDateTime, master: NaiveDateTime) -> Vec<NaiveDateTime> {
    let time = master.time();
    match rule.freq {
        Frequency::Weekly => {
            if rule.by_day.is_empty() {
                vec![period_anchor]
            } else {
                let ws = week_start(period_anchor.date(), rule.wkst);
                rule.by_day
                    .iter()
                    .map(|w| NaiveDateTime::new(ws + Duration::days(days_from(rule.wkst, w.weekday)), time))
                    .collect()
            }
        }
        Frequency::Monthly => monthly_candidates(rule, period_anchor.year(), period_anchor.month(), time, master.day()),
        Frequency::Yearly => {
            if rule.by_month.is_empty() {
                monthly_candidates(rule, period_anchor.year(), period_anchor.month(), time, master.day())
            } else {
                rule.by_month
                    .iter()
                    .flat_map(|&m| monthly_candidates(rule, period_anchor.year(), m, time, master.day()))
                    .collect()
            }
        }
        _ => vec![period_anchor],
    }
}

/// Expand `event`'s RRULE into the window `[range_start, range_end)`,
/// returning UTC instance start times in ascending order.
///
/// Returns an empty vector if `event` has no RRULE (a non-recurring event is
/// either in-window or not, which the caller checks directly).
pub fn expand(event: &Event, range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let Some(rule) = &event.rrule else {
        return Vec::new();
    };

    let master_naive = match &event.dtstart {
        DateTimeValue::Utc(dt) | DateTimeValue::Floating(dt) => dt.0,
        DateTimeValue::Zoned(dt, _) => dt.0,
        DateTimeValue::Date(d) => NaiveDateTime::new(d.0, NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
    };
    let tzid = event.dtstart.tzid().map(str::to_string);

    let until_utc = match &rule.end {
        RecurrenceEnd::Until(dt) => dt.to_utc(resolve_tz),
        _ => None,
    };
    let max_count = match rule.end {
        RecurrenceEnd::Count(n) => Some(n as u64),
        _ => None,
    };

    let excluded: Vec<DateTime<Utc>> = event.exdates.iter().filter_map(|e| e.to_utc(resolve_tz)).collect();

    let mut results = Vec::new();
    let mut period_anchor = master_naive;
    let mut generated: u64 = 0;
    // Deterministic hard ceiling so a pathological rule (e.g. SECONDLY with
    // no COUNT/UNTIL far outside the window) cannot loop forever.
    const MAX_ITERATIONS: u64 = 200_000;
    let mut iterations: u64 = 0;

    'periods: loop {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            break;
        }
        if let Some(n) = max_count
            && generated >= n
        {
            break;
        }

        let mut candidates = candidates_for_period(rule, period_anchor, master_naive);
        candidates.sort();
        candidates.dedup();

        for candidate in candidates {
            if candidate < master_naive {
                continue;
            }
            if let Some(n) = max_count
                && generated >= n
            {
                break 'periods;
            }
            let Some(candidate_utc) = to_utc_instant(candidate, tzid.as_deref()) else {
                continue;
            };
            if let Some(until) = until_utc
                && candidate_utc > until
            {
                break 'periods;
            }
            generated += 1;

            let in_window = candidate_utc >= range_start && candidate_utc < range_end;
            let excluded_here = excluded.iter().any(|e| (*e - candidate_utc).num_seconds().abs() < 1);
            if in_window && !excluded_here {
                results.push(candidate_utc);
            }
            if let Some(n) = max_count
                && generated >= n
            {
                break 'periods;
            }
        }

        if let Some(anchor_utc) = to_utc_instant(period_anchor, tzid.as_deref())
            && anchor_utc > range_end
        {
            break;
        }

        match step_freq(rule.freq, rule.interval, period_anchor) {
            Some(next) => period_anchor = next,
            None => break,
        }
    }

    results.sort();
    results.dedup();
    results
}

fn to_utc_instant(naive: NaiveDateTime, tzid: Option<&str>) -> Option<DateTime<Utc>> {
    use chrono::TimeZone;
    match tzid {
        None => Some(Utc.from_utc_datetime(&naive)),
        Some(tzid) => {
            let tz = resolve_tz(tzid)?;
            match tz.from_local_datetime(&naive) {
                chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
                chrono::LocalResult::None => None,
            }
        }
    }
}

/// Merge a generated occurrence list with any override instances (events
/// sharing the same UID with a `RECURRENCE-ID` matching a generated start).
pub fn apply_overrides<'a>(
    master: &'a Event,
    overrides: &'a [Event],
    occurrences: &[DateTime<Utc>],
) -> Vec<&'a Event> {
    let mut out = Vec::new();
    'outer: for occurrence in occurrences {
        for over in overrides {
            if over.uid == master.uid
                && let Some(rid) = &over.recurrence_id
                && let Some(rid_utc) = rid.to_utc(resolve_tz)
                && (rid_utc - *occurrence).num_seconds().abs() < 1
            {
                out.push(over);
                continue 'outer;
            }
        }
        out.push(master);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ical::model::{EventEnd, RecurrenceRule, WeekdayNum};
    use chrono::TimeZone;

    fn weekly_event(start: DateTime<Utc>, count: Option<u32>) -> Event {
        Event {
            uid: "recur-1".into(),
            dtstart: DateTimeValue::Utc(crate::ical::model::NaiveDateTime(start.naive_utc())),
            end: None,
            summary: None,
            description: None,
            location: None,
            url: None,
            status: None,
            transparency: None,
            sequence: 0,
            rrule: Some(RecurrenceRule {
                freq: Frequency::Weekly,
                interval: 1,
                end: count.map(RecurrenceEnd::Count).unwrap_or(RecurrenceEnd::Forever),
                ..Default::default()
            }),
            exdates: vec![],
            recurrence_id: None,
            alarms: vec![],
            attendees: vec![],
            organizer: None,
            categories: vec![],
            color: None,
            created: None,
            last_modified: None,
            dtstamp: None,
            raw_properties: vec![],
        }
    }

    fn event_with_rule(start: DateTime<Utc>, rule: RecurrenceRule) -> Event {
        let mut event = weekly_event(start, None);
        event.rrule = Some(rule);
        event
    }

    #[test]
    fn expands_weekly_within_window() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let event = weekly_event(start, None);
        let range_start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range_end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let occurrences = expand(&event, range_start, range_end);
        assert_eq!(occurrences.len(), 5);
        assert!(occurrences.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn count_one_yields_single_occurrence_even_with_wide_window() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let event = weekly_event(start, Some(1));
        let range_start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range_end = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let occurrences = expand(&event, range_start, range_end);
        assert_eq!(occurrences, vec![start]);
    }

    #[test]
    fn exdate_removes_matching_occurrence() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let mut event = weekly_event(start, Some(3));
        event.exdates = vec![DateTimeValue::Utc(crate::ical::model::NaiveDateTime(
            Utc.with_ymd_and_hms(2025, 1, 8, 9, 0, 0).unwrap().naive_utc(),
        ))];
        let range_start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range_end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let occurrences = expand(&event, range_start, range_end);
        assert_eq!(occurrences.len(), 2);
    }

    #[test]
    fn non_recurring_event_has_no_expansion() {
        let mut event = weekly_event(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(), None);
        event.rrule = None;
        event.end = Some(EventEnd::Duration(3600));
        let occurrences = expand(
            &event,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        );
        assert!(occurrences.is_empty());
    }

    #[test]
    fn monthly_byday_ordinal_picks_second_monday_each_month() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let rule = RecurrenceRule {
            freq: Frequency::Monthly,
            interval: 1,
            end: RecurrenceEnd::Count(3),
            by_day: vec![WeekdayNum {
                ordinal: Some(2),
                weekday: Weekday::Mon,
            }],
            ..Default::default()
        };
        let event = event_with_rule(start, rule);
        let occurrences = expand(
            &event,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap(),
        );
        assert_eq!(
            occurrences,
            vec![
                Utc.with_ymd_and_hms(2025, 1, 13, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn yearly_bymonth_bymonthday_picks_fixed_anniversary() {
        let start = Utc.with_ymd_and_hms(2024, 12, 25, 9, 0, 0).unwrap();
        let rule = RecurrenceRule {
            freq: Frequency::Yearly,
            interval: 1,
            end: RecurrenceEnd::Count(3),
            by_month: vec![12],
            by_month_day: vec![25],
            ..Default::default()
        };
        let event = event_with_rule(start, rule);
        let occurrences = expand(
            &event,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2028, 1, 1, 0, 0, 0).unwrap(),
        );
        assert_eq!(
            occurrences,
            vec![
                Utc.with_ymd_and_hms(2024, 12, 25, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 12, 25, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2026, 12, 25, 9, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn weekly_byday_list_expands_every_listed_weekday() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(); // Wednesday
        let rule = RecurrenceRule {
            freq: Frequency::Weekly,
            interval: 1,
            end: RecurrenceEnd::Forever,
            by_day: vec![
                WeekdayNum { ordinal: None, weekday: Weekday::Mon },
                WeekdayNum { ordinal: None, weekday: Weekday::Wed },
                WeekdayNum { ordinal: None, weekday: Weekday::Fri },
            ],
            ..Default::default()
        };
        let event = event_with_rule(start, rule);
        let occurrences = expand(
            &event,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap(),
        );
        assert_eq!(
            occurrences,
            vec![
                Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 1, 3, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn monthly_bymonthday_negative_counts_from_month_end() {
        let start = Utc.with_ymd_and_hms(2025, 1, 30, 9, 0, 0).unwrap();
        let rule = RecurrenceRule {
            freq: Frequency::Monthly,
            interval: 1,
            end: RecurrenceEnd::Count(2),
            by_month_day: vec![-1],
            ..Default::default()
        };
        let event = event_with_rule(start, rule);
        let occurrences = expand(
            &event,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        );
        assert_eq!(
            occurrences,
            vec![
                Utc.with_ymd_and_hms(2025, 1, 31, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 2, 28, 9, 0, 0).unwrap(),
            ]
        );
    }
}
