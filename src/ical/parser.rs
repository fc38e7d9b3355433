//! Typed decoding from the generic property tree into [`crate::ical::model`].

use crate::error::{CalDavError, CalDavResult};
use crate::ical::escape::{split_text_list, unescape_text};
use crate::ical::model::*;
use crate::ical::raw::{RawComponent, RawProperty, parse_components};
use chrono::{NaiveDate, NaiveDateTime as ChronoNaiveDateTime, NaiveTime};

/// Parse a full iCalendar text into a [`Calendar`].
///
/// A decoding error on a single property degrades that property to
/// `raw_properties`; a decoding error on a *required* property (`UID`,
/// `DTSTART` for `VEVENT`) drops the whole object with a `tracing::warn!`,
/// without failing the rest of the calendar.
pub fn parse(text: &str) -> CalDavResult<Calendar> {
    let root = parse_components(text)?;
    if root.name != "VCALENDAR" {
        return Err(CalDavError::parse(format!("expected VCALENDAR, found {}", root.name)));
    }
    Ok(decode_calendar(&root))
}

/// Convenience projection returning just the decoded `VEVENT`s.
pub fn parse_all_events(text: &str) -> CalDavResult<Vec<Event>> {
    Ok(parse(text)?
        .items
        .into_iter()
        .filter_map(|i| match i {
            CalendarItem::Event(e) => Some(e),
            _ => None,
        })
        .collect())
}

/// Parse and additionally extract the top-level `METHOD` (iTIP scheduling
/// method), used by callers that need to distinguish e.g. `REQUEST` from
/// `PUBLISH` invites without otherwise interpreting them.
pub fn parse_with_method(text: &str) -> CalDavResult<(Option<String>, Vec<Event>)> {
    let calendar = parse(text)?;
    let events = calendar
        .items
        .into_iter()
        .filter_map(|i| match i {
            CalendarItem::Event(e) => Some(e),
            _ => None,
        })
        .collect();
    Ok((calendar.method, events))
}

fn decode_calendar(root: &RawComponent) -> Calendar {
    let mut calendar = Calendar {
        prodid: root.get_one("PRODID").map(|p| p.value.clone()),
        version: root.get_one("VERSION").map(|p| p.value.clone()),
        calscale: root.get_one("CALSCALE").map(|p| p.value.clone()),
        method: root.get_one("METHOD").map(|p| p.value.clone()),
        items: Vec::new(),
        raw_timezones: Vec::new(),
    };

    for tz in root.children_named("VTIMEZONE") {
        if let Some(tzid) = tz.get_one("TZID") {
            calendar.raw_timezones.push(tzid.value.clone());
        }
    }

    for child in &root.children {
        match child.name.as_str() {
            "VEVENT" => match decode_event(child) {
                Ok(event) => calendar.items.push(CalendarItem::Event(event)),
                Err(err) => tracing::warn!(component = "VEVENT", error = %err, "dropping invalid component"),
            },
            "VTODO" => match decode_todo(child) {
                Ok(todo) => calendar.items.push(CalendarItem::Todo(todo)),
                Err(err) => tracing::warn!(component = "VTODO", error = %err, "dropping invalid component"),
            },
            "VJOURNAL" => match decode_journal(child) {
                Ok(journal) => calendar.items.push(CalendarItem::Journal(journal)),
                Err(err) => tracing::warn!(component = "VJOURNAL", error = %err, "dropping invalid component"),
            },
            "VTIMEZONE" => {}
            other => tracing::debug!(component = other, "ignoring unsupported top-level component"),
        }
    }

    calendar
}

const KNOWN_EVENT_PROPERTIES: &[&str] = &[
    "UID", "DTSTART", "DTEND", "DURATION", "SUMMARY", "DESCRIPTION", "LOCATION", "URL", "STATUS",
    "TRANSP", "SEQUENCE", "RRULE", "EXDATE", "RECURRENCE-ID", "ATTENDEE", "ORGANIZER", "CATEGORIES",
    "COLOR", "CREATED", "LAST-MODIFIED", "DTSTAMP",
];

fn collect_raw_properties(component: &RawComponent, known: &[&str]) -> Vec<crate::ical::model::RawProperty> {
    component
        .properties
        .iter()
        .filter(|p| !known.contains(&p.name.as_str()))
        .cloned()
        .map(|p| p.into())
        .collect()
}

impl From<RawProperty> for crate::ical::model::RawProperty {
    fn from(p: RawProperty) -> Self {
        crate::ical::model::RawProperty {
            name: p.name,
            params: p.params,
            value: p.value,
        }
    }
}

fn decode_event(component: &RawComponent) -> CalDavResult<Event> {
    let uid = component
        .get_one("UID")
        .map(|p| p.value.clone())
        .ok_or_else(|| CalDavError::parse_at("UID", "missing required property"))?;
    let dtstart = component
        .get_one("DTSTART")
        .ok_or_else(|| CalDavError::parse_at("DTSTART", "missing required property"))
        .and_then(decode_date_time)?;

    let end = if let Some(dtend) = component.get_one("DTEND") {
        Some(EventEnd::DtEnd(decode_date_time(dtend)?))
    } else if let Some(duration) = component.get_one("DURATION") {
        parse_duration(&duration.value).map(EventEnd::Duration)
    } else {
        None
    };

    Ok(Event {
        uid,
        dtstart,
        end,
        summary: text_prop(component, "SUMMARY"),
        description: text_prop(component, "DESCRIPTION"),
        location: text_prop(component, "LOCATION"),
        url: component.get_one("URL").map(|p| p.value.clone()),
        status: component.get_one("STATUS").and_then(|p| decode_event_status(&p.value)),
        transparency: component.get_one("TRANSP").and_then(|p| decode_transparency(&p.value)),
        sequence: component.get_one("SEQUENCE").and_then(|p| p.value.parse().ok()).unwrap_or(0),
        rrule: component.get_one("RRULE").and_then(|p| decode_rrule(&p.value)),
        exdates: component.get("EXDATE").into_iter().filter_map(|p| decode_date_time(p).ok()).collect(),
        recurrence_id: component.get_one("RECURRENCE-ID").and_then(|p| decode_date_time(p).ok()),
        alarms: component.children_named("VALARM").filter_map(|c| decode_alarm(c).ok()).collect(),
        attendees: component.get("ATTENDEE").into_iter().map(decode_attendee).collect(),
        organizer: component.get_one("ORGANIZER").map(decode_organizer),
        categories: component.get_one("CATEGORIES").map(|p| split_text_list(&p.value)).unwrap_or_default(),
        color: component.get_one("COLOR").map(|p| p.value.clone()),
        created: component.get_one("CREATED").and_then(|p| decode_date_time(p).ok()),
        last_modified: component.get_one("LAST-MODIFIED").and_then(|p| decode_date_time(p).ok()),
        dtstamp: component.get_one("DTSTAMP").and_then(|p| decode_date_time(p).ok()),
        raw_properties: collect_raw_properties(component, KNOWN_EVENT_PROPERTIES),
    })
}

const KNOWN_TODO_PROPERTIES: &[&str] = &[
    "UID", "DTSTART", "DUE", "SUMMARY", "DESCRIPTION", "LOCATION", "URL", "STATUS",
    "PERCENT-COMPLETE", "COMPLETED", "PRIORITY", "SEQUENCE", "RRULE", "EXDATE", "RECURRENCE-ID",
    "ATTENDEE", "ORGANIZER", "CATEGORIES", "COLOR", "CREATED", "LAST-MODIFIED", "DTSTAMP",
];

fn decode_todo(component: &RawComponent) -> CalDavResult<Todo> {
    let uid = component
        .get_one("UID")
        .map(|p| p.value.clone())
        .ok_or_else(|| CalDavError::parse_at("UID", "missing required property"))?;

    Ok(Todo {
        uid,
        dtstart: component.get_one("DTSTART").and_then(|p| decode_date_time(p).ok()),
        due: component.get_one("DUE").and_then(|p| decode_date_time(p).ok()),
        summary: text_prop(component, "SUMMARY"),
        description: text_prop(component, "DESCRIPTION"),
        location: text_prop(component, "LOCATION"),
        url: component.get_one("URL").map(|p| p.value.clone()),
        status: component.get_one("STATUS").and_then(|p| decode_todo_status(&p.value)),
        percent_complete: component.get_one("PERCENT-COMPLETE").and_then(|p| p.value.parse().ok()),
        completed: component.get_one("COMPLETED").and_then(|p| decode_date_time(p).ok()),
        priority: component.get_one("PRIORITY").and_then(|p| p.value.parse().ok()),
        sequence: component.get_one("SEQUENCE").and_then(|p| p.value.parse().ok()).unwrap_or(0),
        rrule: component.get_one("RRULE").and_then(|p| decode_rrule(&p.value)),
        exdates: component.get("EXDATE").into_iter().filter_map(|p| decode_date_time(p).ok()).collect(),
        recurrence_id: component.get_one("RECURRENCE-ID").and_then(|p| decode_date_time(p).ok()),
        alarms: component.children_named("VALARM").filter_map(|c| decode_alarm(c).ok()).collect(),
        attendees: component.get("ATTENDEE").into_iter().map(decode_attendee).collect(),
        organizer: component.get_one("ORGANIZER").map(decode_organizer),
        categories: component.get_one("CATEGORIES").map(|p| split_text_list(&p.value)).unwrap_or_default(),
        color: component.get_one("COLOR").map(|p| p.value.clone()),
        created: component.get_one("CREATED").and_then(|p| decode_date_time(p).ok()),
        last_modified: component.get_one("LAST-MODIFIED").and_then(|p| decode_date_time(p).ok()),
        dtstamp: component.get_one("DTSTAMP").and_then(|p| decode_date_time(p).ok()),
        raw_properties: collect_raw_properties(component, KNOWN_TODO_PROPERTIES),
    })
}

const KNOWN_JOURNAL_PROPERTIES: &[&str] = &[
    "UID", "DTSTART", "SUMMARY", "DESCRIPTION", "STATUS", "SEQUENCE", "RECURRENCE-ID",
    "CATEGORIES", "CREATED", "LAST-MODIFIED", "DTSTAMP",
];

fn decode_journal(component: &RawComponent) -> CalDavResult<Journal> {
    let uid = component
        .get_one("UID")
        .map(|p| p.value.clone())
        .ok_or_else(|| CalDavError::parse_at("UID", "missing required property"))?;

    Ok(Journal {
        uid,
        dtstart: component.get_one("DTSTART").and_then(|p| decode_date_time(p).ok()),
        summary: text_prop(component, "SUMMARY"),
        description: text_prop(component, "DESCRIPTION"),
        status: component.get_one("STATUS").and_then(|p| decode_journal_status(&p.value)),
        sequence: component.get_one("SEQUENCE").and_then(|p| p.value.parse().ok()).unwrap_or(0),
        recurrence_id: component.get_one("RECURRENCE-ID").and_then(|p| decode_date_time(p).ok()),
        categories: component.get_one("CATEGORIES").map(|p| split_text_list(&p.value)).unwrap_or_default(),
        created: component.get_one("CREATED").and_then(|p| decode_date_time(p).ok()),
        last_modified: component.get_one("LAST-MODIFIED").and_then(|p| decode_date_time(p).ok()),
        dtstamp: component.get_one("DTSTAMP").and_then(|p| decode_date_time(p).ok()),
        raw_properties: collect_raw_properties(component, KNOWN_JOURNAL_PROPERTIES),
    })
}

fn text_prop(component: &RawComponent, name: &str) -> Option<String> {
    component.get_one(name).map(|p| unescape_text(&p.value))
}

/// Decode a `DTSTART`/`DTEND`/`EXDATE`/...-shaped property into a
/// [`DateTimeValue`].
pub fn decode_date_time(prop: &RawProperty) -> CalDavResult<DateTimeValue> {
    if prop.param("VALUE").map(|v| v.eq_ignore_ascii_case("DATE")).unwrap_or(false) {
        let date = NaiveDate::parse_from_str(&prop.value, "%Y%m%d")
            .map_err(|e| CalDavError::parse_at(&prop.name, e.to_string()))?;
        return Ok(DateTimeValue::Date(crate::ical::model::NaiveDate(date)));
    }

    let raw = prop.value.trim();
    let (body, is_utc) = match raw.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (raw, false),
    };

    let naive = parse_naive_date_time(body).map_err(|e| CalDavError::parse_at(&prop.name, e))?;

    if is_utc {
        return Ok(DateTimeValue::Utc(crate::ical::model::NaiveDateTime(naive)));
    }
    if let Some(tzid) = prop.param("TZID") {
        return Ok(DateTimeValue::Zoned(crate::ical::model::NaiveDateTime(naive), tzid.to_string()));
    }
    Ok(DateTimeValue::Floating(crate::ical::model::NaiveDateTime(naive)))
}

fn parse_naive_date_time(text: &str) -> Result<ChronoNaiveDateTime, String> {
    if let Ok(dt) = ChronoNaiveDateTime::parse_from_str(text, "%Y%m%dT%H%M%S") {
        return Ok(dt);
    }
    // Some producers emit bare YYYYMMDD even without VALUE=DATE; treat as midnight.
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y%m%d") {
        return Ok(ChronoNaiveDateTime::new(date, NaiveTime::from_hms_opt(0, 0, 0).unwrap()));
    }
    Err(format!("unrecognized date-time value: {text:?}"))
}

/// Parse an RFC 5545 `DURATION` value (`P[n]DT[n]H[n]M[n]S`, optionally
/// signed) into a signed second count.
fn parse_duration(value: &str) -> Option<i64> {
    let mut chars = value.chars().peekable();
    let mut sign = 1i64;
    if let Some('+') | Some('-') = chars.peek() {
        if chars.next() == Some('-') {
            sign = -1;
        }
    }
    if chars.next() != Some('P') {
        return None;
    }

    let mut total = 0i64;
    let mut in_time = false;
    let mut number = String::new();

    for c in chars {
        match c {
            'T' => in_time = true,
            '0'..='9' => number.push(c),
            'W' => {
                total += number.parse::<i64>().ok()? * 7 * 86400;
                number.clear();
            }
            'D' => {
                total += number.parse::<i64>().ok()? * 86400;
                number.clear();
            }
            'H' if in_time => {
                total += number.parse::<i64>().ok()? * 3600;
                number.clear();
            }
            'M' if in_time => {
                total += number.parse::<i64>().ok()? * 60;
                number.clear();
            }
            'S' if in_time => {
                total += number.parse::<i64>().ok()?;
                number.clear();
            }
            _ => return None,
        }
    }
    Some(sign * total)
}

fn decode_event_status(value: &str) -> Option<EventStatus> {
    match value.to_ascii_uppercase().as_str() {
        "TENTATIVE" => Some(EventStatus::Tentative),
        "CONFIRMED" => Some(EventStatus::Confirmed),
        "CANCELLED" => Some(EventStatus::Cancelled),
        _ => None,
    }
}

fn decode_transparency(value: &str) -> Option<Transparency> {
    match value.to_ascii_uppercase().as_str() {
        "OPAQUE" => Some(Transparency::Opaque),
        "TRANSPARENT" => Some(Transparency::Transparent),
        _ => None,
    }
}

fn decode_todo_status(value: &str) -> Option<TodoStatus> {
    match value.to_ascii_uppercase().as_str() {
        "NEEDS-ACTION" => Some(TodoStatus::NeedsAction),
        "IN-PROCESS" => Some(TodoStatus::InProcess),
        "COMPLETED" => Some(TodoStatus::Completed),
        "CANCELLED" => Some(TodoStatus::Cancelled),
        _ => None,
    }
}

fn decode_journal_status(value: &str) -> Option<JournalStatus> {
    match value.to_ascii_uppercase().as_str() {
        "DRAFT" => Some(JournalStatus::Draft),
        "FINAL" => Some(JournalStatus::Final),
        "CANCELLED" => Some(JournalStatus::Cancelled),
        _ => None,
    }
}

fn decode_attendee(prop: &RawProperty) -> Attendee {
    Attendee {
        value: prop.value.clone(),
        common_name: prop.param("CN").map(str::to_string),
        role: prop.param("ROLE").map(str::to_string),
        participation_status: prop.param("PARTSTAT").map(str::to_string),
        rsvp: prop.param("RSVP").map(|v| v.eq_ignore_ascii_case("TRUE")),
    }
}

fn decode_organizer(prop: &RawProperty) -> Organizer {
    Organizer {
        value: prop.value.clone(),
        common_name: prop.param("CN").map(str::to_string),
    }
}

fn decode_alarm(component: &RawComponent) -> CalDavResult<Alarm> {
    let action = component.get_one("ACTION").and_then(|p| match p.value.to_ascii_uppercase().as_str() {
        "DISPLAY" => Some(AlarmAction::Display),
        "EMAIL" => Some(AlarmAction::Email),
        "AUDIO" => Some(AlarmAction::Audio),
        _ => None,
    });

    let trigger = component.get_one("TRIGGER").and_then(|p| {
        if p.param("VALUE").map(|v| v.eq_ignore_ascii_case("DATE-TIME")).unwrap_or(false) {
            decode_date_time(p).ok().map(AlarmTrigger::Absolute)
        } else {
            let related_end = p.param("RELATED").map(|v| v.eq_ignore_ascii_case("END")).unwrap_or(false);
            parse_duration(&p.value).map(|seconds| AlarmTrigger::Relative { seconds, related_end })
        }
    });

    Ok(Alarm {
        action,
        trigger,
        description: text_prop(component, "DESCRIPTION"),
        summary: text_prop(component, "SUMMARY"),
        attendees: component.get("ATTENDEE").into_iter().map(decode_attendee).collect(),
        attach: component.get_one("ATTACH").map(|p| p.value.clone()),
        repeat: component.get_one("REPEAT").and_then(|p| p.value.parse().ok()),
        duration_seconds: component.get_one("DURATION").and_then(|p| parse_duration(&p.value)),
    })
}

/// Decode an `RRULE` value.
pub fn decode_rrule(value: &str) -> Option<RecurrenceRule> {
    let mut rule = RecurrenceRule::default();
    let mut saw_freq = false;

    for part in value.split(';') {
        let (key, val) = part.split_once('=')?;
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => {
                rule.freq = match val.to_ascii_uppercase().as_str() {
                    "SECONDLY" => Frequency::Secondly,
                    "MINUTELY" => Frequency::Minutely,
                    "HOURLY" => Frequency::Hourly,
                    "DAILY" => Frequency::Daily,
                    "WEEKLY" => Frequency::Weekly,
                    "MONTHLY" => Frequency::Monthly,
                    "YEARLY" => Frequency::Yearly,
                    _ => return None,
                };
                saw_freq = true;
            }
            "INTERVAL" => rule.interval = val.parse().ok()?,
            "COUNT" => rule.end = RecurrenceEnd::Count(val.parse().ok()?),
            "UNTIL" => {
                let synthetic = RawProperty {
                    name: "UNTIL".to_string(),
                    params: Default::default(),
                    value: val.to_string(),
                };
                rule.end = RecurrenceEnd::Until(decode_date_time(&synthetic).ok()?);
            }
            "BYDAY" => {
                rule.by_day = val.split(',').filter_map(parse_weekday_num).collect();
            }
            "BYMONTHDAY" => rule.by_month_day = parse_int_list(val),
            "BYMONTH" => rule.by_month = parse_int_list(val).into_iter().filter_map(|v| u32::try_from(v).ok()).collect(),
            "BYYEARDAY" => rule.by_year_day = parse_int_list(val),
            "BYWEEKNO" => rule.by_week_no = parse_int_list(val),
            "BYHOUR" => rule.by_hour = parse_int_list(val).into_iter().filter_map(|v| u32::try_from(v).ok()).collect(),
            "BYMINUTE" => rule.by_minute = parse_int_list(val).into_iter().filter_map(|v| u32::try_from(v).ok()).collect(),
            "BYSECOND" => rule.by_second = parse_int_list(val).into_iter().filter_map(|v| u32::try_from(v).ok()).collect(),
            "BYSETPOS" => rule.by_set_pos = parse_int_list(val),
            "WKST" => rule.wkst = parse_weekday(val)?,
            _ => {}
        }
    }

    if saw_freq { Some(rule) } else { None }
}

fn parse_int_list(val: &str) -> Vec<i32> {
    val.split(',').filter_map(|v| v.parse().ok()).collect()
}

fn parse_weekday(token: &str) -> Option<chrono::Weekday> {
    match token {
        "MO" => Some(chrono::Weekday::Mon),
        "TU" => Some(chrono::Weekday::Tue),
        "WE" => Some(chrono::Weekday::Wed),
        "TH" => Some(chrono::Weekday::Thu),
        "FR" => Some(chrono::Weekday::Fri),
        "SA" => Some(chrono::Weekday::Sat),
        "SU" => Some(chrono::Weekday::Sun),
        _ => None,
    }
}

fn parse_weekday_num(token: &str) -> Option<WeekdayNum> {
    let token = token.trim();
    let split_at = token.len().saturating_sub(2);
    let (ord_part, dow_part) = token.split_at(split_at);
    let weekday = parse_weekday(dow_part)?;
    let ordinal = if ord_part.is_empty() { None } else { ord_part.parse().ok() };
    Some(WeekdayNum { ordinal, weekday })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_minimal_event() {
        let text = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:1@example.com\r\nDTSTART:20250101T090000Z\r\nSUMMARY:Hello\\, world\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let calendar = parse(text).unwrap();
        assert_eq!(calendar.items.len(), 1);
        let event = calendar.events().next().unwrap();
        assert_eq!(event.uid, "1@example.com");
        assert_eq!(event.summary.as_deref(), Some("Hello, world"));
        assert!(matches!(event.dtstart, DateTimeValue::Utc(_)));
    }

    #[test]
    fn drops_event_missing_required_uid() {
        let text = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nDTSTART:20250101T090000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let calendar = parse(text).unwrap();
        assert!(calendar.items.is_empty());
    }

    #[test]
    fn preserves_unknown_properties_in_raw_properties() {
        let text = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:1\r\nDTSTART:20250101T090000Z\r\nX-CUSTOM-PROP:value\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let calendar = parse(text).unwrap();
        let event = calendar.events().next().unwrap();
        assert_eq!(event.raw_properties.len(), 1);
        assert_eq!(event.raw_properties[0].name, "X-CUSTOM-PROP");
    }

    #[test]
    fn decodes_rrule_byday_with_ordinal() {
        let rule = decode_rrule("FREQ=MONTHLY;BYDAY=2MO,-1FR").unwrap();
        assert_eq!(rule.freq, Frequency::Monthly);
        assert_eq!(rule.by_day[0].ordinal, Some(2));
        assert_eq!(rule.by_day[0].weekday, chrono::Weekday::Mon);
        assert_eq!(rule.by_day[1].ordinal, Some(-1));
    }

    #[test]
    fn decodes_zoned_date_time() {
        let prop = RawProperty {
            name: "DTSTART".into(),
            params: [("TZID".to_string(), "America/New_York".to_string())].into_iter().collect(),
            value: "20250601T090000".into(),
        };
        let decoded = decode_date_time(&prop).unwrap();
        assert_eq!(decoded.tzid(), Some("America/New_York"));
    }

    #[test]
    fn decodes_all_day_date() {
        let prop = RawProperty {
            name: "DTSTART".into(),
            params: [("VALUE".to_string(), "DATE".to_string())].into_iter().collect(),
            value: "20250601".into(),
        };
        let decoded = decode_date_time(&prop).unwrap();
        assert!(matches!(decoded, DateTimeValue::Date(_)));
    }
}
