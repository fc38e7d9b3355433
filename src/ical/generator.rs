//! Canonical serialization.

use crate::ical::escape::{escape_text, join_text_list};
use crate::ical::model::*;
use crate::ical::timezone;

const LINE_LIMIT: usize = 75;

/// Fold a single logical content line at a safe octet boundary (never
/// splitting a multi-octet UTF-8 sequence) and append the CRLF-terminated
/// result to `out`.
fn fold_line(line: &str, out: &mut String) {
    let bytes = line.as_bytes();
    if bytes.len() <= LINE_LIMIT {
        out.push_str(line);
        out.push_str("\r\n");
        return;
    }

    let mut start = 0;
    let mut first = true;
    while start < bytes.len() {
        let budget = if first { LINE_LIMIT } else { LINE_LIMIT - 1 };
        let mut end = (start + budget).min(bytes.len());
        while end > start && !line.is_char_boundary(end) {
            end -= 1;
        }
        if !first {
            out.push(' ');
        }
        out.push_str(&line[start..end]);
        out.push_str("\r\n");
        start = end;
        first = false;
    }
}

fn push_prop(out: &mut String, name: &str, value: &str) {
    fold_line(&format!("{name}:{value}"), out);
}

fn push_prop_params(out: &mut String, name: &str, params: &[(&str, &str)], value: &str) {
    let mut line = name.to_string();
    for (k, v) in params {
        line.push(';');
        line.push_str(k);
        line.push('=');
        line.push_str(v);
    }
    line.push(':');
    line.push_str(value);
    fold_line(&line, out);
}

/// Encode a [`DateTimeValue`].
pub fn encode_date_time(value: &DateTimeValue) -> (Vec<(&'static str, String)>, String) {
    match value {
        DateTimeValue::Utc(dt) => (vec![], format!("{}Z", dt.0.format("%Y%m%dT%H%M%S"))),
        DateTimeValue::Floating(dt) => (vec![], dt.0.format("%Y%m%dT%H%M%S").to_string()),
        DateTimeValue::Zoned(dt, tzid) => (
            vec![("TZID", tzid.clone())],
            dt.0.format("%Y%m%dT%H%M%S").to_string(),
        ),
        DateTimeValue::Date(date) => (vec![("VALUE", "DATE".to_string())], date.0.format("%Y%m%d").to_string()),
    }
}

fn push_date_time(out: &mut String, name: &str, value: &DateTimeValue) {
    let (params, rendered) = encode_date_time(value);
    if params.is_empty() {
        push_prop(out, name, &rendered);
    } else {
        let params: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        push_prop_params(out, name, &params, &rendered);
    }
}

fn encode_duration(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let mut remaining = seconds.unsigned_abs();
    let days = remaining / 86400;
    remaining %= 86400;
    let hours = remaining / 3600;
    remaining %= 3600;
    let minutes = remaining / 60;
    let secs = remaining % 60;

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 || (days == 0 && hours == 0 && minutes == 0) {
            out.push_str(&format!("{secs}S"));
        }
    }
    out
}

fn weekday_code(day: chrono::Weekday) -> &'static str {
    match day {
        chrono::Weekday::Mon => "MO",
        chrono::Weekday::Tue => "TU",
        chrono::Weekday::Wed => "WE",
        chrono::Weekday::Thu => "TH",
        chrono::Weekday::Fri => "FR",
        chrono::Weekday::Sat => "SA",
        chrono::Weekday::Sun => "SU",
    }
}

/// Render a [`RecurrenceRule`] back into its `RRULE` value.
pub fn encode_rrule(rule: &RecurrenceRule) -> String {
    let mut parts = Vec::new();
    let freq = match rule.freq {
        Frequency::Secondly => "SECONDLY",
        Frequency::Minutely => "MINUTELY",
        Frequency::Hourly => "HOURLY",
        Frequency::Daily => "DAILY",
        Frequency::Weekly => "WEEKLY",
        Frequency::Monthly => "MONTHLY",
        Frequency::Yearly => "YEARLY",
    };
    parts.push(format!("FREQ={freq}"));
    if rule.interval != 1 {
        parts.push(format!("INTERVAL={}", rule.interval));
    }
    match &rule.end {
        RecurrenceEnd::Count(n) => parts.push(format!("COUNT={n}")),
        RecurrenceEnd::Until(dt) => {
            let (_, rendered) = encode_date_time(dt);
            let rendered = if matches!(dt, DateTimeValue::Utc(_)) { rendered } else { format!("{rendered}Z") };
            parts.push(format!("UNTIL={rendered}"));
        }
        RecurrenceEnd::Forever => {}
    }
    if !rule.by_day.is_empty() {
        let days = rule
            .by_day
            .iter()
            .map(|d| match d.ordinal {
                Some(ord) => format!("{ord}{}", weekday_code(d.weekday)),
                None => weekday_code(d.weekday).to_string(),
            })
            .collect::<Vec<_>>()
            .join(",");
        parts.push(format!("BYDAY={days}"));
    }
    if !rule.by_month_day.is_empty() {
        parts.push(format!("BYMONTHDAY={}", join_ints(&rule.by_month_day)));
    }
    if !rule.by_month.is_empty() {
        parts.push(format!("BYMONTH={}", join_ints(&rule.by_month)));
    }
    if !rule.by_year_day.is_empty() {
        parts.push(format!("BYYEARDAY={}", join_ints(&rule.by_year_day)));
    }
    if !rule.by_week_no.is_empty() {
        parts.push(format!("BYWEEKNO={}", join_ints(&rule.by_week_no)));
    }
    if !rule.by_hour.is_empty() {
        parts.push(format!("BYHOUR={}", join_ints(&rule.by_hour)));
    }
    if !rule.by_minute.is_empty() {
        parts.push(format!("BYMINUTE={}", join_ints(&rule.by_minute)));
    }
    if !rule.by_second.is_empty() {
        parts.push(format!("BYSECOND={}", join_ints(&rule.by_second)));
    }
    if !rule.by_set_pos.is_empty() {
        parts.push(format!("BYSETPOS={}", join_ints(&rule.by_set_pos)));
    }
    if rule.wkst != chrono::Weekday::Mon {
        parts.push(format!("WKST={}", weekday_code(rule.wkst)));
    }
    parts.join(";")
}

fn join_ints(values: &[impl std::fmt::Display]) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

fn push_raw_properties(out: &mut String, raw: &[RawProperty]) {
    for prop in raw {
        if prop.params.is_empty() {
            push_prop(out, &prop.name, &prop.value);
        } else {
            let params: Vec<(&str, &str)> = prop.params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            push_prop_params(out, &prop.name, &params, &prop.value);
        }
    }
}

fn push_attendee(out: &mut String, name: &str, attendee: &Attendee) {
    let mut params = Vec::new();
    if let Some(cn) = &attendee.common_name {
        params.push(("CN", cn.as_str()));
    }
    if let Some(role) = &attendee.role {
        params.push(("ROLE", role.as_str()));
    }
    if let Some(partstat) = &attendee.participation_status {
        params.push(("PARTSTAT", partstat.as_str()));
    }
    let rsvp_str;
    if let Some(rsvp) = attendee.rsvp {
        rsvp_str = if rsvp { "TRUE" } else { "FALSE" };
        params.push(("RSVP", rsvp_str));
    }
    if params.is_empty() {
        push_prop(out, name, &attendee.value);
    } else {
        push_prop_params(out, name, &params, &attendee.value);
    }
}

fn push_alarm(out: &mut String, alarm: &Alarm) {
    out.push_str("BEGIN:VALARM\r\n");
    if let Some(action) = alarm.action {
        let value = match action {
            AlarmAction::Display => "DISPLAY",
            AlarmAction::Email => "EMAIL",
            AlarmAction::Audio => "AUDIO",
        };
        push_prop(out, "ACTION", value);
    }
    match &alarm.trigger {
        Some(AlarmTrigger::Relative { seconds, related_end }) => {
            if *related_end {
                push_prop_params(out, "TRIGGER", &[("RELATED", "END")], &encode_duration(*seconds));
            } else {
                push_prop(out, "TRIGGER", &encode_duration(*seconds));
            }
        }
        Some(AlarmTrigger::Absolute(dt)) => push_date_time(out, "TRIGGER", dt),
        None => {}
    }
    if let Some(desc) = &alarm.description {
        push_prop(out, "DESCRIPTION", &escape_text(desc));
    }
    if let Some(summary) = &alarm.summary {
        push_prop(out, "SUMMARY", &escape_text(summary));
    }
    for attendee in &alarm.attendees {
        push_attendee(out, "ATTENDEE", attendee);
    }
    if let Some(attach) = &alarm.attach {
        push_prop(out, "ATTACH", attach);
    }
    if let Some(repeat) = alarm.repeat {
        push_prop(out, "REPEAT", &repeat.to_string());
    }
    if let Some(duration) = alarm.duration_seconds {
        push_prop(out, "DURATION", &encode_duration(duration));
    }
    out.push_str("END:VALARM\r\n");
}

/// Serialize an [`Event`] as a `VEVENT` block.
pub fn generate_event(event: &Event) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VEVENT\r\n");
    push_prop(&mut out, "UID", &event.uid);
    if let Some(dtstamp) = &event.dtstamp {
        push_date_time(&mut out, "DTSTAMP", dtstamp);
    }
    push_date_time(&mut out, "DTSTART", &event.dtstart);
    match &event.end {
        Some(EventEnd::DtEnd(dt)) => push_date_time(&mut out, "DTEND", dt),
        Some(EventEnd::Duration(seconds)) => push_prop(&mut out, "DURATION", &encode_duration(*seconds)),
        None => {}
    }
    if let Some(summary) = &event.summary {
        push_prop(&mut out, "SUMMARY", &escape_text(summary));
    }
    if let Some(description) = &event.description {
        push_prop(&mut out, "DESCRIPTION", &escape_text(description));
    }
    if let Some(location) = &event.location {
        push_prop(&mut out, "LOCATION", &escape_text(location));
    }
    if let Some(status) = event.status {
        let value = match status {
            EventStatus::Tentative => "TENTATIVE",
            EventStatus::Confirmed => "CONFIRMED",
            EventStatus::Cancelled => "CANCELLED",
        };
        push_prop(&mut out, "STATUS", value);
    }
    push_prop(&mut out, "SEQUENCE", &event.sequence.to_string());
    if let Some(rrule) = &event.rrule {
        push_prop(&mut out, "RRULE", &encode_rrule(rrule));
    }
    for exdate in &event.exdates {
        push_date_time(&mut out, "EXDATE", exdate);
    }
    if let Some(recurrence_id) = &event.recurrence_id {
        push_date_time(&mut out, "RECURRENCE-ID", recurrence_id);
    }
    if !event.categories.is_empty() {
        push_prop(&mut out, "CATEGORIES", &join_text_list(&event.categories));
    }
    if let Some(organizer) = &event.organizer {
        let mut params = Vec::new();
        if let Some(cn) = &organizer.common_name {
            params.push(("CN", cn.as_str()));
        }
        if params.is_empty() {
            push_prop(&mut out, "ORGANIZER", &organizer.value);
        } else {
            push_prop_params(&mut out, "ORGANIZER", &params, &organizer.value);
        }
    }
    for attendee in &event.attendees {
        push_attendee(&mut out, "ATTENDEE", attendee);
    }
    if let Some(transp) = event.transparency {
        let value = match transp {
            Transparency::Opaque => "OPAQUE",
            Transparency::Transparent => "TRANSPARENT",
        };
        push_prop(&mut out, "TRANSP", value);
    }
    if let Some(url) = &event.url {
        push_prop(&mut out, "URL", url);
    }
    if let Some(color) = &event.color {
        push_prop(&mut out, "COLOR", color);
    }
    if let Some(created) = &event.created {
        push_date_time(&mut out, "CREATED", created);
    }
    if let Some(last_modified) = &event.last_modified {
        push_date_time(&mut out, "LAST-MODIFIED", last_modified);
    }
    push_raw_properties(&mut out, &event.raw_properties);
    for alarm in &event.alarms {
        push_alarm(&mut out, alarm);
    }
    out.push_str("END:VEVENT\r\n");
    out
}

/// Every distinct non-UTC `TZID` referenced by an event's date-time
/// properties.
fn referenced_tzids(event: &Event) -> Vec<String> {
    let mut tzids = Vec::new();
    let mut consider = |v: &DateTimeValue| {
        if let Some(tzid) = v.tzid()
            && !tzids.iter().any(|t: &String| t == tzid)
        {
            tzids.push(tzid.to_string());
        }
    };
    consider(&event.dtstart);
    if let Some(EventEnd::DtEnd(dt)) = &event.end {
        consider(dt);
    }
    if let Some(rid) = &event.recurrence_id {
        consider(rid);
    }
    for exdate in &event.exdates {
        consider(exdate);
    }
    tzids
}

/// Serialize a full [`Calendar`], synthesizing VTIMEZONE components for
/// every referenced zoned `TZID`.
pub fn generate(calendar: &Calendar) -> String {
    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    push_prop(&mut out, "VERSION", calendar.version.as_deref().unwrap_or("2.0"));
    push_prop(
        &mut out,
        "PRODID",
        calendar.prodid.as_deref().unwrap_or("-//caldav-core//caldav-core//EN"),
    );
    if let Some(calscale) = &calendar.calscale {
        push_prop(&mut out, "CALSCALE", calscale);
    }
    if let Some(method) = &calendar.method {
        push_prop(&mut out, "METHOD", method);
    }

    let mut tzids = Vec::new();
    for event in calendar.events() {
        for tzid in referenced_tzids(event) {
            if !tzids.contains(&tzid) {
                tzids.push(tzid);
            }
        }
    }
    for tzid in &tzids {
        if let Some(vtimezone) = timezone::synthesize_vtimezone(tzid) {
            out.push_str(&vtimezone);
        }
    }

    for item in &calendar.items {
        if let CalendarItem::Event(event) = item {
            out.push_str(&generate_event(event));
        }
    }

    out.push_str("END:VCALENDAR\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_event() -> Event {
        Event {
            uid: "abc-123".into(),
            dtstart: DateTimeValue::Utc(NaiveDateTime(
                NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
            )),
            end: None,
            summary: Some("Team sync".into()),
            description: None,
            location: None,
            url: None,
            status: None,
            transparency: None,
            sequence: 0,
            rrule: None,
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

    #[test]
    fn folds_long_lines_at_75_octets() {
        let mut event = sample_event();
        event.description = Some("x".repeat(200));
        let text = generate_event(&event);
        for line in text.split("\r\n") {
            assert!(line.as_bytes().len() <= 75, "line too long: {line:?}");
        }
    }

    #[test]
    fn never_splits_multibyte_utf8() {
        let mut event = sample_event();
        event.description = Some("\u{00e9}".repeat(60));
        let text = generate_event(&event);
        for line in text.split("\r\n") {
            assert!(std::str::from_utf8(line.as_bytes()).is_ok());
        }
    }

    #[test]
    fn round_trips_through_parser() {
        let calendar = Calendar {
            prodid: Some("-//test//EN".into()),
            version: Some("2.0".into()),
            calscale: None,
            method: None,
            items: vec![CalendarItem::Event(sample_event())],
            raw_timezones: vec![],
        };
        let text = generate(&calendar);
        let parsed = crate::ical::parser::parse(&text).unwrap();
        assert_eq!(parsed.events().next().unwrap().uid, "abc-123");
    }
}
