//! The iCalendar value model.
//!
//! Decodes the lexical name/value/params property tree into these typed
//! structs, keeping whatever it can't decode in `raw_properties` for a
//! lossless round trip.

use std::collections::HashMap;

/// A tagged date-time value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateTimeValue {
    /// `YYYYMMDDTHHMMSSZ`.
    Utc(NaiveDateTime),
    /// `YYYYMMDDTHHMMSS` with no `TZID`, interpreted in the viewer's locale.
    Floating(NaiveDateTime),
    /// `YYYYMMDDTHHMMSS;TZID=<region>`, wall-clock time in a named region.
    Zoned(NaiveDateTime, String),
    /// `VALUE=DATE` all-day date, `YYYYMMDD`.
    Date(NaiveDate),
}

impl DateTimeValue {
    /// The `TZID` this value references, if any (used to compute the set of
    /// VTIMEZONEs a generated VCALENDAR must carry).
    pub fn tzid(&self) -> Option<&str> {
        match self {
            DateTimeValue::Zoned(_, tzid) => Some(tzid.as_str()),
            _ => None,
        }
    }

    /// Convert to a UTC instant for recurrence expansion and time-range
    /// comparisons. Floating values are treated as if they were UTC, which
    /// is the same pragmatic choice the protocol machine makes when widening
    /// query windows to whole days.
    pub fn to_utc(&self, resolve_tz: impl Fn(&str) -> Option<chrono_tz::Tz>) -> Option<chrono::DateTime<chrono::Utc>> {
        use chrono::TimeZone;
        match self {
            DateTimeValue::Utc(naive) => Some(chrono::Utc.from_utc_datetime(&naive.0)),
            DateTimeValue::Floating(naive) => Some(chrono::Utc.from_utc_datetime(&naive.0)),
            DateTimeValue::Date(date) => Some(chrono::Utc.from_utc_datetime(&date.0.and_hms_opt(0, 0, 0)?)),
            DateTimeValue::Zoned(naive, tzid) => {
                let tz = resolve_tz(tzid)?;
                match tz.from_local_datetime(&naive.0) {
                    chrono::LocalResult::Single(dt) => Some(dt.with_timezone(&chrono::Utc)),
                    chrono::LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&chrono::Utc)),
                    chrono::LocalResult::None => None,
                }
            }
        }
    }
}

/// Thin wrapper around `chrono::NaiveDateTime` so the model doesn't leak a
/// third-party type directly through its public API surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaiveDateTime(pub chrono::NaiveDateTime);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NaiveDate(pub chrono::NaiveDate);

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// A weekday with an optional ordinal (e.g. the `2` in `BYDAY=2MO`, or a
/// negative ordinal for "last").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekdayNum {
    pub ordinal: Option<i32>,
    pub weekday: chrono::Weekday,
}

/// The end condition of a recurrence rule: bounded by count, bounded by an
/// absolute date-time, or unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceEnd {
    Count(u32),
    Until(DateTimeValue),
    Forever,
}

/// `RRULE` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    pub interval: u32,
    pub end: RecurrenceEnd,
    pub by_day: Vec<WeekdayNum>,
    pub by_month_day: Vec<i32>,
    pub by_month: Vec<u32>,
    pub by_year_day: Vec<i32>,
    pub by_week_no: Vec<i32>,
    pub by_hour: Vec<u32>,
    pub by_minute: Vec<u32>,
    pub by_second: Vec<u32>,
    pub by_set_pos: Vec<i32>,
    pub wkst: chrono::Weekday,
}

impl Default for RecurrenceRule {
    fn default() -> Self {
        Self {
            freq: Frequency::Daily,
            interval: 1,
            end: RecurrenceEnd::Forever,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            by_year_day: Vec::new(),
            by_week_no: Vec::new(),
            by_hour: Vec::new(),
            by_minute: Vec::new(),
            by_second: Vec::new(),
            by_set_pos: Vec::new(),
            wkst: chrono::Weekday::Mon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmAction {
    Display,
    Email,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmTrigger {
    /// Offset in seconds relative to DTSTART (negative) or DTEND/DUE
    /// (`related_end = true`).
    Relative { seconds: i64, related_end: bool },
    Absolute(DateTimeValue),
}

/// `VALARM`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Alarm {
    pub action: Option<AlarmAction>,
    pub trigger: Option<AlarmTrigger>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub attendees: Vec<Attendee>,
    pub attach: Option<String>,
    pub repeat: Option<u32>,
    pub duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    pub value: String,
    pub common_name: Option<String>,
    pub role: Option<String>,
    pub participation_status: Option<String>,
    pub rsvp: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organizer {
    pub value: String,
    pub common_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Tentative,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoStatus {
    NeedsAction,
    InProcess,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalStatus {
    Draft,
    Final,
    Cancelled,
}

/// A single unrecognized property, preserved verbatim for lossless
/// round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
    pub name: String,
    pub params: HashMap<String, String>,
    pub value: String,
}

/// Either end of an event: a fixed end time or a duration relative to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEnd {
    DtEnd(DateTimeValue),
    Duration(i64),
}

/// `VEVENT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub uid: String,
    pub dtstart: DateTimeValue,
    pub end: Option<EventEnd>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub status: Option<EventStatus>,
    pub transparency: Option<Transparency>,
    pub sequence: u32,
    pub rrule: Option<RecurrenceRule>,
    pub exdates: Vec<DateTimeValue>,
    pub recurrence_id: Option<DateTimeValue>,
    pub alarms: Vec<Alarm>,
    pub attendees: Vec<Attendee>,
    pub organizer: Option<Organizer>,
    pub categories: Vec<String>,
    pub color: Option<String>,
    pub created: Option<DateTimeValue>,
    pub last_modified: Option<DateTimeValue>,
    pub dtstamp: Option<DateTimeValue>,
    pub raw_properties: Vec<RawProperty>,
}

/// `VTODO`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub uid: String,
    pub dtstart: Option<DateTimeValue>,
    pub due: Option<DateTimeValue>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub status: Option<TodoStatus>,
    pub percent_complete: Option<u8>,
    pub completed: Option<DateTimeValue>,
    pub priority: Option<u8>,
    pub sequence: u32,
    pub rrule: Option<RecurrenceRule>,
    pub exdates: Vec<DateTimeValue>,
    pub recurrence_id: Option<DateTimeValue>,
    pub alarms: Vec<Alarm>,
    pub attendees: Vec<Attendee>,
    pub organizer: Option<Organizer>,
    pub categories: Vec<String>,
    pub color: Option<String>,
    pub created: Option<DateTimeValue>,
    pub last_modified: Option<DateTimeValue>,
    pub dtstamp: Option<DateTimeValue>,
    pub raw_properties: Vec<RawProperty>,
}

/// `VJOURNAL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    pub uid: String,
    pub dtstart: Option<DateTimeValue>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub status: Option<JournalStatus>,
    pub sequence: u32,
    pub recurrence_id: Option<DateTimeValue>,
    pub categories: Vec<String>,
    pub created: Option<DateTimeValue>,
    pub last_modified: Option<DateTimeValue>,
    pub dtstamp: Option<DateTimeValue>,
    pub raw_properties: Vec<RawProperty>,
}

/// A single calendar component, dispatched on `BEGIN:VEVENT|VTODO|VJOURNAL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarItem {
    Event(Event),
    Todo(Todo),
    Journal(Journal),
}

impl CalendarItem {
    pub fn uid(&self) -> &str {
        match self {
            CalendarItem::Event(e) => &e.uid,
            CalendarItem::Todo(t) => &t.uid,
            CalendarItem::Journal(j) => &j.uid,
        }
    }

    pub fn recurrence_id(&self) -> Option<&DateTimeValue> {
        match self {
            CalendarItem::Event(e) => e.recurrence_id.as_ref(),
            CalendarItem::Todo(t) => t.recurrence_id.as_ref(),
            CalendarItem::Journal(j) => j.recurrence_id.as_ref(),
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            CalendarItem::Event(e) => Some(e),
            _ => None,
        }
    }
}

/// A `VCALENDAR` container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Calendar {
    pub prodid: Option<String>,
    pub version: Option<String>,
    pub calscale: Option<String>,
    pub method: Option<String>,
    pub items: Vec<CalendarItem>,
    /// VTIMEZONE `TZID`s carried verbatim from a parsed calendar (raw text,
    /// re-emitted unchanged rather than round-tripped through the typed
    /// model, which only *generates* new VTIMEZONEs from `chrono-tz`).
    pub raw_timezones: Vec<String>,
}

impl Calendar {
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.items.iter().filter_map(|i| i.as_event())
    }
}
