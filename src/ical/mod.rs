//! RFC 5545 iCalendar codec plus the recurrence and
//! timezone engine built on top of it.

pub mod escape;
pub mod generator;
pub mod model;
pub mod parser;
pub mod raw;
pub mod recurrence;
pub mod timezone;

pub use generator::generate;
pub use model::{Calendar, CalendarItem, DateTimeValue, Event, Journal, Todo};
pub use parser::{parse, parse_all_events, parse_with_method};
