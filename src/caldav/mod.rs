//! CalDAV protocol machine: discovery, calendar collection CRUD, and
//! incremental sync, built on the generic WebDAV layer
//! in [`crate::webdav`] and the iCalendar codec in [`crate::ical`].

pub mod client;
pub mod types;

pub use client::CalDavClient;
pub use types::{
    CalendarCollection, CalendarObjectRef, CreateResult, DeleteOutcome, DiscoverResult, SyncDelta,
    SyncOutcome, SyncState, UpdateResult,
};
