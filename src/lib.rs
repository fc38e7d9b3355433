//! Core of a CalDAV client library for Rust.
//!
//! This crate covers three things: an RFC 5545 iCalendar codec, an RFC 4791
//! CalDAV / RFC 6578 WebDAV-Sync protocol machine, and a small registry of
//! per-provider quirks. It deliberately does not own an HTTP stack end to
//! end — the protocol machine is generic over the [`Transport`] trait, so
//! callers plug in their own client (or use [`HyperTransport`], the
//! `hyper` 1.x + `rustls` default).
//!
//! # Features
//!
//! - Full RFC 5545 VEVENT/VTODO/VJOURNAL codec with RRULE expansion and
//!   VTIMEZONE synthesis from `chrono-tz`
//! - Principal/calendar-home discovery, calendar CRUD, and sync-token (or
//!   CTag-fallback) incremental sync
//! - A pluggable [`Transport`] — no hard dependency on any particular HTTP
//!   client
//! - A provider-quirks registry for iCloud, Google, Fastmail, Radicale,
//!   Nextcloud, and Baïkal
//!
//! # Examples
//!
//! ## Discovering an account
//!
//! ```no_run
//! use caldav_core::{CalDavClient, Credentials, HyperTransport};
//! use anyhow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = HyperTransport::new(Credentials::basic("user", "pass"))?;
//!     let client = CalDavClient::new("https://caldav.example.com/", transport);
//!
//!     let account = client.discover_account("https://caldav.example.com/").await?;
//!     for calendar in &account.calendars {
//!         println!("calendar: {:?}", calendar.display_name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Fetching and creating events
//!
//! ```no_run
//! use caldav_core::{CalDavClient, Credentials, HyperTransport};
//! use caldav_core::ical::{Event, DateTimeValue};
//! use chrono::{Duration, Utc};
//! use anyhow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = HyperTransport::new(Credentials::basic("user", "pass"))?;
//!     let client = CalDavClient::new("https://caldav.example.com/", transport);
//!
//!     # let calendar_url = "https://caldav.example.com/cal/";
//!     let now = Utc::now();
//!     let events = client.fetch_events(calendar_url, now, now + Duration::days(30)).await?;
//!     for object in &events {
//!         println!("{}: {:?}", object.href, object.event.summary);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Incremental sync
//!
//! ```no_run
//! use caldav_core::{CalDavClient, Credentials, HyperTransport, SyncOutcome, SyncState};
//! use anyhow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = HyperTransport::new(Credentials::basic("user", "pass"))?;
//!     let client = CalDavClient::new("https://caldav.example.com/", transport);
//!
//!     # let calendar_url = "https://caldav.example.com/cal/";
//!     let state = SyncState::default();
//!     match client.sync_collection(calendar_url, &state).await? {
//!         SyncOutcome::Delta(delta) => {
//!             println!("{} changed, {} deleted", delta.changed.len(), delta.deleted.len());
//!         }
//!         SyncOutcome::FullResyncRequired => println!("sync token expired, refetch everything"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod caldav;
pub mod common;
pub mod error;
pub mod ical;
pub mod quirks;
pub mod sync;
pub mod transport;
pub mod webdav;

pub use caldav::{
    CalDavClient, CalendarCollection, CalendarObjectRef, CreateResult, DeleteOutcome,
    DiscoverResult, SyncDelta, SyncOutcome, SyncState, UpdateResult,
};
pub use error::{CalDavError, CalDavResult};
pub use quirks::{Provider, for_server};
pub use sync::{InMemorySyncStateStore, SyncStateStore};
pub use transport::{Credentials, HyperTransport, Transport, TransportResponse};
