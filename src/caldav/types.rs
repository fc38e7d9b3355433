//! Protocol-machine result types.

use crate::ical::Event;

/// A calendar collection as discovered by `PROPFIND`.
#[derive(Debug, Clone, Default)]
pub struct CalendarCollection {
    pub href: String,
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub ctag: Option<String>,
    pub sync_token: Option<String>,
    pub supported_components: Vec<String>,
}

/// Result of `discover_account`.
#[derive(Debug, Clone, Default)]
pub struct DiscoverResult {
    pub principal_url: String,
    pub calendar_home: String,
    pub calendars: Vec<CalendarCollection>,
    /// Set when the quirks registry flags this provider as requiring an
    /// app-specific password.
    pub requires_app_password: bool,
}

/// A calendar object paired with its server metadata, returned by
/// `fetch_events` and the changed side of `sync_collection`.
#[derive(Debug, Clone)]
pub struct CalendarObjectRef {
    pub href: String,
    pub etag: Option<String>,
    pub event: Event,
}

/// Result of `create_event`.
#[derive(Debug, Clone)]
pub struct CreateResult {
    pub href: String,
    pub etag: Option<String>,
}

/// Result of `update_event`.
#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub etag: Option<String>,
}

/// Outcome of `delete_event`: either the object was removed, or it was
/// already gone, which is idempotent success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// Client-side sync cursor for one collection.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub sync_token: Option<String>,
    pub ctag: Option<String>,
    pub etags: std::collections::HashMap<String, String>,
}

/// A computed delta between two points in a collection's history.
#[derive(Debug, Clone, Default)]
pub struct SyncDelta {
    pub new_token: Option<String>,
    pub new_ctag: Option<String>,
    pub changed: Vec<CalendarObjectRef>,
    pub deleted: Vec<String>,
}

/// Result of `sync_collection`: either a computed delta,
/// or a signal that the sync token is no longer valid and the caller must
/// discard local state and perform a full list.
///
/// `FullResyncRequired` is modeled here, not in [`crate::error`], because an
/// invalid sync token is a control signal rather than an error.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Delta(SyncDelta),
    FullResyncRequired,
}
