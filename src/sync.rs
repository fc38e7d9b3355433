//! The storage contract for incremental sync. The core never caches sync
//! state itself; callers supply an implementation of [`SyncStateStore`].

use crate::caldav::types::SyncState;
use std::collections::HashMap;
use std::sync::Mutex;

pub trait SyncStateStore: Send + Sync {
    fn get_sync_state(&self, calendar_href: &str) -> impl std::future::Future<Output = SyncState> + Send;
    fn put_sync_state(&self, calendar_href: &str, state: SyncState) -> impl std::future::Future<Output = ()> + Send;
}

/// An in-memory reference implementation, used by tests and by callers that
/// don't need sync state to outlive the process.
#[derive(Default)]
pub struct InMemorySyncStateStore {
    states: Mutex<HashMap<String, SyncState>>,
}

impl InMemorySyncStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStateStore for InMemorySyncStateStore {
    async fn get_sync_state(&self, calendar_href: &str) -> SyncState {
        self.states.lock().unwrap().get(calendar_href).cloned().unwrap_or_default()
    }

    async fn put_sync_state(&self, calendar_href: &str, state: SyncState) {
        self.states.lock().unwrap().insert(calendar_href.to_string(), state);
    }
}
