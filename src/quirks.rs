//! Provider quirks registry.
//!
//! Pure data, consulted by parameter injection from [`crate::caldav`] and
//! [`crate::webdav`] — never by inheritance or trait specialization, so the
//! registry stays a plain table.

/// One provider's identity and behavioral overrides.
#[derive(Debug, Clone)]
pub struct Provider {
    pub id: &'static str,
    pub display_name: &'static str,
    pub requires_app_password: bool,
    /// HTTP statuses that, on a `sync-collection` REPORT, mean "the sync
    /// token is no longer valid" rather than a generic error.
    pub invalid_sync_token_codes: &'static [u16],
    /// `href`/`display_name` substrings (case-insensitive) that mark a
    /// collection as a hidden task/reminder list rather than an event
    /// calendar.
    pub task_list_markers: &'static [&'static str],
}

const ICLOUD: Provider = Provider {
    id: "icloud",
    display_name: "iCloud",
    requires_app_password: true,
    invalid_sync_token_codes: &[403],
    task_list_markers: &["list", "tasks", "reminders"],
};

const GOOGLE: Provider = Provider {
    id: "google",
    display_name: "Google Calendar",
    requires_app_password: false,
    invalid_sync_token_codes: &[403, 412],
    task_list_markers: &["list", "tasks", "reminders"],
};

const FASTMAIL: Provider = Provider {
    id: "fastmail",
    display_name: "Fastmail",
    requires_app_password: true,
    invalid_sync_token_codes: &[403, 412],
    task_list_markers: &["list", "tasks", "reminders"],
};

const RADICALE: Provider = Provider {
    id: "radicale",
    display_name: "Radicale",
    requires_app_password: false,
    invalid_sync_token_codes: &[403, 412],
    task_list_markers: &["list", "tasks", "reminders"],
};

const NEXTCLOUD: Provider = Provider {
    id: "nextcloud",
    display_name: "Nextcloud",
    requires_app_password: true,
    invalid_sync_token_codes: &[403, 412],
    task_list_markers: &["list", "tasks", "reminders"],
};

const BAIKAL: Provider = Provider {
    id: "baikal",
    display_name: "Baïkal",
    requires_app_password: false,
    invalid_sync_token_codes: &[403, 412],
    task_list_markers: &["list", "tasks", "reminders"],
};

const GENERIC: Provider = Provider {
    id: "generic",
    display_name: "Generic CalDAV server",
    requires_app_password: false,
    invalid_sync_token_codes: &[403, 412],
    task_list_markers: &["list", "tasks", "reminders"],
};

/// Host-suffix match table.
pub fn for_server(url: &str) -> &'static Provider {
    let host = url.to_ascii_lowercase();
    if host.contains("icloud.com") {
        &ICLOUD
    } else if host.contains("google.com") {
        &GOOGLE
    } else if host.contains("fastmail.com") {
        &FASTMAIL
    } else if host.contains(":5232") || host.contains("/radicale") {
        &RADICALE
    } else if host.contains("nextcloud") {
        &NEXTCLOUD
    } else if host.contains("baikal") {
        &BAIKAL
    } else {
        &GENERIC
    }
}

impl Provider {
    /// True if this collection should be hidden from the caller.
    pub fn should_skip_calendar(&self, href: &str, display_name: Option<&str>, supports_vevent: bool) -> bool {
        const HIDDEN_SUFFIXES: &[&str] = &["/inbox/", "/outbox/", "/freebusy/", "/notification/", "/scheduling/"];
        if HIDDEN_SUFFIXES.iter().any(|suffix| href.ends_with(suffix)) {
            return true;
        }
        if let Some(name) = display_name {
            let lower = name.to_ascii_lowercase();
            if self.task_list_markers.iter().any(|marker| lower.contains(marker)) {
                return true;
            }
        }
        !supports_vevent
    }

    /// Day-truncated, always-UTC query timestamp.
    pub fn format_date_for_query(&self, epoch_millis: i64) -> String {
        format_date_for_query(epoch_millis)
    }

    pub fn default_sync_range_back(&self) -> i64 {
        default_sync_range_back()
    }

    pub fn default_sync_range_forward(&self) -> i64 {
        default_sync_range_forward()
    }
}

/// `YYYYMMDDT000000Z`, truncated to the day, always UTC.
pub fn format_date_for_query(epoch_millis: i64) -> String {
    use chrono::{DateTime, Utc};
    let dt = DateTime::<Utc>::from_timestamp_millis(epoch_millis).unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap());
    dt.format("%Y%m%dT000000Z").to_string()
}

/// 365 days, in milliseconds.
pub fn default_sync_range_back() -> i64 {
    365 * 24 * 3600 * 1000
}

/// `2100-01-01T00:00:00Z`, in epoch milliseconds.
pub fn default_sync_range_forward() -> i64 {
    4_102_444_800_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_icloud_by_host_suffix() {
        let p = for_server("https://p01-caldav.icloud.com/123/calendars/");
        assert_eq!(p.id, "icloud");
        assert!(p.requires_app_password);
        assert_eq!(p.invalid_sync_token_codes, &[403]);
    }

    #[test]
    fn matches_radicale_by_port_or_path() {
        assert_eq!(for_server("http://localhost:5232/user/").id, "radicale");
        assert_eq!(for_server("https://dav.example.com/radicale/user/").id, "radicale");
    }

    #[test]
    fn unmatched_host_falls_back_to_generic() {
        assert_eq!(for_server("https://caldav.example.net/").id, "generic");
    }

    #[test]
    fn skips_well_known_hidden_collections() {
        let p = &GENERIC;
        assert!(p.should_skip_calendar("https://example.com/cal/inbox/", None, true));
        assert!(p.should_skip_calendar("https://example.com/cal/mine/", Some("My Tasks"), true));
        assert!(!p.should_skip_calendar("https://example.com/cal/mine/", Some("Personal"), true));
        assert!(p.should_skip_calendar("https://example.com/cal/mine/", Some("Personal"), false));
    }

    #[test]
    fn format_date_for_query_is_day_truncated_utc() {
        // 2025-06-15T13:45:00Z
        let formatted = format_date_for_query(1_749_995_100_000);
        assert_eq!(formatted, "20250615T000000Z");
    }
}
