//! Item model produced by the multistatus decoder.

/// WebDAV `Depth` header values.
#[derive(Copy, Clone, Debug)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    pub fn as_str(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// A single `<response>` decoded from a `207 Multi-Status` body, with every
/// property discovery, listing, query, and sync need.
#[derive(Debug, Clone, Default)]
pub struct DavItem {
    pub href: String,
    pub status: Option<String>,
    pub displayname: Option<String>,
    pub etag: Option<String>,
    pub is_collection: bool,
    pub is_calendar: bool,
    pub supported_components: Vec<String>,
    pub calendar_data: Option<String>,
    pub calendar_home_set: Vec<String>,
    pub current_user_principal: Vec<String>,
    pub owner: Option<String>,
    pub calendar_description: Option<String>,
    pub calendar_timezone: Option<String>,
    pub calendar_color: Option<String>,
    pub ctag: Option<String>,
    pub sync_token: Option<String>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
}

/// Outcome of decoding a full multistatus body: the per-response items plus
/// the top-level `sync-token`, if the server included one (RFC 6578).
#[derive(Debug, Default)]
pub struct MultistatusResult {
    pub items: Vec<DavItem>,
    pub sync_token: Option<String>,
}

/// Classification of a single response's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// 200, or no explicit status at all (defaults to 200).
    Changed,
    /// 404 status.
    Deleted,
    /// Any other 2xx.
    Other,
    /// A non-2xx, non-404 status; surfaced but does not abort the batch.
    Failed,
}

impl DavItem {
    /// Classify this item's status.
    pub fn outcome(&self) -> ResponseOutcome {
        let Some(status) = &self.status else {
            return ResponseOutcome::Changed;
        };
        let code = status_code(status);
        match code {
            None => ResponseOutcome::Changed,
            Some(404) => ResponseOutcome::Deleted,
            Some(c) if (200..300).contains(&c) => {
                if self.etag.is_some() {
                    ResponseOutcome::Changed
                } else {
                    ResponseOutcome::Other
                }
            }
            Some(_) => ResponseOutcome::Failed,
        }
    }
}

/// Pull a 3-digit HTTP status code out of a `"HTTP/1.1 404 Not Found"`-style
/// status line.
pub fn status_code(status_line: &str) -> Option<u16> {
    status_line
        .split_whitespace()
        .find_map(|tok| tok.parse::<u16>().ok().filter(|c| (100..600).contains(c)))
}
