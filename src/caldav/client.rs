//! The CalDAV protocol machine.
//!
//! Drives discovery, collection CRUD, and incremental sync through a
//! small set of verb methods, generic over an injected [`Transport`]
//! instead of owning a concrete `hyper` client, and speaking typed
//! [`crate::ical::Event`]s instead of opaque calendar-data strings.

use crate::caldav::types::{
    CalendarCollection, CalendarObjectRef, CreateResult, DeleteOutcome, DiscoverResult, SyncDelta,
    SyncOutcome, SyncState, UpdateResult,
};
use crate::common::compression::{ContentEncoding, compress_payload};
use crate::error::{CalDavError, CalDavResult};
use crate::ical::{self, Event};
use crate::quirks::{self, Provider};
use crate::transport::{Transport, TransportResponse};
use crate::webdav::types::{Depth, DavItem, ResponseOutcome};
use crate::webdav::xml::{escape_xml, parse_multistatus};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;

const MULTIGET_BATCH_SIZE: usize = 100;
const MAX_REDIRECTS: u8 = 5;

/// Drives discovery, collection CRUD, and incremental sync against one
/// server, via an injected [`Transport`]. Stateless across calls: the sync
/// cursor and ETag map are owned entirely by the caller.
#[derive(Clone)]
pub struct CalDavClient<T: Transport> {
    transport: T,
    provider: &'static Provider,
    request_encoding: ContentEncoding,
}

impl<T: Transport> CalDavClient<T> {
    /// Build a client targeting `entry_url`; the quirks provider is
    /// resolved immediately from the URL's host and stays fixed for this
    /// client's lifetime.
    pub fn new(entry_url: &str, transport: T) -> Self {
        Self {
            transport,
            provider: quirks::for_server(entry_url),
            request_encoding: ContentEncoding::Identity,
        }
    }

    pub fn provider(&self) -> &'static Provider {
        self.provider
    }

    /// Compress PUT bodies with `encoding` before sending (`Identity`, the
    /// default, sends bodies uncompressed). Most CalDAV servers never asked
    /// for this, so it stays opt-in rather than negotiated.
    pub fn set_request_compression(&mut self, encoding: ContentEncoding) {
        self.request_encoding = encoding;
    }

    async fn execute(
        &self,
        method: &str,
        url: &str,
        mut headers: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> CalDavResult<TransportResponse> {
        headers.entry("User-Agent".to_string()).or_insert_with(|| "caldav-core".to_string());
        self.transport
            .execute(method, url, headers, body, None)
            .await
            .map_err(CalDavError::network)
    }

    async fn propfind(&self, url: &str, depth: Depth, xml_body: &str) -> CalDavResult<TransportResponse> {
        let mut headers = HashMap::new();
        headers.insert("Depth".to_string(), depth.as_str().to_string());
        headers.insert("Content-Type".to_string(), "application/xml; charset=utf-8".to_string());
        self.execute("PROPFIND", url, headers, Some(Bytes::from(xml_body.to_string()))).await
    }

    async fn report(&self, url: &str, depth: Depth, xml_body: &str) -> CalDavResult<TransportResponse> {
        let mut headers = HashMap::new();
        headers.insert("Depth".to_string(), depth.as_str().to_string());
        headers.insert("Content-Type".to_string(), "application/xml; charset=utf-8".to_string());
        self.execute("REPORT", url, headers, Some(Bytes::from(xml_body.to_string()))).await
    }

    async fn put(&self, url: &str, body: Bytes, if_match: Option<&str>, if_none_match: Option<&str>) -> CalDavResult<TransportResponse> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "text/calendar; charset=utf-8".to_string());
        if let Some(etag) = if_match {
            headers.insert("If-Match".to_string(), etag.to_string());
        }
        if let Some(value) = if_none_match {
            headers.insert("If-None-Match".to_string(), value.to_string());
        }
        let body = if self.request_encoding == ContentEncoding::Identity {
            body
        } else {
            headers.insert("Content-Encoding".to_string(), self.request_encoding.as_str().to_string());
            compress_payload(body, self.request_encoding).await?
        };
        self.execute("PUT", url, headers, Some(body)).await
    }

    async fn delete(&self, url: &str, if_match: Option<&str>) -> CalDavResult<TransportResponse> {
        let mut headers = HashMap::new();
        if let Some(etag) = if_match {
            headers.insert("If-Match".to_string(), etag.to_string());
        }
        self.execute("DELETE", url, headers, None).await
    }

    fn decode_body(&self, response: &TransportResponse) -> CalDavResult<Vec<DavItem>> {
        let result = parse_multistatus(&response.body)?;
        Ok(result.items)
    }

    /// Resolve the current-user-principal, calendar-home-set, and the list
    /// of visible calendar collections underneath it.
    pub async fn discover_account(&self, entry_url: &str) -> CalDavResult<DiscoverResult> {
        let principal_body = propfind_body(&["current-user-principal"]);

        let principal_response = self.propfind_following_redirects(entry_url, Depth::Zero, &principal_body).await?;
        let principal_items = self.decode_body(&principal_response)?;
        let mut principal_url = principal_items
            .iter()
            .flat_map(|i| i.current_user_principal.iter())
            .next()
            .cloned();

        if principal_url.is_none() {
            let well_known = join_url(entry_url, "/.well-known/caldav");
            let response = self.propfind_following_redirects(&well_known, Depth::Zero, &principal_body).await?;
            let items = self.decode_body(&response)?;
            principal_url = items.iter().flat_map(|i| i.current_user_principal.iter()).next().cloned();
        }

        let principal_url = principal_url.ok_or_else(|| CalDavError::parse("no current-user-principal in response"))?;
        let principal_url = resolve_href(entry_url, &principal_url);

        let home_body = propfind_body(&["calendar-home-set"]);
        let home_response = self.propfind(&principal_url, Depth::Zero, &home_body).await?;
        let home_items = self.decode_body(&home_response)?;
        let calendar_home = home_items
            .iter()
            .flat_map(|i| i.calendar_home_set.iter())
            .next()
            .map(|href| resolve_href(&principal_url, href))
            .ok_or_else(|| CalDavError::parse("no calendar-home-set in response"))?;

        let listing_body = propfind_body(&[
            "resourcetype",
            "displayname",
            "calendar-color",
            "supported-calendar-component-set",
            "getctag",
            "sync-token",
        ]);
        let listing_response = self.propfind(&calendar_home, Depth::One, &listing_body).await?;
        let items = self.decode_body(&listing_response)?;

        let calendars = items
            .into_iter()
            .filter(|item| item.is_collection)
            .map(|item| {
                let href = resolve_href(&calendar_home, &item.href);
                (item, href)
            })
            .filter(|(item, href)| {
                let supports_vevent = item.supported_components.iter().any(|c| c.eq_ignore_ascii_case("VEVENT"));
                !self.provider.should_skip_calendar(href, item.displayname.as_deref(), supports_vevent)
            })
            .map(|(item, href)| CalendarCollection {
                href,
                display_name: item.displayname,
                color: item.calendar_color,
                ctag: item.ctag,
                sync_token: item.sync_token,
                supported_components: item.supported_components,
            })
            .collect();

        Ok(DiscoverResult {
            principal_url,
            calendar_home,
            calendars,
            requires_app_password: self.provider.requires_app_password,
        })
    }

    async fn propfind_following_redirects(&self, url: &str, depth: Depth, body: &str) -> CalDavResult<TransportResponse> {
        let mut current = url.to_string();
        for _ in 0..MAX_REDIRECTS {
            let response = self.propfind(&current, depth, body).await?;
            if matches!(response.status, 301 | 302 | 307 | 308)
                && let Some(location) = response.header("location")
            {
                current = resolve_href(&current, location);
                continue;
            }
            return Ok(response);
        }
        Err(CalDavError::http(310, "too many redirects"))
    }

    /// Fetch every `VEVENT` whose time range overlaps `[range_start, range_end]`.
    pub async fn fetch_events(&self, calendar_url: &str, range_start: DateTime<Utc>, range_end: DateTime<Utc>) -> CalDavResult<Vec<CalendarObjectRef>> {
        let start = self.provider.format_date_for_query(range_start.timestamp_millis());
        let end = self.provider.format_date_for_query(range_end.timestamp_millis());
        let body = calendar_query_body("VEVENT", Some(&start), Some(&end), true);
        let response = self.report(calendar_url, Depth::One, &body).await?;
        if !response.is_success() {
            return Err(CalDavError::http(response.status, "calendar-query failed"));
        }
        let items = self.decode_body(&response)?;
        Ok(items_to_objects(calendar_url, items))
    }

    /// Create a new event under `calendar_url`, failing with [`CalDavError::Conflict`]
    /// if an object already exists at the computed href.
    pub async fn create_event(&self, calendar_url: &str, event: &Event) -> CalDavResult<CreateResult> {
        let href = format!("{}/{}.ics", calendar_url.trim_end_matches('/'), event.uid);
        let calendar = wrap_single_event(event);
        let body = Bytes::from(ical::generate(&calendar));
        let response = self.put(&href, body, None, Some("*")).await?;
        if response.status == 412 {
            return Err(CalDavError::Conflict { current_etag: None });
        }
        if !response.is_success() {
            return Err(CalDavError::http(response.status, "PUT failed"));
        }
        Ok(CreateResult {
            href,
            etag: etag_from(&response),
        })
    }

    /// Update an existing event, guarded by `known_etag` via `If-Match`.
    pub async fn update_event(&self, href: &str, event: &Event, known_etag: &str) -> CalDavResult<UpdateResult> {
        let calendar = wrap_single_event(event);
        let body = Bytes::from(ical::generate(&calendar));
        let response = self.put(href, body, Some(known_etag), None).await?;
        if response.status == 412 {
            return Err(CalDavError::Conflict {
                current_etag: etag_from(&response),
            });
        }
        if !response.is_success() {
            return Err(CalDavError::http(response.status, "PUT failed"));
        }
        let etag = match etag_from(&response) {
            Some(etag) => Some(etag),
            None => {
                let head = self.execute("HEAD", href, HashMap::new(), None).await?;
                etag_from(&head)
            }
        };
        Ok(UpdateResult { etag })
    }

    /// Delete an event, guarded by `known_etag` via `If-Match`. A 404 is
    /// treated as idempotent success.
    pub async fn delete_event(&self, href: &str, known_etag: &str) -> CalDavResult<DeleteOutcome> {
        let response = self.delete(href, Some(known_etag)).await?;
        match response.status {
            404 => Ok(DeleteOutcome::AlreadyGone),
            412 => Err(CalDavError::Conflict { current_etag: None }),
            s if (200..300).contains(&s) => Ok(DeleteOutcome::Deleted),
            s => Err(CalDavError::http(s, "DELETE failed")),
        }
    }

    /// Compute the incremental delta since `state` was captured, falling
    /// back to CTag polling and then a full list when the server doesn't
    /// support (or has invalidated) the sync token.
    pub async fn sync_collection(&self, calendar_url: &str, state: &SyncState) -> CalDavResult<SyncOutcome> {
        let Some(last_token) = &state.sync_token else {
            return self.full_list(calendar_url).await;
        };

        let body = sync_collection_body(Some(last_token), None, false);
        let response = self.report(calendar_url, Depth::One, &body).await?;

        if response.status == 400 || response.status == 501 {
            return self.ctag_fallback(calendar_url, state).await;
        }
        if self.provider.invalid_sync_token_codes.contains(&response.status) {
            return Ok(SyncOutcome::FullResyncRequired);
        }
        if !response.is_success() {
            return Err(CalDavError::http(response.status, "sync-collection failed"));
        }

        let body_text = String::from_utf8_lossy(&response.body);
        if body_text.contains("valid-sync-token") {
            return Ok(SyncOutcome::FullResyncRequired);
        }

        let result = parse_multistatus(&response.body)?;
        if result.sync_token.is_none() {
            return self.ctag_fallback(calendar_url, state).await;
        }

        let mut changed_hrefs = Vec::new();
        let mut deleted = Vec::new();
        for item in &result.items {
            let href = resolve_href(calendar_url, &item.href);
            match item.outcome() {
                ResponseOutcome::Deleted => deleted.push(href),
                ResponseOutcome::Changed => changed_hrefs.push(href),
                ResponseOutcome::Other | ResponseOutcome::Failed => {}
            }
        }

        let changed = self.multiget(calendar_url, &changed_hrefs).await?;

        Ok(SyncOutcome::Delta(SyncDelta {
            new_token: result.sync_token,
            new_ctag: None,
            changed,
            deleted,
        }))
    }

    async fn full_list(&self, calendar_url: &str) -> CalDavResult<SyncOutcome> {
        let body = calendar_query_body("VEVENT", None, None, true);
        let response = self.report(calendar_url, Depth::One, &body).await?;
        if !response.is_success() {
            return Err(CalDavError::http(response.status, "full list failed"));
        }
        let result = parse_multistatus(&response.body)?;
        let changed = items_to_objects(calendar_url, result.items);
        Ok(SyncOutcome::Delta(SyncDelta {
            new_token: result.sync_token,
            new_ctag: None,
            changed,
            deleted: Vec::new(),
        }))
    }

    async fn ctag_fallback(&self, calendar_url: &str, state: &SyncState) -> CalDavResult<SyncOutcome> {
        let body = propfind_body(&["getctag"]);
        let response = self.propfind(calendar_url, Depth::Zero, &body).await?;
        let items = self.decode_body(&response)?;
        let current_ctag = items.first().and_then(|i| i.ctag.clone());

        if current_ctag.is_some() && current_ctag == state.ctag {
            return Ok(SyncOutcome::Delta(SyncDelta {
                new_token: None,
                new_ctag: current_ctag,
                changed: Vec::new(),
                deleted: Vec::new(),
            }));
        }

        let listing_body = calendar_query_body("VEVENT", None, None, false);
        let listing = self.report(calendar_url, Depth::One, &listing_body).await?;
        if !listing.is_success() {
            return Err(CalDavError::http(listing.status, "calendar-query failed during CTag fallback"));
        }
        let listing_items = self.decode_body(&listing)?;

        let mut current: HashMap<String, Option<String>> = HashMap::new();
        for item in &listing_items {
            current.insert(resolve_href(calendar_url, &item.href), item.etag.clone());
        }

        let mut changed_hrefs = Vec::new();
        for (href, etag) in &current {
            if state.etags.get(href) != etag.as_ref() {
                changed_hrefs.push(href.clone());
            }
        }
        let deleted: Vec<String> = state.etags.keys().filter(|href| !current.contains_key(*href)).cloned().collect();

        let changed = self.multiget(calendar_url, &changed_hrefs).await?;

        Ok(SyncOutcome::Delta(SyncDelta {
            new_token: None,
            new_ctag: current_ctag,
            changed,
            deleted,
        }))
    }

    /// Fetch every batch concurrently rather than one `REPORT` round-trip at
    /// a time; a sync with thousands of changed hrefs is batch-bound on
    /// network latency, not on the server's per-request work.
    async fn multiget(&self, calendar_url: &str, hrefs: &[String]) -> CalDavResult<Vec<CalendarObjectRef>> {
        let mut inflight = FuturesUnordered::new();
        for batch in hrefs.chunks(MULTIGET_BATCH_SIZE) {
            let Some(body) = calendar_multiget_body(batch.iter().map(String::as_str), true) else {
                continue;
            };
            inflight.push(async move {
                let response = self.report(calendar_url, Depth::One, &body).await?;
                if !response.is_success() {
                    return Err(CalDavError::http(response.status, "calendar-multiget failed"));
                }
                let items = self.decode_body(&response)?;
                Ok(items_to_objects(calendar_url, items))
            });
        }

        let mut out = Vec::new();
        while let Some(result) = inflight.next().await {
            out.extend(result?);
        }
        Ok(out)
    }
}

fn etag_from(response: &TransportResponse) -> Option<String> {
    response.header("etag").map(str::to_string)
}

fn items_to_objects(base: &str, items: Vec<DavItem>) -> Vec<CalendarObjectRef> {
    items
        .into_iter()
        .filter_map(|item| {
            let data = item.calendar_data?;
            let event = ical::parse_all_events(&data).ok()?.into_iter().next()?;
            Some(CalendarObjectRef {
                href: resolve_href(base, &item.href),
                etag: item.etag,
                event,
            })
        })
        .collect()
}

fn wrap_single_event(event: &Event) -> ical::Calendar {
    ical::Calendar {
        prodid: Some("-//caldav-core//caldav-core//EN".to_string()),
        version: Some("2.0".to_string()),
        calscale: None,
        method: None,
        items: vec![ical::CalendarItem::Event(event.clone())],
        raw_timezones: Vec::new(),
    }
}

/// Join a possibly-relative href against a base URL.
fn resolve_href(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    join_url(base, href)
}

fn join_url(base: &str, path: &str) -> String {
    let parsed: Result<hyper::Uri, _> = base.parse();
    let Ok(parsed) = parsed else {
        return format!("{}{}", base.trim_end_matches('/'), path);
    };
    let scheme = parsed.scheme_str().unwrap_or("https");
    let authority = match parsed.authority() {
        Some(a) => a.as_str(),
        None => return format!("{}{}", base.trim_end_matches('/'), path),
    };
    if path.starts_with('/') {
        format!("{scheme}://{authority}{path}")
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

fn propfind_body(props: &[&str]) -> String {
    let mut body = String::from(
        r#"<D:propfind xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav" xmlns:CS="http://calendarserver.org/ns/"><D:prop>"#,
    );
    for prop in props {
        match *prop {
            "current-user-principal" => body.push_str("<D:current-user-principal/>"),
            "calendar-home-set" => body.push_str("<C:calendar-home-set/>"),
            "resourcetype" => body.push_str("<D:resourcetype/>"),
            "displayname" => body.push_str("<D:displayname/>"),
            "calendar-color" => body.push_str(r#"<CS:calendar-color xmlns:ICAL="http://apple.com/ns/ical/"/>"#),
            "supported-calendar-component-set" => body.push_str("<C:supported-calendar-component-set/>"),
            "getctag" => body.push_str("<CS:getctag/>"),
            "sync-token" => body.push_str("<D:sync-token/>"),
            other => {
                body.push('<');
                body.push_str(other);
                body.push_str("/>");
            }
        }
    }
    body.push_str("</D:prop></D:propfind>");
    body
}

fn calendar_query_body(component: &str, start: Option<&str>, end: Option<&str>, include_data: bool) -> String {
    let mut prop = String::from("<D:prop><D:getetag/>");
    if include_data {
        prop.push_str("<C:calendar-data/>");
    }
    prop.push_str("</D:prop>");

    let mut filter = format!(
        r#"<C:filter><C:comp-filter name="VCALENDAR"><C:comp-filter name="{component}">"#
    );
    if start.is_some() || end.is_some() {
        filter.push_str("<C:time-range");
        if let Some(s) = start {
            filter.push_str(&format!(" start=\"{s}\""));
        }
        if let Some(e) = end {
            filter.push_str(&format!(" end=\"{e}\""));
        }
        filter.push_str("/>");
    }
    filter.push_str("</C:comp-filter></C:comp-filter></C:filter>");

    format!(
        r#"<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">{prop}{filter}</C:calendar-query>"#
    )
}

fn calendar_multiget_body<'a>(hrefs: impl Iterator<Item = &'a str>, include_data: bool) -> Option<String> {
    let mut href_xml = String::new();
    let mut total = 0usize;
    for href in hrefs {
        if href.is_empty() {
            continue;
        }
        total += 1;
        href_xml.push_str("<D:href>");
        href_xml.push_str(&escape_xml(href));
        href_xml.push_str("</D:href>");
    }
    if total == 0 {
        return None;
    }

    let mut body = String::from(
        r#"<C:calendar-multiget xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav"><D:prop><D:getetag/>"#,
    );
    if include_data {
        body.push_str("<C:calendar-data/>");
    }
    body.push_str("</D:prop>");
    body.push_str(&href_xml);
    body.push_str("</C:calendar-multiget>");
    Some(body)
}

fn sync_collection_body(sync_token: Option<&str>, limit: Option<u32>, include_data: bool) -> String {
    let mut body = String::from(r#"<D:sync-collection xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">"#);
    if let Some(token) = sync_token {
        body.push_str("<D:sync-token>");
        body.push_str(&escape_xml(token));
        body.push_str("</D:sync-token>");
    } else {
        body.push_str("<D:sync-token/>");
    }
    body.push_str("<D:sync-level>1</D:sync-level>");
    body.push_str("<D:prop><D:getetag/>");
    if include_data {
        body.push_str("<C:calendar-data/>");
    }
    body.push_str("</D:prop>");
    if let Some(limit) = limit {
        body.push_str(&format!("<D:limit><D:nresults>{limit}</D:nresults></D:limit>"));
    }
    body.push_str("</D:sync-collection>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_query_body_includes_time_range() {
        let body = calendar_query_body("VEVENT", Some("20250101T000000Z"), Some("20250201T000000Z"), true);
        assert!(body.contains(r#"start="20250101T000000Z""#));
        assert!(body.contains(r#"end="20250201T000000Z""#));
        assert!(body.contains("calendar-data"));
    }

    #[test]
    fn multiget_body_is_none_for_empty_hrefs() {
        assert!(calendar_multiget_body(std::iter::empty(), true).is_none());
    }

    #[test]
    fn sync_collection_body_omits_token_element_value_when_initial() {
        let body = sync_collection_body(None, None, true);
        assert!(body.contains("<D:sync-token/>"));
    }

    #[test]
    fn resolve_href_keeps_absolute_urls_untouched() {
        assert_eq!(
            resolve_href("https://example.com/base/", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn resolve_href_joins_relative_path_against_authority() {
        assert_eq!(
            resolve_href("https://example.com/base/", "/cal/1.ics"),
            "https://example.com/cal/1.ics"
        );
    }
}
