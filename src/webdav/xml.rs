//! Namespace-agnostic WebDAV multistatus decoder.
//!
//! An event-driven `quick-xml` pull-parser (a path-stack plus a
//! per-`<response>` accumulator) decoupled from any one report type so the
//! same decoder serves discovery, calendar listing, `calendar-query`,
//! `calendar-multiget`, and `sync-collection` responses alike.
//!
//! Using a pull parser rather than regex satisfies ReDoS hardening
//! structurally: there are no backtracking patterns over attacker-controlled
//! input, so pathological inputs (deeply nested tags, huge attribute runs,
//! alternating `<>` pairs) cost time linear in input size, not exponential.

use crate::error::CalDavError;
use crate::webdav::types::{DavItem, MultistatusResult};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use std::io::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum El {
    Multistatus,
    Response,
    Propstat,
    Prop,
    Href,
    Status,
    Displayname,
    Getetag,
    Resourcetype,
    Collection,
    Calendar,
    SupportedCalendarComponentSet,
    Comp,
    CalendarData,
    CalendarDescription,
    CalendarTimezone,
    CalendarColor,
    Getctag,
    SyncToken,
    CalendarHomeSet,
    CurrentUserPrincipal,
    Owner,
    Getcontenttype,
    Getlastmodified,
    Other,
}

/// Strip an optional `[a-zA-Z]+:` namespace prefix and match the local name
/// case-insensitively, tolerating `D:`, `d:`, `C:`, default, or unprefixed
/// elements alike.
fn element_from_bytes(raw: &[u8]) -> El {
    let local = match raw.iter().position(|b| *b == b':') {
        Some(idx) => &raw[idx + 1..],
        None => raw,
    };

    if local.eq_ignore_ascii_case(b"multistatus") {
        El::Multistatus
    } else if local.eq_ignore_ascii_case(b"response") {
        El::Response
    } else if local.eq_ignore_ascii_case(b"propstat") {
        El::Propstat
    } else if local.eq_ignore_ascii_case(b"prop") {
        El::Prop
    } else if local.eq_ignore_ascii_case(b"href") {
        El::Href
    } else if local.eq_ignore_ascii_case(b"status") {
        El::Status
    } else if local.eq_ignore_ascii_case(b"displayname") {
        El::Displayname
    } else if local.eq_ignore_ascii_case(b"getetag") {
        El::Getetag
    } else if local.eq_ignore_ascii_case(b"resourcetype") {
        El::Resourcetype
    } else if local.eq_ignore_ascii_case(b"collection") {
        El::Collection
    } else if local.eq_ignore_ascii_case(b"calendar") {
        El::Calendar
    } else if local.eq_ignore_ascii_case(b"supported-calendar-component-set") {
        El::SupportedCalendarComponentSet
    } else if local.eq_ignore_ascii_case(b"comp") {
        El::Comp
    } else if local.eq_ignore_ascii_case(b"calendar-data") {
        El::CalendarData
    } else if local.eq_ignore_ascii_case(b"calendar-description") {
        El::CalendarDescription
    } else if local.eq_ignore_ascii_case(b"calendar-timezone") {
        El::CalendarTimezone
    } else if local.eq_ignore_ascii_case(b"calendar-color") {
        El::CalendarColor
    } else if local.eq_ignore_ascii_case(b"getctag") {
        El::Getctag
    } else if local.eq_ignore_ascii_case(b"sync-token") {
        El::SyncToken
    } else if local.eq_ignore_ascii_case(b"calendar-home-set") {
        El::CalendarHomeSet
    } else if local.eq_ignore_ascii_case(b"current-user-principal") {
        El::CurrentUserPrincipal
    } else if local.eq_ignore_ascii_case(b"owner") {
        El::Owner
    } else if local.eq_ignore_ascii_case(b"getcontenttype") {
        El::Getcontenttype
    } else if local.eq_ignore_ascii_case(b"getlastmodified") {
        El::Getlastmodified
    } else {
        El::Other
    }
}

struct MultistatusParser {
    stack: Vec<El>,
    current: DavItem,
    sync_token: Option<String>,
    items: Vec<DavItem>,
}

impl MultistatusParser {
    fn new() -> Self {
        Self {
            stack: Vec::with_capacity(16),
            current: DavItem::default(),
            sync_token: None,
            items: Vec::new(),
        }
    }

    fn path_ends_with(&self, needle: &[El]) -> bool {
        self.stack.len() >= needle.len() && self.stack[self.stack.len() - needle.len()..] == needle[..]
    }

    fn on_start(&mut self, event: &BytesStart<'_>) -> Result<(), CalDavError> {
        let element = element_from_bytes(event.name().as_ref());
        self.stack.push(element);

        match element {
            El::Response => self.current = DavItem::default(),
            El::Collection => {
                if self.path_ends_with(&[
                    El::Response,
                    El::Propstat,
                    El::Prop,
                    El::Resourcetype,
                    El::Collection,
                ]) {
                    self.current.is_collection = true;
                }
            }
            El::Calendar => {
                if self.path_ends_with(&[
                    El::Response,
                    El::Propstat,
                    El::Prop,
                    El::Resourcetype,
                    El::Calendar,
                ]) {
                    self.current.is_calendar = true;
                }
            }
            El::Comp => {
                if self.path_ends_with(&[
                    El::Response,
                    El::Propstat,
                    El::Prop,
                    El::SupportedCalendarComponentSet,
                    El::Comp,
                ]) {
                    for attr in event.attributes().with_checks(false) {
                        let attr = attr.map_err(|e| CalDavError::parse(e.to_string()))?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
                        if key == "name" {
                            let value = attr
                                .unescape_value()
                                .map_err(|e| CalDavError::parse(e.to_string()))?
                                .into_owned();
                            if !value.is_empty()
                                && !self
                                    .current
                                    .supported_components
                                    .iter()
                                    .any(|c| c.eq_ignore_ascii_case(&value))
                            {
                                self.current.supported_components.push(value);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_end(&mut self, raw: &[u8]) {
        let element = element_from_bytes(raw);
        if element == El::Response {
            let finished = std::mem::take(&mut self.current);
            self.items.push(finished);
        }
        self.stack.pop();
    }

    fn on_text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }

        // calendar-data and calendar-timezone are often multi-line and may
        // arrive as several text/CDATA events; keep the exact payload and
        // never trim it.
        if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::CalendarData]) {
            match self.current.calendar_data.as_mut() {
                Some(existing) => existing.push_str(&text),
                None => self.current.calendar_data = Some(text),
            }
            return;
        }
        if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::CalendarTimezone]) {
            match self.current.calendar_timezone.as_mut() {
                Some(existing) => existing.push_str(&text),
                None => self.current.calendar_timezone = Some(text),
            }
            return;
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }

        if self.path_ends_with(&[El::Response, El::Href]) {
            self.current.href = trimmed.to_string();
        } else if self.path_ends_with(&[El::Response, El::Status])
            || self.path_ends_with(&[El::Response, El::Propstat, El::Status])
        {
            self.current.status = Some(trimmed.to_string());
        } else if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::Displayname]) {
            self.current.displayname = Some(trimmed.to_string());
        } else if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::Getetag]) {
            self.current.etag = Some(trimmed.to_string());
        } else if self.path_ends_with(&[
            El::Response,
            El::Propstat,
            El::Prop,
            El::CalendarDescription,
        ]) {
            self.current.calendar_description = Some(trimmed.to_string());
        } else if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::CalendarColor]) {
            self.current.calendar_color = Some(trimmed.to_string());
        } else if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::Getctag]) {
            self.current.ctag = Some(trimmed.to_string());
        } else if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::SyncToken]) {
            self.current.sync_token = Some(trimmed.to_string());
        } else if self.path_ends_with(&[El::Multistatus, El::SyncToken]) {
            self.sync_token = Some(trimmed.to_string());
        } else if self.path_ends_with(&[
            El::Response,
            El::Propstat,
            El::Prop,
            El::CalendarHomeSet,
            El::Href,
        ]) {
            self.current.calendar_home_set.push(trimmed.to_string());
        } else if self.path_ends_with(&[
            El::Response,
            El::Propstat,
            El::Prop,
            El::CurrentUserPrincipal,
            El::Href,
        ]) {
            self.current.current_user_principal.push(trimmed.to_string());
        } else if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::Owner, El::Href]) {
            self.current.owner = Some(trimmed.to_string());
        } else if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::Getcontenttype]) {
            self.current.content_type = Some(trimmed.to_string());
        } else if self.path_ends_with(&[El::Response, El::Propstat, El::Prop, El::Getlastmodified]) {
            self.current.last_modified = Some(trimmed.to_string());
        }
    }

    fn finish(self) -> MultistatusResult {
        MultistatusResult {
            items: self.items,
            sync_token: self.sync_token,
        }
    }
}

/// Decode raw element text, XML-entity-unescaping `&amp; &lt; &gt; &quot;
/// &apos;` regardless of whether the payload arrived as plain text or inside
/// a `CDATA` section (some servers, notably certain iCloud/Radicale builds,
/// double-encode entities inside a CDATA-wrapped `calendar-data`; entity
/// decoding has to happen after CDATA stripping).
fn decode_text(raw: &[u8]) -> Result<String, CalDavError> {
    match std::str::from_utf8(raw) {
        Ok(s) => Ok(unescape(s)
            .map_err(|e| CalDavError::parse(e.to_string()))?
            .into_owned()),
        Err(_) => Ok(String::from_utf8_lossy(raw).into_owned()),
    }
}

/// Parse a `207 Multi-Status` body into [`MultistatusResult`].
///
/// Synchronous and CPU-bound: this never performs I/O, the caller is
/// responsible for fully reading the HTTP response first.
pub fn parse_multistatus(body: &[u8]) -> Result<MultistatusResult, CalDavError> {
    let mut xml = Reader::from_reader(Cursor::new(body));
    xml.config_mut().trim_text(false);

    let mut buf = Vec::with_capacity(8 * 1024);
    let mut parser = MultistatusParser::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => parser.on_start(&e)?,
            Ok(Event::Empty(e)) => {
                parser.on_start(&e)?;
                parser.on_end(e.name().as_ref());
            }
            Ok(Event::Text(e)) => parser.on_text(decode_text(e.as_ref())?),
            Ok(Event::CData(e)) => parser.on_text(decode_text(e.as_ref())?),
            Ok(Event::End(e)) => parser.on_end(e.name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(CalDavError::parse(format!("XML parsing error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(parser.finish())
}

/// Escape `&`, `<`, `>`, `"`, `'` for embedding into a generated XML request
/// body (e.g. an `href` inside a `calendar-multiget`).
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
