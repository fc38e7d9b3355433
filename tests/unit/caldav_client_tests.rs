use anyhow::Result;
use bytes::Bytes;
use caldav_core::{CalDavClient, SyncState};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct MockTransport {
    responses: Arc<Mutex<VecDeque<caldav_core::TransportResponse>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockTransport {
    fn queue(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        let mut header_map = HashMap::new();
        for (k, v) in headers {
            header_map.insert(k.to_string(), v.to_string());
        }
        self.responses.lock().unwrap().push_back(caldav_core::TransportResponse {
            status,
            headers: header_map,
            body: Bytes::from(body.to_string()),
        });
    }
}

impl caldav_core::Transport for MockTransport {
    async fn execute(
        &self,
        method: &str,
        url: &str,
        _headers: HashMap<String, String>,
        _body: Option<Bytes>,
        _timeout_override: Option<Duration>,
    ) -> Result<caldav_core::TransportResponse> {
        self.calls.lock().unwrap().push((method.to_string(), url.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no mock response queued for {method} {url}"))
    }
}

#[tokio::test]
async fn discover_account_skips_hidden_collections_and_resolves_hrefs() {
    let transport = MockTransport::default();

    transport.queue(
        207,
        &[],
        r#"<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/</D:href>
    <D:propstat>
      <D:prop><D:current-user-principal><D:href>/principals/user/</D:href></D:current-user-principal></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
    );
    transport.queue(
        207,
        &[],
        r#"<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/principals/user/</D:href>
    <D:propstat>
      <D:prop><C:calendar-home-set><D:href>/calendars/user/</D:href></C:calendar-home-set></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
    );
    transport.queue(
        207,
        &[],
        r#"<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav" xmlns:CS="http://calendarserver.org/ns/">
  <D:response>
    <D:href>/calendars/user/personal/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/><C:calendar/></D:resourcetype>
        <D:displayname>Personal</D:displayname>
        <CS:getctag>"ctag-1"</CS:getctag>
        <C:supported-calendar-component-set><C:comp name="VEVENT"/></C:supported-calendar-component-set>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/calendars/user/inbox/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/><C:calendar/></D:resourcetype>
        <C:supported-calendar-component-set><C:comp name="VEVENT"/></C:supported-calendar-component-set>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
    );

    let client = CalDavClient::new("https://example.com/", transport);
    let account = client.discover_account("https://example.com/").await.unwrap();

    assert_eq!(account.principal_url, "https://example.com/principals/user/");
    assert_eq!(account.calendar_home, "https://example.com/calendars/user/");
    assert_eq!(account.calendars.len(), 1, "the /inbox/ collection must be filtered out");
    assert_eq!(account.calendars[0].href, "https://example.com/calendars/user/personal/");
    assert_eq!(account.calendars[0].ctag.as_deref(), Some(r#""ctag-1""#));
}

#[tokio::test]
async fn fetch_events_decodes_calendar_data_into_typed_events() {
    let transport = MockTransport::default();
    transport.queue(
        207,
        &[],
        r#"<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/calendars/user/personal/1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>"e1"</D:getetag>
        <C:calendar-data><![CDATA[BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:1@example.com
DTSTART:20250601T090000Z
DTEND:20250601T100000Z
SUMMARY:Standup
END:VEVENT
END:VCALENDAR
]]></C:calendar-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
    );

    let client = CalDavClient::new("https://example.com/", transport);
    let start = "2025-06-01T00:00:00Z".parse().unwrap();
    let end = "2025-07-01T00:00:00Z".parse().unwrap();
    let objects = client
        .fetch_events("https://example.com/calendars/user/personal/", start, end)
        .await
        .unwrap();

    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].etag.as_deref(), Some(r#""e1""#));
    assert_eq!(objects[0].event.summary.as_deref(), Some("Standup"));
}

#[tokio::test]
async fn create_event_sends_if_none_match_and_reports_conflict_on_412() {
    let transport = MockTransport::default();
    transport.queue(412, &[], "");

    let client = CalDavClient::new("https://example.com/", transport);
    let event = caldav_core::ical::parse_all_events(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VEVENT\r\nUID:new@example.com\r\nDTSTART:20250601T090000Z\r\nSUMMARY:New\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
    )
    .unwrap()
    .remove(0);

    let result = client.create_event("https://example.com/calendars/user/personal/", &event).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().is_conflict());
}

#[tokio::test]
async fn sync_collection_returns_full_resync_required_on_provider_invalid_token_code() {
    let transport = MockTransport::default();
    transport.queue(403, &[], "");

    let client = CalDavClient::new("https://caldav.icloud.com/", transport);
    let mut state = SyncState::default();
    state.sync_token = Some("stale-token".to_string());

    let outcome = client
        .sync_collection("https://caldav.icloud.com/calendars/user/personal/", &state)
        .await
        .unwrap();

    assert!(matches!(outcome, caldav_core::SyncOutcome::FullResyncRequired));
}

#[tokio::test]
async fn sync_collection_follows_up_with_multiget_for_changed_hrefs() {
    let transport = MockTransport::default();
    transport.queue(
        207,
        &[],
        r#"<D:multistatus xmlns:D="DAV:">
  <D:sync-token>https://example.com/sync/2</D:sync-token>
  <D:response>
    <D:href>/calendars/user/personal/1.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"e2"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/calendars/user/personal/2.ics</D:href>
    <D:status>HTTP/1.1 404 Not Found</D:status>
  </D:response>
</D:multistatus>"#,
    );
    transport.queue(
        207,
        &[],
        r#"<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/calendars/user/personal/1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>"e2"</D:getetag>
        <C:calendar-data><![CDATA[BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:1@example.com
DTSTART:20250601T090000Z
SUMMARY:Standup
END:VEVENT
END:VCALENDAR
]]></C:calendar-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
    );

    let client = CalDavClient::new("https://example.com/", transport);
    let mut state = SyncState::default();
    state.sync_token = Some("old-token".to_string());

    let outcome = client
        .sync_collection("https://example.com/calendars/user/personal/", &state)
        .await
        .unwrap();

    match outcome {
        caldav_core::SyncOutcome::Delta(delta) => {
            assert_eq!(delta.new_token.as_deref(), Some("https://example.com/sync/2"));
            assert_eq!(delta.changed.len(), 1);
            assert_eq!(delta.changed[0].event.summary.as_deref(), Some("Standup"));
            assert_eq!(delta.deleted, vec!["https://example.com/calendars/user/personal/2.ics"]);
        }
        caldav_core::SyncOutcome::FullResyncRequired => panic!("expected a delta"),
    }
}
