use caldav_core::webdav::{escape_xml, parse_multistatus};
use std::time::{Duration, Instant};

#[test]
fn decodes_namespace_prefixed_calendar_listing() {
    let body = br#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav" xmlns:CS="http://calendarserver.org/ns/">
  <D:response>
    <D:href>/cal/personal/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/><C:calendar/></D:resourcetype>
        <D:displayname>Personal</D:displayname>
        <CS:getctag>"ctag-1"</CS:getctag>
        <D:sync-token>https://example.com/sync/1</D:sync-token>
        <C:supported-calendar-component-set>
          <C:comp name="VEVENT"/>
          <C:comp name="VTODO"/>
        </C:supported-calendar-component-set>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    let result = parse_multistatus(body).unwrap();
    assert_eq!(result.items.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.href, "/cal/personal/");
    assert!(item.is_collection);
    assert!(item.is_calendar);
    assert_eq!(item.displayname.as_deref(), Some("Personal"));
    assert_eq!(item.ctag.as_deref(), Some(r#""ctag-1""#));
    assert_eq!(item.sync_token.as_deref(), Some("https://example.com/sync/1"));
    assert_eq!(item.supported_components, vec!["VEVENT", "VTODO"]);
}

#[test]
fn tolerates_unprefixed_and_lowercase_elements() {
    let body = br#"<multistatus xmlns="DAV:">
  <response>
    <href>/cal/x.ics</href>
    <propstat>
      <prop><getetag>"abc"</getetag></prop>
      <status>HTTP/1.1 200 OK</status>
    </propstat>
  </response>
</multistatus>"#;

    let result = parse_multistatus(body).unwrap();
    assert_eq!(result.items[0].etag.as_deref(), Some(r#""abc""#));
}

#[test]
fn decodes_entities_inside_cdata_calendar_data() {
    let body = br#"<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/cal/1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>"e1"</D:getetag>
        <C:calendar-data><![CDATA[BEGIN:VCALENDAR
SUMMARY:Tom &amp; Jerry
END:VCALENDAR
]]></C:calendar-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    let result = parse_multistatus(body).unwrap();
    let data = result.items[0].calendar_data.as_ref().unwrap();
    assert!(data.contains("Tom & Jerry"));
}

#[test]
fn extracts_top_level_sync_token_and_deleted_response() {
    let body = br#"<D:multistatus xmlns:D="DAV:">
  <D:sync-token>https://example.com/sync/2</D:sync-token>
  <D:response>
    <D:href>/cal/gone.ics</D:href>
    <D:status>HTTP/1.1 404 Not Found</D:status>
  </D:response>
</D:multistatus>"#;

    let result = parse_multistatus(body).unwrap();
    assert_eq!(result.sync_token.as_deref(), Some("https://example.com/sync/2"));
    assert_eq!(result.items[0].status.as_deref(), Some("HTTP/1.1 404 Not Found"));
}

#[test]
fn escape_xml_covers_all_five_entities() {
    assert_eq!(escape_xml(r#"a&b<c>d"e'f"#), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
}

fn assert_fast(label: &str, body: &[u8]) {
    let start = Instant::now();
    let _ = parse_multistatus(body);
    let elapsed = start.elapsed();
    assert!(
        elapsed < Duration::from_secs(5),
        "{label} took {elapsed:?}, expected a well-behaved pull parser to stay well under 5s"
    );
}

#[test]
fn survives_deeply_nested_tags() {
    let mut body = String::from(r#"<D:multistatus xmlns:D="DAV:">"#);
    for _ in 0..1_000 {
        body.push_str("<a>");
    }
    for _ in 0..1_000 {
        body.push_str("</a>");
    }
    body.push_str("</D:multistatus>");
    assert_fast("1,000 nested tags", body.as_bytes());
}

#[test]
fn survives_alternating_angle_brackets() {
    let mut body = String::from(r#"<D:multistatus xmlns:D="DAV:">"#);
    body.push_str(&"<>".repeat(50_000));
    body.push_str("</D:multistatus>");
    assert_fast("50,000 alternating angle brackets", body.as_bytes());
}

#[test]
fn survives_huge_attribute_whitespace_run() {
    let mut body = String::from(r#"<D:multistatus xmlns:D="DAV:"><D:response><D:propstat><D:prop><C:comp name="VEVENT""#);
    body.push_str(&" ".repeat(100_000));
    body.push_str(r#"/></D:prop></D:propstat></D:response></D:multistatus>"#);
    assert_fast("100,000 bytes of attribute whitespace", body.as_bytes());
}

#[test]
fn survives_classic_regex_attack_strings() {
    for n in 1..=50 {
        let mut body = String::from(r#"<D:multistatus xmlns:D="DAV:"><D:response><D:href>"#);
        body.push_str(&"a".repeat(n));
        body.push_str(&"X".repeat(n));
        body.push_str("</D:href></D:response></D:multistatus>");
        assert_fast("classic a+X+ attack string", body.as_bytes());
    }
}
