//! Lexical layer: content-line unfolding and the generic property tree.
//!
//! Builds a name/value/attributes tree by walking `BEGIN:`/`END:` pairs,
//! generalized to: CRLF-or-bare-LF line endings, quoted parameter values that
//! may contain `;` or `:`, and multiple same-named parameters.

use crate::error::CalDavError;
use std::collections::HashMap;

/// A single decoded content line: `NAME *(;PARAM=VALUE) : VALUE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
    pub name: String,
    pub params: HashMap<String, String>,
    pub value: String,
}

impl RawProperty {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An unfolded logical line: `NAME *(;PARAM=VALUE) : VALUE` with `NAME`
/// normalized to upper case.
fn parse_content_line(line: &str) -> Result<RawProperty, CalDavError> {
    let mut name_part = String::new();
    let mut value_part = String::new();
    let mut in_quotes = false;
    let mut seen_colon = false;

    for c in line.chars() {
        if seen_colon {
            value_part.push(c);
            continue;
        }
        match c {
            '"' => {
                in_quotes = !in_quotes;
                name_part.push(c);
            }
            ':' if !in_quotes => seen_colon = true,
            _ => name_part.push(c),
        }
    }

    if !seen_colon {
        return Err(CalDavError::parse(format!("content line missing ':': {line:?}")));
    }

    let mut segments = split_unquoted(&name_part, ';');
    if segments.is_empty() {
        return Err(CalDavError::parse("empty property name"));
    }
    let name = segments.remove(0).trim().to_ascii_uppercase();
    if name.is_empty() {
        return Err(CalDavError::parse(format!("empty property name in {line:?}")));
    }

    let mut params = HashMap::new();
    for segment in segments {
        if let Some((key, value)) = segment.split_once('=') {
            let value = value.trim();
            let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
            params.insert(key.trim().to_ascii_uppercase(), value.to_string());
        }
    }

    Ok(RawProperty {
        name,
        params,
        value: value_part,
    })
}

/// Split on a delimiter, ignoring delimiters inside `"`-quoted spans.
fn split_unquoted(input: &str, delim: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c == delim && !in_quotes => {
                parts.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Unfold a raw iCalendar byte stream into logical content lines: a line
/// beginning with a space or horizontal tab continues the previous line,
/// with the leading whitespace stripped. Tolerates CRLF, bare LF, and bare
/// CR terminators.
pub fn unfold_lines(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut logical = Vec::new();
    for raw_line in normalized.split('\n') {
        if raw_line.is_empty() {
            continue;
        }
        if (raw_line.starts_with(' ') || raw_line.starts_with('\t')) && !logical.is_empty() {
            let last: &mut String = logical.last_mut().unwrap();
            last.push_str(&raw_line[1..]);
        } else {
            logical.push(raw_line.to_string());
        }
    }
    logical
}

/// A generic `BEGIN:X` / `END:X` component tree, one level of [`RawProperty`]
/// plus nested children.
#[derive(Debug, Clone, Default)]
pub struct RawComponent {
    pub name: String,
    pub properties: Vec<RawProperty>,
    pub children: Vec<RawComponent>,
}

impl RawComponent {
    pub fn get(&self, name: &str) -> Vec<&RawProperty> {
        self.properties.iter().filter(|p| p.name == name).collect()
    }

    pub fn get_one(&self, name: &str) -> Option<&RawProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RawComponent> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Parse a full iCalendar text into the top-level `VCALENDAR` component tree.
pub fn parse_components(text: &str) -> Result<RawComponent, CalDavError> {
    let lines = unfold_lines(text);
    let mut stack: Vec<RawComponent> = Vec::new();
    let mut root: Option<RawComponent> = None;

    for line in lines {
        let prop = parse_content_line(&line)?;
        if prop.name == "BEGIN" {
            stack.push(RawComponent {
                name: prop.value.trim().to_ascii_uppercase(),
                properties: Vec::new(),
                children: Vec::new(),
            });
            continue;
        }
        if prop.name == "END" {
            let finished = stack.pop().ok_or_else(|| CalDavError::parse("unmatched END"))?;
            match stack.last_mut() {
                Some(parent) => parent.children.push(finished),
                None => root = Some(finished),
            }
            continue;
        }
        match stack.last_mut() {
            Some(current) => current.properties.push(prop),
            None => return Err(CalDavError::parse("property outside any component")),
        }
    }

    if !stack.is_empty() {
        return Err(CalDavError::parse("unterminated component: missing END"));
    }
    root.ok_or_else(|| CalDavError::parse("input contains no VCALENDAR component"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfolds_continuation_lines() {
        let text = "BEGIN:VCALENDAR\r\nSUMMARY:long\r\n wrapped value\r\nEND:VCALENDAR\r\n";
        let lines = unfold_lines(text);
        assert_eq!(lines, vec!["BEGIN:VCALENDAR", "SUMMARY:long wrapped value", "END:VCALENDAR"]);
    }

    #[test]
    fn tolerates_bare_lf() {
        let text = "BEGIN:VCALENDAR\nEND:VCALENDAR\n";
        assert_eq!(unfold_lines(text).len(), 2);
    }

    #[test]
    fn parses_params_and_quoted_values() {
        let prop = parse_content_line(r#"ATTENDEE;CN="Doe, Jane";ROLE=REQ-PARTICIPANT:mailto:jane@example.com"#).unwrap();
        assert_eq!(prop.name, "ATTENDEE");
        assert_eq!(prop.param("CN"), Some("Doe, Jane"));
        assert_eq!(prop.param("ROLE"), Some("REQ-PARTICIPANT"));
        assert_eq!(prop.value, "mailto:jane@example.com");
    }

    #[test]
    fn builds_nested_components() {
        let text = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:1\nEND:VEVENT\nEND:VCALENDAR\n";
        let root = parse_components(text).unwrap();
        assert_eq!(root.name, "VCALENDAR");
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "VEVENT");
    }
}
