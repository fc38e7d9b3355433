//! TEXT value escaping.

/// Unescape a raw TEXT property value: `\n`/`\N` → LF, `\\` → `\`, `\,` → `,`,
/// `\;` → `;`. Any other backslash escape is passed through verbatim (minus
/// the backslash) rather than rejected, matching real-world producers that
/// over-escape.
pub fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') | Some('N') => {
                out.push('\n');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            Some(',') => {
                out.push(',');
                chars.next();
            }
            Some(';') => {
                out.push(';');
                chars.next();
            }
            Some(other) => {
                out.push(*other);
                chars.next();
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Escape a TEXT value for emission: the inverse of [`unescape_text`].
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            _ => out.push(c),
        }
    }
    out
}

/// Split a CATEGORIES-style comma-separated TEXT list, honoring escaped
/// commas.
pub fn split_text_list(raw: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push('\\');
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => {
                items.push(unescape_text(&current));
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !items.is_empty() {
        items.push(unescape_text(&current));
    }
    items
}

/// Join a list of plain (already-decoded) values into a CATEGORIES-style
/// comma-separated TEXT value, escaping each item first.
pub fn join_text_list(items: &[String]) -> String {
    items
        .iter()
        .map(|s| escape_text(s))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_symmetry() {
        let samples = [
            "plain text",
            "line one\nline two",
            "a\\b",
            "comma, separated",
            "semi;colon",
            "mix\\,;\nall",
        ];
        for s in samples {
            assert_eq!(unescape_text(&escape_text(s)), s);
        }
    }

    #[test]
    fn categories_split_respects_escaped_commas() {
        let items = split_text_list("Work,Personal\\, Errands,Travel");
        assert_eq!(items, vec!["Work", "Personal, Errands", "Travel"]);
    }

    #[test]
    fn categories_round_trip() {
        let items = vec!["a,b".to_string(), "c;d".to_string()];
        let joined = join_text_list(&items);
        assert_eq!(split_text_list(&joined), items);
    }
}
