//! Reader and writer for the subset of NestedText used by running logs:
//! a single top-level dictionary whose values are all strings.

use std::collections::HashSet;
use thiserror::Error;

const INDENT: &str = "    ";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("unrecognized line.")]
    UnrecognizedLine,

    #[error("invalid indentation.")]
    InvalidIndentation,

    #[error("only string values are supported.")]
    UnsupportedValue,

    #[error("duplicate key: {0}.")]
    DuplicateKey(String),
}

/// A parse failure, located by 1-based line number.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }
}

fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#')
}

fn is_indented(line: &str) -> bool {
    line.starts_with(|c: char| c.is_whitespace())
}

/// Split `key: value` or `key:` into its parts. `None` value means a block follows.
fn split_key(line: &str) -> Option<(&str, Option<&str>)> {
    if let Some(pos) = line.find(": ") {
        return Some((line[..pos].trim_end(), Some(&line[pos + 2..])));
    }
    line.strip_suffix(':').map(|key| (key.trim_end(), None))
}

fn check_top_level(lineno: usize, line: &str) -> Result<(), ParseError> {
    let starts_tag = |tag: char| line == tag.to_string() || line.starts_with(&format!("{} ", tag));
    if starts_tag('-') || starts_tag('>') || line.starts_with('[') || line.starts_with('{') {
        return Err(ParseError::new(lineno, ParseErrorKind::UnsupportedValue));
    }
    Ok(())
}

/// Parse a document into its ordered key/value pairs.
pub fn loads(text: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut items = Vec::new();
    let mut seen = HashSet::new();
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l)).peekable();

    while let Some((lineno, line)) = lines.next() {
        if is_ignorable(line) {
            continue;
        }
        if is_indented(line) {
            return Err(ParseError::new(lineno, ParseErrorKind::InvalidIndentation));
        }
        check_top_level(lineno, line)?;
        let (key, inline) = split_key(line)
            .ok_or_else(|| ParseError::new(lineno, ParseErrorKind::UnrecognizedLine))?;

        let value = match inline {
            Some(value) => value.to_string(),
            None => {
                let mut parts: Vec<&str> = Vec::new();
                let mut indent: Option<usize> = None;
                while let Some(&(next_no, next)) = lines.peek() {
                    if is_ignorable(next) {
                        lines.next();
                        continue;
                    }
                    if !is_indented(next) {
                        break;
                    }
                    lines.next();
                    let body = next.trim_start();
                    let width = next.len() - body.len();
                    match indent {
                        None => indent = Some(width),
                        Some(w) if w != width => {
                            return Err(ParseError::new(
                                next_no,
                                ParseErrorKind::InvalidIndentation,
                            ))
                        }
                        Some(_) => {}
                    }
                    if body == ">" {
                        parts.push("");
                    } else if let Some(rest) = body.strip_prefix("> ") {
                        parts.push(rest);
                    } else {
                        return Err(ParseError::new(
                            next_no,
                            ParseErrorKind::UnsupportedValue,
                        ));
                    }
                }
                parts.join("\n")
            }
        };

        if !seen.insert(key.to_string()) {
            return Err(ParseError::new(
                lineno,
                ParseErrorKind::DuplicateKey(key.to_string()),
            ));
        }
        items.push((key.to_string(), value));
    }
    Ok(items)
}

/// Convert `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn is_single_line(value: &str) -> bool {
    !value.contains(['\n', '\r']) && value.trim() == value
}

/// Render key/value pairs in order. The result always ends with a newline when non-empty.
pub fn dumps<'a, I>(items: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, value) in items {
        if value.is_empty() {
            out.push_str(key);
            out.push_str(":\n");
        } else if is_single_line(value) {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        } else {
            out.push_str(key);
            out.push_str(":\n");
            for line in value.split('\n') {
                out.push_str(INDENT);
                if line.is_empty() {
                    out.push_str(">\n");
                } else {
                    out.push_str("> ");
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(String, String)]) -> Vec<(&str, &str)> {
        items.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn parses_single_and_multi_line_values() {
        let text = "\
# comment
2024-10-30T09:00:00-07:00:
    > first
    >
    > third

2024-10-29T09:00:00-07:00: inline value
2024-10-28T09:00:00-07:00:
";
        let items = loads(text).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].1, "first\n\nthird");
        assert_eq!(items[1].1, "inline value");
        assert_eq!(items[2].1, "");
        assert_eq!(items[0].0, "2024-10-30T09:00:00-07:00");
    }

    #[test]
    fn dump_then_load_preserves_order_and_text() {
        let items = vec![
            ("b".to_string(), "ends with newline\n".to_string()),
            ("a".to_string(), "  leading space".to_string()),
            ("c".to_string(), String::new()),
            ("d".to_string(), "plain".to_string()),
            ("e".to_string(), "trailing space ".to_string()),
        ];
        let text = dumps(pairs(&items));
        assert_eq!(loads(&text).unwrap(), items);
    }

    #[test]
    fn crlf_values_round_trip_once_normalized() {
        let value = normalize_newlines("a\r\nb\rc\r\n");
        assert_eq!(value, "a\nb\nc\n");
        let text = dumps([("k", value.as_str())]);
        assert_eq!(loads(&text).unwrap(), [("k".to_string(), value)]);
    }

    #[test]
    fn crlf_documents_are_read() {
        let items = loads("a:\r\n    > one\r\n    > two\r\nb: x\r\n").unwrap();
        assert_eq!(items[0].1, "one\ntwo");
        assert_eq!(items[1].1, "x");
    }

    #[test]
    fn single_line_values_stay_inline() {
        let text = dumps([("k", "v")]);
        assert_eq!(text, "k: v\n");
    }

    #[test]
    fn empty_document_round_trips() {
        assert!(loads("").unwrap().is_empty());
        assert_eq!(dumps(Vec::<(&str, &str)>::new()), "");
    }

    #[test]
    fn unrecognized_line_is_located() {
        let err = loads("not valid NestedText").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.kind, ParseErrorKind::UnrecognizedLine);
        assert_eq!(err.to_string(), "1: unrecognized line.");
    }

    #[test]
    fn nested_values_are_rejected() {
        let err = loads("key:\n    - item\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::UnsupportedValue);

        let err = loads("- item\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnsupportedValue);
    }

    #[test]
    fn stray_indentation_is_rejected() {
        let err = loads("a: b\n    > c\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::InvalidIndentation);

        let err = loads("a:\n    > b\n  > c\n").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidIndentation);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = loads("a: 1\na: 2\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::DuplicateKey("a".into()));
    }
}
