//! TabSeparated text codec: escaping, line splitting and array literals.

use std::borrow::Cow;

use crate::error::ClickhouseDbError;

mod array;

pub use array::{parse_array, ArrayElement};

/// How a NULL is written in a TabSeparated field.
pub const NULL_FIELD: &str = "\\N";

fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '\u{8}' => Some("\\b"),
        '\u{c}' => Some("\\f"),
        '\r' => Some("\\r"),
        '\n' => Some("\\n"),
        '\t' => Some("\\t"),
        '\0' => Some("\\0"),
        '\\' => Some("\\\\"),
        '\'' => Some("\\'"),
        _ => None,
    }
}

/// Escape a string for a TabSeparated field or a quoted literal.
///
/// Returns a borrowed `Cow` when nothing needs escaping.
#[must_use]
pub fn escape(value: &str) -> Cow<'_, str> {
    let mut out: Option<String> = None;
    for (idx, c) in value.char_indices() {
        match escape_char(c) {
            Some(seq) => {
                out.get_or_insert_with(|| value[..idx].to_string())
                    .push_str(seq);
            }
            None => {
                if let Some(buf) = out.as_mut() {
                    buf.push(c);
                }
            }
        }
    }
    match out {
        Some(buf) => Cow::Owned(buf),
        None => Cow::Borrowed(value),
    }
}

/// Escape and wrap in single quotes, for SQL and array literals.
#[must_use]
pub fn quote(value: &str) -> String {
    format!("'{}'", escape(value))
}

/// Reverse [`escape`]. Unknown escape sequences yield the escaped character itself.
///
/// # Errors
/// Returns `ParseError` on a dangling backslash.
pub fn unescape(value: &str) -> Result<Cow<'_, str>, ClickhouseDbError> {
    if !value.contains('\\') {
        return Ok(Cow::Borrowed(value));
    }
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            return Err(ClickhouseDbError::ParseError(format!(
                "dangling escape at end of field: {value:?}"
            )));
        };
        out.push(match next {
            'b' => '\u{8}',
            'f' => '\u{c}',
            'r' => '\r',
            'n' => '\n',
            't' => '\t',
            '0' => '\0',
            other => other,
        });
    }
    Ok(Cow::Owned(out))
}

/// Split one line into its raw (still escaped) fields.
#[must_use]
pub fn split_line(line: &str) -> Vec<&str> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.split('\t').collect()
}

/// Split one line and unescape every field.
///
/// # Errors
/// Returns `ParseError` if a field carries a dangling escape.
pub fn parse_tsv(line: &str) -> Result<Vec<String>, ClickhouseDbError> {
    split_line(line)
        .into_iter()
        .map(|field| unescape(field).map(Cow::into_owned))
        .collect()
}

/// Escape a TSKV key; `=` separates key and value so it is escaped as well.
#[must_use]
pub fn escape_key(key: &str) -> Cow<'_, str> {
    let escaped = escape(key);
    if escaped.contains('=') {
        Cow::Owned(escaped.replace('=', "\\="))
    } else {
        escaped
    }
}
