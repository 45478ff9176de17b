use crate::error::ClickhouseDbError;

use super::unescape;

/// One element of an array literal such as `['a','b']` or `[[1,2],[3]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayElement {
    /// A single-quoted element, already unescaped.
    Quoted(String),
    /// Anything else, verbatim: numbers, `NULL`, nested arrays, tuples.
    Bare(String),
}

#[derive(Clone, Copy)]
enum State {
    Between,
    Quoted,
    QuotedEscape,
    Bare { depth: u32 },
    BareQuoted { depth: u32 },
    BareQuotedEscape { depth: u32 },
}

/// Parse the text of an array literal into its top-level elements.
///
/// # Errors
/// Returns `ParseError` if the text is not a bracketed, well-formed list.
pub fn parse_array(text: &str) -> Result<Vec<ArrayElement>, ClickhouseDbError> {
    let invalid = || ClickhouseDbError::ParseError(format!("invalid array literal: {text:?}"));

    let inner = text
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(invalid)?;

    let mut elements = Vec::new();
    let mut state = State::Between;
    let mut start = 0;

    for (idx, c) in inner.char_indices() {
        state = match state {
            State::Between => match c {
                ',' | ' ' => State::Between,
                '\'' => {
                    start = idx;
                    State::Quoted
                }
                '[' | '(' => {
                    start = idx;
                    State::Bare { depth: 1 }
                }
                _ => {
                    start = idx;
                    State::Bare { depth: 0 }
                }
            },
            State::Quoted => match c {
                '\\' => State::QuotedEscape,
                '\'' => {
                    let body = &inner[start + 1..idx];
                    elements.push(ArrayElement::Quoted(unescape(body)?.into_owned()));
                    State::Between
                }
                _ => State::Quoted,
            },
            State::QuotedEscape => State::Quoted,
            State::Bare { depth } => match c {
                '[' | '(' => State::Bare { depth: depth + 1 },
                ']' | ')' if depth == 0 => return Err(invalid()),
                ']' | ')' => State::Bare { depth: depth - 1 },
                '\'' => State::BareQuoted { depth },
                ',' if depth == 0 => {
                    elements.push(ArrayElement::Bare(inner[start..idx].trim().to_string()));
                    State::Between
                }
                _ => State::Bare { depth },
            },
            State::BareQuoted { depth } => match c {
                '\\' => State::BareQuotedEscape { depth },
                '\'' => State::Bare { depth },
                _ => State::BareQuoted { depth },
            },
            State::BareQuotedEscape { depth } => State::BareQuoted { depth },
        };
    }

    match state {
        State::Between => {}
        State::Bare { depth: 0 } => {
            elements.push(ArrayElement::Bare(inner[start..].trim().to_string()));
        }
        _ => return Err(invalid()),
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_empty_array() {
        assert!(parse_array("[]").unwrap().is_empty());
    }

    #[test]
    fn parses_numbers_and_nulls() {
        assert_eq!(
            parse_array("[1,NULL,-3.5]").unwrap(),
            vec![
                ArrayElement::Bare("1".into()),
                ArrayElement::Bare("NULL".into()),
                ArrayElement::Bare("-3.5".into()),
            ]
        );
    }

    #[test]
    fn parses_quoted_strings_with_escapes() {
        assert_eq!(
            parse_array("['a,b','it\\'s','tab\\there']").unwrap(),
            vec![
                ArrayElement::Quoted("a,b".into()),
                ArrayElement::Quoted("it's".into()),
                ArrayElement::Quoted("tab\there".into()),
            ]
        );
    }

    #[test]
    fn keeps_nested_arrays_whole() {
        assert_eq!(
            parse_array("[[1,2],[],['x]']]").unwrap(),
            vec![
                ArrayElement::Bare("[1,2]".into()),
                ArrayElement::Bare("[]".into()),
                ArrayElement::Bare("['x]']".into()),
            ]
        );
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(parse_array("[1,2").is_err());
        assert!(parse_array("['open]").is_err());
        assert!(parse_array("1,2]").is_err());
    }
}
