use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Known layouts of the exception text ClickHouse puts in an HTTP error body,
    /// tried in order.
    static ref ERROR_PATTERNS: [Regex; 3] = [
        // servers prior to v19.3.3 echo the exception type through e.what()
        Regex::new(
            r"(?s)\ACode: (?P<code>\d+), e\.displayText\(\) = (?P<type1>[^ \n]+): (?P<msg>.+?), e.what\(\) = (?P<type2>[^ \n]+)"
        )
        .expect("valid pre-19.3.3 error pattern"),
        // v19.3.3+
        Regex::new(r"(?s)\ACode: (?P<code>\d+), e\.displayText\(\) = (?P<type1>[^ \n]+): (?P<msg>.+)")
            .expect("valid 19.3.3 error pattern"),
        // v21+
        Regex::new(r"(?s)\ACode: (?P<code>\d+). (?P<type1>[^ \n]+): (?P<msg>.+)")
            .expect("valid 21+ error pattern"),
    ];

    static ref TRAILING_TYPE_TAG: Regex =
        Regex::new(r"\s*\([A-Z][A-Z0-9_]*\)(?:\s*\(version [^()]*(?:\([^()]*\)[^()]*)*\))?\s*\z")
            .expect("valid trailing tag pattern");
}

/// Error returned by the server in the body of a non-2xx response.
///
/// `code` is 0 when the body matched none of the known layouts; `message` then holds
/// the body verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: u32,
    pub message: String,
}

impl ServerError {
    #[must_use]
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Decode a raw response body.
    ///
    /// # Examples
    /// ```rust
    /// use clickhouse_middleware::ServerError;
    ///
    /// let err = ServerError::from_response_text(
    ///     "Code: 60. DB::Exception: Table default.nope doesn't exist. (UNKNOWN_TABLE) (version 22.3.3.44 (official build))",
    /// );
    /// assert_eq!(err.code, 60);
    /// assert_eq!(err.message, "Table default.nope doesn't exist.");
    /// ```
    #[must_use]
    pub fn from_response_text(text: &str) -> Self {
        let (code, message) = decode_error_text(text);
        Self { code, message }
    }

    #[must_use]
    pub fn is_decoded(&self) -> bool {
        self.code != 0
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} ({})", self.message, self.code)
        }
    }
}

impl std::error::Error for ServerError {}

/// Split server error text into `(code, message)`.
///
/// Falls back to `(0, text)` when no known layout matches.
#[must_use]
pub fn decode_error_text(text: &str) -> (u32, String) {
    for pattern in ERROR_PATTERNS.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let Some(code) = caps.name("code").and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        let msg = caps.name("msg").map_or("", |m| m.as_str());
        let msg = TRAILING_TYPE_TAG.replace(msg, "");
        return (code, msg.trim().to_string());
    }
    (0, text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pre_19_3_format() {
        let text = "Code: 161, e.displayText() = DB::Exception: Limit for number of columns to read exceeded. Requested: 11, maximum: 1, e.what() = DB::Exception\n";
        assert_eq!(
            decode_error_text(text),
            (
                161,
                "Limit for number of columns to read exceeded. Requested: 11, maximum: 1"
                    .to_string()
            )
        );
    }

    #[test]
    fn decodes_19_3_format() {
        let text = "Code: 164, e.displayText() = DB::Exception: Cannot drop table in readonly mode\n";
        assert_eq!(
            decode_error_text(text),
            (164, "Cannot drop table in readonly mode".to_string())
        );
    }

    #[test]
    fn decodes_21_format_and_strips_type_tag() {
        let text = "Code: 81. DB::Exception: Database nope doesn't exist. (UNKNOWN_DATABASE) (version 21.8.10.19 (official build))\n";
        assert_eq!(
            decode_error_text(text),
            (81, "Database nope doesn't exist.".to_string())
        );
    }

    #[test]
    fn unknown_format_is_kept_verbatim() {
        let text = "502 Bad Gateway\n<html>nginx</html>";
        let err = ServerError::from_response_text(text);
        assert_eq!(err.code, 0);
        assert_eq!(err.message, text);
        assert!(!err.is_decoded());
        assert_eq!(err.to_string(), text);
    }

    #[test]
    fn display_includes_code() {
        let err = ServerError::new(60, "Table x doesn't exist.");
        assert_eq!(err.to_string(), "Table x doesn't exist. (60)");
    }
}
