use std::fmt;

use chrono_tz::Tz;

/// Server version as `(major, minor, patch)`.
///
/// Only the first three numeric components count; `21.8.10.19` compares as `21.8.10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion(pub u32, pub u32, pub u32);

impl ServerVersion {
    /// Assumed when the server refuses to tell.
    pub const FALLBACK: ServerVersion = ServerVersion(1, 1, 0);
    /// Last version without the `timezone()` function.
    pub const WITHOUT_TIMEZONE: ServerVersion = ServerVersion(1, 1, 53981);
    pub const CODEC_SUPPORT: ServerVersion = ServerVersion(19, 1, 16);
    pub const LOW_CARDINALITY_SUPPORT: ServerVersion = ServerVersion(19, 0, 0);

    /// Parse `version()` output. Non-numeric components are skipped.
    ///
    /// Returns `None` when there is no numeric component at all.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text
            .trim()
            .split('.')
            .filter(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|part| part.parse::<u32>().ok());
        let major = parts.next()?;
        Some(ServerVersion(
            major,
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        ))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// What the server can do, detected once per connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCapabilities {
    pub version: ServerVersion,
    pub timezone: Tz,
    pub has_codec_support: bool,
    pub has_low_cardinality_support: bool,
}

impl ServerCapabilities {
    /// Derive the feature flags from a version.
    #[must_use]
    pub fn for_version(version: ServerVersion, timezone: Tz) -> Self {
        Self {
            version,
            timezone,
            has_codec_support: version >= ServerVersion::CODEC_SUPPORT,
            has_low_cardinality_support: version >= ServerVersion::LOW_CARDINALITY_SUPPORT,
        }
    }
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self::for_version(ServerVersion::FALLBACK, Tz::UTC)
    }
}
