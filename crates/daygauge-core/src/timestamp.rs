//! Timestamp wire format shared by both storage backends.
//!
//! Timestamps are RFC 3339 with an explicit offset (`Z` for UTC). A gauge that
//! was never incremented stores the empty string.

use chrono::{DateTime, FixedOffset, SecondsFormat};

/// An instant together with the offset it was observed in.
pub type Timestamp = DateTime<FixedOffset>;

/// Format a timestamp for storage.
pub fn format(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Format an optional timestamp; `None` becomes the empty string.
pub fn format_optional(ts: Option<&Timestamp>) -> String {
    ts.map(format).unwrap_or_default()
}

/// Parse a stored timestamp. The empty string means "never".
pub fn parse_optional(s: &str) -> Result<Option<Timestamp>, chrono::ParseError> {
    if s.is_empty() {
        return Ok(None);
    }
    DateTime::parse_from_rfc3339(s).map(Some)
}

/// Serde adapter for `Option<Timestamp>` using the empty-string convention.
pub mod optional {
    use super::Timestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Timestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_optional(value.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        super::parse_optional(&raw).map_err(serde::de::Error::custom)
    }
}
