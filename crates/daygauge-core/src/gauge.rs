//! The gauge entity and its name rules.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GaugeError;
use crate::timestamp::{self, Timestamp};

/// Storage-internal surrogate key of a gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GaugeId(pub i64);

impl fmt::Display for GaugeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated gauge name: one or more ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GaugeName(String);

impl GaugeName {
    /// Validate a raw name.
    ///
    /// # Errors
    /// Returns [`GaugeError::InvalidName`] if the name is empty or contains
    /// anything other than `a-z`/`A-Z`.
    pub fn parse(raw: &str) -> Result<Self, GaugeError> {
        if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(GaugeError::InvalidName {
                name: raw.to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for GaugeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GaugeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of a gauge's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gauge {
    pub name: String,
    pub value: i64,
    /// Most recent successful increment; `None` if never incremented.
    #[serde(with = "timestamp::optional", default)]
    pub last_increase: Option<Timestamp>,
}

impl Gauge {
    /// A freshly created gauge that has never been incremented.
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            last_increase: None,
        }
    }
}
