//! Core identifier types shared across the recorder crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source identifier - uniquely identifies a capture source (camera).
///
/// # Example
/// ```
/// use nvr_common::SourceId;
///
/// let id = SourceId::from("cam-01");
/// assert_eq!(id.as_str(), "cam-01");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a new SourceId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the source ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_id() {
        let id = SourceId::from("front-door");
        assert_eq!(id.as_str(), "front-door");
        assert_eq!(id.to_string(), "front-door");
        assert_eq!(id, SourceId::new(String::from("front-door")));
    }
}
