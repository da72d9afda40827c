//! Shared types used across the harvester.

use crate::error::HarvestError;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for document identifiers with validation.
///
/// Identifiers follow the hyphenated `8-4-4-4-12` shape used by the content
/// endpoint. Anything else is rejected before a fetch is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    /// Create a new `DocId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't have the `8-4-4-4-12` shape.
    pub fn new(id: impl Into<String>) -> Result<Self, HarvestError> {
        let id = id.into();
        if Self::is_valid(&id) {
            Ok(Self(id))
        } else {
            Err(HarvestError::Validation(format!(
                "invalid document ID: expected 8-4-4-4-12 shape, got '{id}'"
            )))
        }
    }

    /// Check whether a raw string is an acceptable document identifier.
    #[must_use]
    pub fn is_valid(id: &str) -> bool {
        static DOC_ID_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = DOC_ID_REGEX
            .get_or_init(|| Regex::new(r"\S{8}-\S{4}-\S{4}-\S{4}-\S{12}").expect("valid regex"));
        regex.is_match(id)
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wrapper around `chrono::DateTime<Utc>` for consistent timestamp handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create a timestamp representing the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Format as RFC3339 string.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
