//! Form value encoding.
//!
//! The list endpoint expects UTF-8 percent-encoded values for `Param`,
//! `Order`, the session GUID and the token.

use crate::error::HarvestError;

/// Percent-encode a form value as UTF-8.
#[must_use]
pub fn encode_value(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Decode a percent-encoded value. `+` is read as a space.
pub fn decode_value(value: &str) -> Result<String, HarvestError> {
    let spaced = value.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| HarvestError::Validation(format!("invalid percent-encoding: {e}")))
}
