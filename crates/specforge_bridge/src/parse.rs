//! Parse and wire-validate stages
//!
//! Model output rarely arrives as clean JSON: it comes wrapped in
//! markdown fences, preceded by prose, or trailed by commentary. The
//! parse stage cuts the outermost JSON object out of the raw text and
//! parses it; wire validation then checks the value against the loose
//! [`WireDocument`] shape. Both failures are terminal for the bridge
//! attempt.

use crate::error::{BridgeError, Result};
use serde_json::Value;
use specforge_protocol::WireDocument;

/// Cut the outermost JSON object out of raw model text. Tolerates
/// markdown fences and surrounding prose by slicing from the first
/// `{` to the last `}`.
pub fn extract_json(raw: &str) -> Result<&str> {
    let start = raw.find('{').ok_or(BridgeError::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(BridgeError::NoJsonObject)?;
    if end < start {
        return Err(BridgeError::NoJsonObject);
    }
    Ok(&raw[start..=end])
}

/// Parse stage: raw model text to a JSON value.
pub fn parse_value(raw: &str) -> Result<Value> {
    let json = extract_json(raw)?;
    let value: Value = serde_json::from_str(json)?;
    if !value.is_object() {
        return Err(BridgeError::NoJsonObject);
    }
    Ok(value)
}

/// Wire-validate stage: a parsed value against the loose document
/// shape.
pub fn wire_from_value(value: Value) -> Result<WireDocument> {
    serde_json::from_value(value).map_err(|e| BridgeError::WireShape(e.to_string()))
}
