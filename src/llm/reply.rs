use serde::de::DeserializeOwned;

use crate::error::{Result, ShopgraphError};

/// The text between the first `{` and the last `}` of a model reply.
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Decode the JSON object embedded in a model reply into `T`.
///
/// A missing span, invalid JSON, a missing field or a mistyped field all
/// yield `ShopgraphError::Parse`.
pub fn decode_reply<T: DeserializeOwned>(text: &str) -> Result<T> {
    let span = extract_json_span(text)
        .ok_or_else(|| ShopgraphError::Parse("No JSON object in model reply".to_string()))?;
    serde_json::from_str(span)
        .map_err(|e| ShopgraphError::Parse(format!("Model reply does not match schema: {}", e)))
}
