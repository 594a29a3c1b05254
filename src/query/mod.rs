//! Structured purchase intent and its extraction from natural language.

mod interpreter;

pub use interpreter::QueryInterpreter;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Structured representation of a purchase query.
///
/// All six fields are required when decoding a model reply. The four list
/// fields must be lists of strings; the two text fields accept any JSON
/// value (`null` reads as empty, other scalars as their JSON text).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(deserialize_with = "loose_text")]
    pub product_category: String,
    #[serde(deserialize_with = "loose_text")]
    pub price_range: String,
    pub user_groups: Vec<String>,
    pub explicit_needs: Vec<String>,
    pub implicit_needs: Vec<String>,
    pub usage_scenarios: Vec<String>,
}

fn loose_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    })
}
