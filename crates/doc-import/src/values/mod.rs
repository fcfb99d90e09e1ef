pub mod id;

pub use id::DocumentId;

use serde_json::Value;

/// Collection name type alias for clarity.
pub type CollectionName = String;

/// Returns the JSON type name of a value, useful for error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
