mod database;
mod date;
mod field_type;
mod item;
mod schema;

pub use database::Database;
pub use date::{format_date, parse_date, DateInterval};
pub use field_type::{FieldType, FieldValue};
pub use item::{FieldList, ItemPayload, RawItemField, TableItem, TableItemField};
pub use schema::{Field, Table};

/// Human-readable JSON type name for error messages.
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_f64() => "real",
        serde_json::Value::Number(_) => "integer",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "object",
    }
}
