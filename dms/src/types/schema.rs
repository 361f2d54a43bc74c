use super::field_type::FieldType;
use crate::error::{DmsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named, typed column of a table. Carries no value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub field_name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(field_name: impl Into<String>, field_type: FieldType) -> Self {
        Field {
            field_name: field_name.into(),
            field_type,
        }
    }
}

/// Schema record of a table, stored in its database's metadata registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Assigned by the backing store when the schema record is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub database_name: String,
    pub table_name: String,
    pub table_fields: Vec<Field>,
}

impl Table {
    pub fn new(
        database_name: impl Into<String>,
        table_name: impl Into<String>,
        table_fields: Vec<Field>,
    ) -> Self {
        Table {
            id: None,
            database_name: database_name.into(),
            table_name: table_name.into(),
            table_fields,
        }
    }

    /// Names of all fields in the table.
    pub fn columns(&self) -> HashSet<&str> {
        self.table_fields
            .iter()
            .map(|f| f.field_name.as_str())
            .collect()
    }

    /// Field with the given name, if the table has one.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.table_fields.iter().find(|f| f.field_name == name)
    }

    /// Structural checks made before a table is registered: a non-empty name
    /// and non-empty, unique field names.
    pub fn check(&self) -> Result<()> {
        if self.table_name.trim().is_empty() {
            return Err(DmsError::InvalidValue("table name must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for field in &self.table_fields {
            if field.field_name.trim().is_empty() {
                return Err(DmsError::InvalidValue(format!(
                    "table '{}' has a field with an empty name",
                    self.table_name
                )));
            }
            if !seen.insert(field.field_name.as_str()) {
                return Err(DmsError::InvalidValue(format!(
                    "table '{}' declares field '{}' more than once",
                    self.table_name, field.field_name
                )));
            }
        }
        Ok(())
    }

    /// Schema record as stored in the metadata registry (the id lives outside it).
    pub(crate) fn to_document(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let mut record = self.clone();
        record.id = None;
        match serde_json::to_value(record)? {
            serde_json::Value::Object(map) => Ok(map),
            _ => Err(DmsError::InvalidValue("schema record must be an object".into())),
        }
    }

    pub(crate) fn from_document(
        id: String,
        document: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        let mut table: Table = serde_json::from_value(serde_json::Value::Object(document))?;
        table.id = Some(id);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn orders() -> Table {
        Table::new(
            "shop",
            "orders",
            vec![
                Field::new("quantity", FieldType::Integer),
                Field::new("price", FieldType::Real),
            ],
        )
    }

    #[test]
    fn test_columns_and_field_lookup() {
        let table = orders();
        assert_eq!(table.columns(), HashSet::from(["quantity", "price"]));
        assert_eq!(table.field("price").map(|f| f.field_type), Some(FieldType::Real));
        assert!(table.field("discount").is_none());
    }

    #[test]
    fn test_check_rejects_duplicate_fields() {
        let mut table = orders();
        table.table_fields.push(Field::new("price", FieldType::String));
        let err = table.check().unwrap_err();
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn test_check_rejects_empty_names() {
        let mut table = orders();
        table.table_name = " ".into();
        assert!(table.check().is_err());

        let mut table = orders();
        table.table_fields.push(Field::new("", FieldType::Char));
        assert!(table.check().is_err());

        assert!(orders().check().is_ok());
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(orders()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "database_name": "shop",
                "table_name": "orders",
                "table_fields": [
                    {"field_name": "quantity", "field_type": "integer"},
                    {"field_name": "price", "field_type": "real"},
                ],
            })
        );
    }

    #[test]
    fn test_document_keeps_id_outside() {
        let mut table = orders();
        table.id = Some("01hq".into());
        let doc = table.to_document().unwrap();
        assert!(!doc.contains_key("id"));

        let restored = Table::from_document("01hq".into(), doc).unwrap();
        assert_eq!(restored, table);
    }
}
