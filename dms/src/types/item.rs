use super::field_type::{FieldType, FieldValue};
use super::schema::Table;
use crate::error::{DmsError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};

/// A value bound to a named field. Only constructible through validation,
/// so an instance always holds a canonical value of its declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableItemField {
    field_name: String,
    field_type: FieldType,
    field_value: FieldValue,
}

impl TableItemField {
    /// Validate `raw` against `field_type` and bind it to `field_name`.
    pub fn new(
        field_name: impl Into<String>,
        field_type: FieldType,
        raw: &serde_json::Value,
    ) -> Result<Self> {
        let field_name = field_name.into();
        let field_value = field_type
            .validate(raw)
            .map_err(|e| DmsError::InvalidValue(format!("field '{field_name}': {e}")))?;
        Ok(TableItemField {
            field_name,
            field_type,
            field_value,
        })
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn field_value(&self) -> &FieldValue {
        &self.field_value
    }
}

/// Unvalidated field as it arrives over the wire or out of storage.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawItemField {
    pub field_name: String,
    #[serde(default)]
    pub field_type: Option<FieldType>,
    pub field_value: serde_json::Value,
}

impl<'de> Deserialize<'de> for TableItemField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawItemField::deserialize(deserializer)?;
        let field_type = raw
            .field_type
            .ok_or_else(|| serde::de::Error::missing_field("field_type"))?;
        TableItemField::new(raw.field_name, field_type, &raw.field_value)
            .map_err(serde::de::Error::custom)
    }
}

/// Values submitted for an item: either the explicit `items` list or a plain
/// `{field: value}` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ItemPayload {
    Fields(FieldList),
    Values(serde_json::Map<String, serde_json::Value>),
}

/// The `{"items": [...]}` form of a payload. Any other top-level key is
/// collected into `extra` and rejected when the item is built.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldList {
    pub items: Vec<RawItemField>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ItemPayload {
    fn into_raw_fields(self) -> Result<Vec<RawItemField>> {
        match self {
            ItemPayload::Fields(FieldList { items, extra }) => {
                if !extra.is_empty() {
                    let keys: Vec<&str> = extra.keys().map(String::as_str).collect();
                    return Err(DmsError::InvalidValue(format!(
                        "unexpected keys next to 'items': {}",
                        keys.join(", ")
                    )));
                }
                Ok(items)
            }
            ItemPayload::Values(map) => Ok(map
                .into_iter()
                .map(|(field_name, field_value)| RawItemField {
                    field_name,
                    field_type: None,
                    field_value,
                })
                .collect()),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ItemPayload {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        ItemPayload::Values(map)
    }
}

/// A row of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableItem {
    /// Assigned by the backing store on insert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    items: Vec<TableItemField>,
}

impl TableItem {
    /// Bind a payload to a table's schema.
    ///
    /// The field set must equal the table's columns exactly: no missing, unknown
    /// or repeated fields. A declared `field_type` must agree with the schema.
    /// Fields come out in the table's column order.
    pub fn for_table(table: &Table, payload: ItemPayload) -> Result<Self> {
        let mut bound: HashMap<String, TableItemField> = HashMap::new();

        for raw in payload.into_raw_fields()? {
            let field = table.field(&raw.field_name).ok_or_else(|| {
                DmsError::InvalidValue(format!(
                    "table '{}' has no field '{}'",
                    table.table_name, raw.field_name
                ))
            })?;

            if let Some(declared) = raw.field_type {
                if declared != field.field_type {
                    return Err(DmsError::InvalidValue(format!(
                        "field '{}' is declared as {declared} but the table defines it as {}",
                        raw.field_name, field.field_type
                    )));
                }
            }

            if bound.contains_key(&raw.field_name) {
                return Err(DmsError::InvalidValue(format!(
                    "field '{}' is given more than once",
                    raw.field_name
                )));
            }

            let item_field = TableItemField::new(raw.field_name, field.field_type, &raw.field_value)?;
            bound.insert(item_field.field_name.clone(), item_field);
        }

        let missing: BTreeSet<&str> = table
            .columns()
            .into_iter()
            .filter(|name| !bound.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(DmsError::InvalidValue(format!(
                "missing fields for table '{}': {}",
                table.table_name,
                missing.into_iter().collect::<Vec<_>>().join(", ")
            )));
        }

        let items = table
            .table_fields
            .iter()
            .filter_map(|f| bound.remove(&f.field_name))
            .collect();
        Ok(TableItem { id: None, items })
    }

    pub fn items(&self) -> &[TableItemField] {
        &self.items
    }

    /// Value of the named field, if present.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.items
            .iter()
            .find(|f| f.field_name == name)
            .map(|f| &f.field_value)
    }

    /// `{field: canonical value}` view of the item.
    pub fn values(&self) -> serde_json::Map<String, serde_json::Value> {
        self.items
            .iter()
            .map(|f| (f.field_name.clone(), f.field_value.to_json()))
            .collect()
    }

    pub(crate) fn to_document(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        let mut doc = serde_json::Map::new();
        doc.insert("items".into(), serde_json::to_value(&self.items)?);
        Ok(doc)
    }

    /// Rebuild a stored record. Stored values go through validation again.
    pub(crate) fn from_document(
        id: String,
        mut document: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        let items = document
            .remove("items")
            .ok_or_else(|| DmsError::InvalidValue(format!("stored item {id} has no fields")))?;
        let items: Vec<TableItemField> = serde_json::from_value(items)
            .map_err(|e| DmsError::InvalidValue(format!("stored item {id}: {e}")))?;
        Ok(TableItem {
            id: Some(id),
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Field;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn orders() -> Table {
        Table::new(
            "shop",
            "orders",
            vec![
                Field::new("quantity", FieldType::Integer),
                Field::new("price", FieldType::Real),
                Field::new("window", FieldType::DateInterval),
            ],
        )
    }

    fn payload(value: serde_json::Value) -> ItemPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_field_construction_validates() {
        assert!(TableItemField::new("quantity", FieldType::Integer, &json!(3)).is_ok());
        let err = TableItemField::new("quantity", FieldType::Integer, &json!("three")).unwrap_err();
        assert!(matches!(err, DmsError::InvalidValue(_)));
        assert!(err.to_string().contains("quantity"));
    }

    #[test]
    fn test_field_deserialization_validates() {
        let ok: std::result::Result<TableItemField, _> = serde_json::from_value(json!({
            "field_name": "d", "field_type": "date", "field_value": "2024-01-01"
        }));
        assert_eq!(ok.unwrap().field_value().to_json(), json!("2024-01-01T00:00:00Z"));

        let bad: std::result::Result<TableItemField, _> = serde_json::from_value(json!({
            "field_name": "c", "field_type": "char", "field_value": "too long"
        }));
        assert!(bad.is_err());
    }

    #[test]
    fn test_for_table_orders_fields_by_schema() {
        let item = TableItem::for_table(
            &orders(),
            payload(json!({
                "window": ["2024-01-01", "2024-01-31"],
                "price": 19.99,
                "quantity": 3,
            })),
        )
        .unwrap();

        let names: Vec<&str> = item.items().iter().map(|f| f.field_name()).collect();
        assert_eq!(names, vec!["quantity", "price", "window"]);
        assert_eq!(item.get("quantity"), Some(&FieldValue::Integer(3)));
    }

    #[test]
    fn test_for_table_accepts_items_list() {
        let item = TableItem::for_table(
            &orders(),
            payload(json!({"items": [
                {"field_name": "quantity", "field_type": "integer", "field_value": 1},
                {"field_name": "price", "field_value": 2.5},
                {"field_name": "window", "field_type": "dateInvl",
                 "field_value": {"start_date": "2024-01-01", "end_date": "2024-01-02"}},
            ]})),
        )
        .unwrap();
        assert_eq!(item.get("price"), Some(&FieldValue::Real(2.5)));
    }

    #[test]
    fn test_for_table_rejects_missing_unknown_and_invalid() {
        let missing = TableItem::for_table(&orders(), payload(json!({"quantity": 3})));
        let msg = missing.unwrap_err().to_string();
        assert!(msg.contains("price") && msg.contains("window"), "{msg}");

        let unknown = TableItem::for_table(
            &orders(),
            payload(json!({"quantity": 3, "price": 1.5, "window": ["2024-01-01", "2024-01-02"], "note": "x"})),
        );
        assert!(unknown.unwrap_err().to_string().contains("note"));

        let invalid = TableItem::for_table(
            &orders(),
            payload(json!({"quantity": "three", "price": 19.99, "window": ["2024-01-01", "2024-01-02"]})),
        );
        assert!(matches!(invalid, Err(DmsError::InvalidValue(_))));
    }

    #[test]
    fn test_items_list_rejects_extra_keys() {
        let table = Table::new("shop", "orders", vec![Field::new("quantity", FieldType::Integer)]);
        let extra = payload(json!({
            "items": [{"field_name": "quantity", "field_value": 3}],
            "note": "x",
        }));
        assert!(matches!(extra, ItemPayload::Fields(_)));

        let err = TableItem::for_table(&table, extra).unwrap_err();
        assert!(matches!(err, DmsError::InvalidValue(_)));
        assert!(err.to_string().contains("note"), "{err}");
    }

    #[test]
    fn test_for_table_rejects_type_disagreement_and_duplicates() {
        let wrong_type = TableItem::for_table(
            &orders(),
            payload(json!({"items": [
                {"field_name": "quantity", "field_type": "real", "field_value": 1.0},
            ]})),
        );
        assert!(wrong_type.unwrap_err().to_string().contains("declared"));

        let duplicate = TableItem::for_table(
            &orders(),
            payload(json!({"items": [
                {"field_name": "quantity", "field_value": 1},
                {"field_name": "quantity", "field_value": 2},
            ]})),
        );
        assert!(duplicate.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_document_round_trip() {
        let item = TableItem::for_table(
            &orders(),
            payload(json!({"quantity": 3, "price": 19.99, "window": ["Jan 1, 2024", "2024-02-01"]})),
        )
        .unwrap();

        let doc = item.to_document().unwrap();
        assert_eq!(
            doc["items"][2],
            json!({
                "field_name": "window",
                "field_type": "dateInvl",
                "field_value": {"start_date": "2024-01-01T00:00:00Z", "end_date": "2024-02-01T00:00:00Z"},
            })
        );

        let restored = TableItem::from_document("abc".into(), doc).unwrap();
        assert_eq!(restored.id.as_deref(), Some("abc"));
        assert_eq!(restored.items(), item.items());
    }

    #[test]
    fn test_corrupt_stored_item_is_rejected() {
        let mut doc = serde_json::Map::new();
        doc.insert(
            "items".into(),
            json!([{"field_name": "quantity", "field_type": "integer", "field_value": "x"}]),
        );
        assert!(TableItem::from_document("abc".into(), doc).is_err());
    }
}
