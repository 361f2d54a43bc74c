use super::ids::{parse_id, to_opaque};
use super::Service;
use crate::error::{DmsError, Result};
use crate::store::{Filter, Record};
use crate::types::{ItemPayload, TableItem};

/// Items of one table, decoded one record per `next()`.
///
/// Backed by a single store read taken when the cursor is created, so it
/// holds every record of the table in memory. Decoding and validation are
/// deferred until each item is reached. `rewind` starts the sequence over
/// without going back to the store.
#[derive(Debug, Clone)]
pub struct ItemCursor {
    records: Vec<Record>,
    position: usize,
}

impl ItemCursor {
    fn new(records: Vec<Record>) -> Self {
        ItemCursor {
            records,
            position: 0,
        }
    }

    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Iterator for ItemCursor {
    type Item = Result<TableItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.get(self.position)?;
        self.position += 1;
        Some(TableItem::from_document(
            to_opaque(record.id),
            record.document.clone(),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.records.len() - self.position;
        (remaining, Some(remaining))
    }
}

impl Service {
    /// All items of a table, in the order the store returns them.
    pub async fn list_items(&self, database: &str, table_id: &str) -> Result<ItemCursor> {
        let table = self.get_table(database, table_id).await?;
        let store = self.store();
        let unit = table.table_name.as_str();
        let filter = Filter::all();
        let filter = &filter;
        let records = self
            .read("list items", move || store.find(database, unit, filter))
            .await?;
        Ok(ItemCursor::new(records))
    }

    pub async fn get_item(&self, database: &str, table_id: &str, item_id: &str) -> Result<TableItem> {
        let id = parse_id("Item", item_id)?;
        let table = self.get_table(database, table_id).await?;
        let store = self.store();
        let unit = table.table_name.as_str();
        let document = self
            .read("find item", move || store.find_one(database, unit, id))
            .await?
            .ok_or_else(|| DmsError::not_found("Item", item_id))?;
        TableItem::from_document(to_opaque(id), document)
    }

    /// Validate the payload against the table's schema and store it as a new item.
    /// Returns the identifier the store assigned.
    pub async fn create_item(
        &self,
        database: &str,
        table_id: &str,
        payload: ItemPayload,
    ) -> Result<String> {
        let table = self.get_table(database, table_id).await?;
        let item = TableItem::for_table(&table, payload)?;

        let id = self
            .store()
            .insert(database, &table.table_name, item.to_document()?)
            .await?;
        log::debug!("Inserted item {id} into '{database}.{}'", table.table_name);
        Ok(to_opaque(id))
    }

    /// Replace the values of an existing item. The identifier does not change.
    pub async fn update_item(
        &self,
        database: &str,
        table_id: &str,
        item_id: &str,
        payload: ItemPayload,
    ) -> Result<String> {
        let id = parse_id("Item", item_id)?;
        let table = self.get_table(database, table_id).await?;
        let item = TableItem::for_table(&table, payload)?;

        let replaced = self
            .store()
            .replace(database, &table.table_name, id, item.to_document()?, false)
            .await?;
        if !replaced {
            return Err(DmsError::not_found("Item", item_id));
        }
        log::debug!("Updated item {id} in '{database}.{}'", table.table_name);
        Ok(to_opaque(id))
    }

    pub async fn delete_item(&self, database: &str, table_id: &str, item_id: &str) -> Result<String> {
        let id = parse_id("Item", item_id)?;
        let table = self.get_table(database, table_id).await?;

        if !self.store().delete(database, &table.table_name, id).await? {
            return Err(DmsError::not_found("Item", item_id));
        }
        log::debug!("Deleted item {id} from '{database}.{}'", table.table_name);
        Ok(to_opaque(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::memory::FailPoint;
    use crate::store::{BackingStore, MemoryStore};
    use crate::types::{Database, Field, FieldType, FieldValue};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    async fn setup() -> (Arc<MemoryStore>, Service, String) {
        let store = Arc::new(MemoryStore::new());
        let service = Service::new(store.clone());
        service.create_database(&Database::new("shop")).await.unwrap();
        let table_id = service
            .create_table(
                "shop",
                "orders",
                vec![
                    Field::new("quantity", FieldType::Integer),
                    Field::new("price", FieldType::Real),
                ],
            )
            .await
            .unwrap();
        (store, service, table_id)
    }

    fn payload(value: serde_json::Value) -> ItemPayload {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_item() {
        let (_store, service, table_id) = setup().await;
        let id = service
            .create_item("shop", &table_id, payload(json!({"quantity": 3, "price": 19.99})))
            .await
            .unwrap();

        let item = service.get_item("shop", &table_id, &id).await.unwrap();
        assert_eq!(item.id.as_deref(), Some(id.as_str()));
        assert_eq!(item.get("quantity"), Some(&FieldValue::Integer(3)));
        assert_eq!(item.values(), payload_map(json!({"quantity": 3, "price": 19.99})));
    }

    fn payload_map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_item_is_never_persisted() {
        let (_store, service, table_id) = setup().await;
        let err = service
            .create_item("shop", &table_id, payload(json!({"quantity": "three", "price": 19.99})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert_eq!(service.list_items("shop", &table_id).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_update_item_keeps_identifier() {
        let (_store, service, table_id) = setup().await;
        let id = service
            .create_item("shop", &table_id, payload(json!({"quantity": 1, "price": 1.5})))
            .await
            .unwrap();

        let updated = service
            .update_item("shop", &table_id, &id, payload(json!({"quantity": 2, "price": 2.5})))
            .await
            .unwrap();
        assert_eq!(updated, id);
        let item = service.get_item("shop", &table_id, &id).await.unwrap();
        assert_eq!(item.get("price"), Some(&FieldValue::Real(2.5)));

        let err = service
            .update_item("shop", &table_id, &id, payload(json!({"quantity": 2.0, "price": 2.5})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        let item = service.get_item("shop", &table_id, &id).await.unwrap();
        assert_eq!(item.get("quantity"), Some(&FieldValue::Integer(2)));
    }

    #[tokio::test]
    async fn test_missing_item_is_not_found() {
        let (_store, service, table_id) = setup().await;
        let absent = crate::store::ObjectId::new().to_string();

        let err = service
            .update_item("shop", &table_id, &absent, payload(json!({"quantity": 1, "price": 1.0})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service.delete_item("shop", &table_id, &absent).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service.get_item("shop", &table_id, &absent).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_item() {
        let (_store, service, table_id) = setup().await;
        let id = service
            .create_item("shop", &table_id, payload(json!({"quantity": 1, "price": 1.0})))
            .await
            .unwrap();
        assert_eq!(service.delete_item("shop", &table_id, &id).await.unwrap(), id);
        assert!(service.list_items("shop", &table_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_identifiers_are_client_errors() {
        let (_store, service, table_id) = setup().await;
        let err = service.get_item("shop", &table_id, "123").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        let err = service.list_items("shop", "orders").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
    }

    #[tokio::test]
    async fn test_cursor_is_lazy_and_restartable() {
        let (_store, service, table_id) = setup().await;
        for n in 1..=3 {
            service
                .create_item("shop", &table_id, payload(json!({"quantity": n, "price": 0.5})))
                .await
                .unwrap();
        }

        let mut cursor = service.list_items("shop", &table_id).await.unwrap();
        assert_eq!(cursor.size_hint(), (3, Some(3)));
        let first_pass: Vec<TableItem> = cursor.by_ref().collect::<Result<_>>().unwrap();
        assert_eq!(first_pass.len(), 3);
        assert!(cursor.next().is_none());

        cursor.rewind();
        let second_pass: Vec<TableItem> = cursor.collect::<Result<_>>().unwrap();
        assert_eq!(first_pass, second_pass);
    }

    #[tokio::test]
    async fn test_cursor_defers_decoding() {
        let (store, service, table_id) = setup().await;
        let mut bad = crate::store::Document::new();
        bad.insert("items".into(), json!([{"field_name": "quantity", "field_value": 1}]));
        store.insert("shop", "orders", bad).await.unwrap();

        let mut cursor = service.list_items("shop", &table_id).await.unwrap();
        assert_eq!(cursor.len(), 1);
        let err = cursor.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
        assert!(cursor.next().is_none());
    }

    #[tokio::test]
    async fn test_failed_insert_reports_unavailable() {
        let (store, service, table_id) = setup().await;
        store.fail_next(FailPoint::Insert);
        let err = service
            .create_item("shop", &table_id, payload(json!({"quantity": 1, "price": 1.0})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(service.list_items("shop", &table_id).await.unwrap().is_empty());
    }
}
