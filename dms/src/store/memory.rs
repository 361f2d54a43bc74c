use super::{
    BackingStore, Document, Filter, ObjectId, Record, StoreError, StoreResult, SYSTEM_DATABASES,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;

type Unit = BTreeMap<ObjectId, Document>;
type Units = HashMap<String, Unit>;

/// Store operations that can be made to fail on purpose in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateUnit,
    DropUnit,
    Insert,
    Replace,
    Delete,
}

/// Backing store that keeps everything in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    databases: RwLock<HashMap<String, Units>>,
    online: AtomicBool,
    fail_points: Mutex<HashSet<FailPoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let databases = SYSTEM_DATABASES
            .iter()
            .map(|name| (name.to_string(), Units::new()))
            .collect();
        MemoryStore {
            databases: RwLock::new(databases),
            online: AtomicBool::new(true),
            fail_points: Mutex::new(HashSet::new()),
        }
    }

    /// While offline every operation fails with `Unavailable`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make the next call of `point` fail with `Unavailable`.
    pub fn fail_next(&self, point: FailPoint) {
        if let Ok(mut points) = self.fail_points.lock() {
            points.insert(point);
        }
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }

    fn check(&self, point: FailPoint) -> StoreResult<()> {
        self.check_online()?;
        let tripped = self
            .fail_points
            .lock()
            .map(|mut points| points.remove(&point))
            .unwrap_or(false);
        if tripped {
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

fn missing_unit(database: &str, unit: &str) -> StoreError {
    StoreError::UnitMissing {
        database: database.to_string(),
        unit: unit.to_string(),
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.check_online()
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        self.check_online()?;
        let mut names: Vec<String> = self.databases.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_database(&self, name: &str) -> StoreResult<()> {
        self.check_online()?;
        self.databases
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> StoreResult<()> {
        self.check_online()?;
        self.databases.write().await.remove(name);
        Ok(())
    }

    async fn list_units(&self, database: &str) -> StoreResult<Vec<String>> {
        self.check_online()?;
        let databases = self.databases.read().await;
        let mut names: Vec<String> = databases
            .get(database)
            .map(|units| units.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn create_unit(&self, database: &str, unit: &str) -> StoreResult<()> {
        self.check(FailPoint::CreateUnit)?;
        let mut databases = self.databases.write().await;
        let units = databases.entry(database.to_string()).or_default();
        if units.contains_key(unit) {
            return Err(StoreError::UnitExists {
                database: database.to_string(),
                unit: unit.to_string(),
            });
        }
        units.insert(unit.to_string(), Unit::new());
        Ok(())
    }

    async fn drop_unit(&self, database: &str, unit: &str) -> StoreResult<()> {
        self.check(FailPoint::DropUnit)?;
        if let Some(units) = self.databases.write().await.get_mut(database) {
            units.remove(unit);
        }
        Ok(())
    }

    async fn insert(&self, database: &str, unit: &str, document: Document) -> StoreResult<ObjectId> {
        self.check(FailPoint::Insert)?;
        let mut databases = self.databases.write().await;
        let records = databases
            .get_mut(database)
            .and_then(|units| units.get_mut(unit))
            .ok_or_else(|| missing_unit(database, unit))?;
        let id = ObjectId::new();
        records.insert(id, document);
        Ok(id)
    }

    async fn find(&self, database: &str, unit: &str, filter: &Filter) -> StoreResult<Vec<Record>> {
        self.check_online()?;
        let databases = self.databases.read().await;
        let records = databases
            .get(database)
            .and_then(|units| units.get(unit))
            .ok_or_else(|| missing_unit(database, unit))?;
        Ok(records
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, doc)| Record {
                id: *id,
                document: doc.clone(),
            })
            .collect())
    }

    async fn find_one(&self, database: &str, unit: &str, id: ObjectId) -> StoreResult<Option<Document>> {
        self.check_online()?;
        let databases = self.databases.read().await;
        let records = databases
            .get(database)
            .and_then(|units| units.get(unit))
            .ok_or_else(|| missing_unit(database, unit))?;
        Ok(records.get(&id).cloned())
    }

    async fn replace(
        &self,
        database: &str,
        unit: &str,
        id: ObjectId,
        document: Document,
        upsert: bool,
    ) -> StoreResult<bool> {
        self.check(FailPoint::Replace)?;
        let mut databases = self.databases.write().await;
        let records = databases
            .get_mut(database)
            .and_then(|units| units.get_mut(unit))
            .ok_or_else(|| missing_unit(database, unit))?;
        if !upsert && !records.contains_key(&id) {
            return Ok(false);
        }
        records.insert(id, document);
        Ok(true)
    }

    async fn delete(&self, database: &str, unit: &str, id: ObjectId) -> StoreResult<bool> {
        self.check(FailPoint::Delete)?;
        let mut databases = self.databases.write().await;
        let records = databases
            .get_mut(database)
            .and_then(|units| units.get_mut(unit))
            .ok_or_else(|| missing_unit(database, unit))?;
        Ok(records.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_system_databases_are_listed() {
        let store = MemoryStore::new();
        assert_eq!(store.list_databases().await.unwrap(), vec!["admin", "config", "local"]);
    }

    #[tokio::test]
    async fn test_unit_lifecycle() {
        let store = MemoryStore::new();
        store.create_unit("shop", "orders").await.unwrap();
        assert!(store.list_databases().await.unwrap().contains(&"shop".to_string()));
        assert!(matches!(
            store.create_unit("shop", "orders").await,
            Err(StoreError::UnitExists { .. })
        ));

        store.drop_unit("shop", "orders").await.unwrap();
        assert!(store.list_units("shop").await.unwrap().is_empty());
        assert!(store.list_units("nowhere").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_crud() {
        let store = MemoryStore::new();
        store.create_unit("shop", "orders").await.unwrap();

        let id = store.insert("shop", "orders", doc(json!({"n": 1}))).await.unwrap();
        assert_eq!(
            store.find_one("shop", "orders", id).await.unwrap(),
            Some(doc(json!({"n": 1})))
        );

        assert!(store.replace("shop", "orders", id, doc(json!({"n": 2})), false).await.unwrap());
        let found = store.find("shop", "orders", &Filter::all().eq("n", 2)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);

        let other = ObjectId::new();
        assert!(!store.replace("shop", "orders", other, doc(json!({})), false).await.unwrap());
        assert!(store.replace("shop", "orders", other, doc(json!({})), true).await.unwrap());

        assert!(store.delete("shop", "orders", id).await.unwrap());
        assert!(!store.delete("shop", "orders", id).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_into_missing_unit() {
        let store = MemoryStore::new();
        let err = store.insert("shop", "orders", Document::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::UnitMissing { .. }));
    }

    #[tokio::test]
    async fn test_offline_and_fail_points() {
        let store = MemoryStore::new();
        store.set_online(false);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.list_databases().await.is_err());
        store.set_online(true);
        assert!(store.ping().await.is_ok());

        store.fail_next(FailPoint::CreateUnit);
        assert!(store.create_unit("shop", "orders").await.is_err());
        assert!(store.create_unit("shop", "orders").await.is_ok());
    }
}
