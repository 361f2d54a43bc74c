//! Database, table and item lifecycle on top of a [`BackingStore`].
//!
//! Each database keeps its schema records in the `_tables` unit and one
//! physical unit per table. Creating or dropping a table touches both, so
//! each side is undone if the other fails.

use crate::config::{Config, RetryConfig};
use crate::error::{DmsError, Result};
use crate::store::{BackingStore, Filter, StoreError, StoreResult, SYSTEM_DATABASES};
use crate::types::{Database, Field, Table};
use std::future::Future;
use std::sync::Arc;

mod health;
mod ids;
mod items;

pub use health::Health;
pub use items::ItemCursor;

use ids::{parse_id, to_opaque};

/// Unit holding a database's schema records.
pub const METADATA_UNIT: &str = "_tables";

#[derive(Debug, Clone)]
pub struct Service {
    store: Arc<dyn BackingStore>,
    retry: RetryConfig,
}

impl Service {
    pub fn new(store: Arc<dyn BackingStore>) -> Self {
        Service {
            store,
            retry: RetryConfig::default(),
        }
    }

    /// Open the configured store and apply the configured retry policy.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Service::new(config.open_store()?).with_retry(config.retry))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    /// Run an idempotent read, retrying while the store reports itself unavailable.
    async fn read<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(StoreError::Unavailable(reason)) if attempt < self.retry.max_attempts => {
                    log::warn!(
                        "{what} failed (attempt {attempt}/{}): {reason}",
                        self.retry.max_attempts
                    );
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                result => return result.map_err(DmsError::from),
            }
        }
    }

    // ── Databases ────────────────────────────────────────────────────

    /// Names of all user-created databases. Engine namespaces are left out.
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let store = &self.store;
        let names = self
            .read("list databases", move || store.list_databases())
            .await?;
        Ok(names
            .into_iter()
            .filter(|name| !SYSTEM_DATABASES.contains(&name.as_str()))
            .collect())
    }

    /// Create (or reuse) a database, set up its schema registry and create the
    /// requested tables in order.
    ///
    /// Tables are created one by one without rollback: if one fails, the ones
    /// before it stay.
    pub async fn create_database(&self, database: &Database) -> Result<String> {
        let name = database.database_name.as_str();
        if name.trim().is_empty() {
            return Err(DmsError::InvalidValue("database name must not be empty".into()));
        }
        if SYSTEM_DATABASES.contains(&name) {
            return Err(DmsError::conflict("Database", name));
        }

        log::debug!("Creating database '{name}'");
        self.store.create_database(name).await?;
        self.ensure_registry(name).await?;

        for table_name in &database.table_names {
            self.create_table(name, table_name, Vec::new()).await?;
        }

        log::info!(
            "Created database '{name}' with {} table(s)",
            database.table_names.len()
        );
        Ok(name.to_string())
    }

    /// Drop a database with all of its tables and schema records.
    pub async fn delete_database(&self, name: &str) -> Result<String> {
        self.require_database(name).await?;
        self.store.drop_database(name).await?;
        log::info!("Deleted database '{name}'");
        Ok(name.to_string())
    }

    async fn require_database(&self, name: &str) -> Result<()> {
        if self.list_databases().await?.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(DmsError::not_found("Database", name))
        }
    }

    async fn ensure_registry(&self, database: &str) -> Result<()> {
        match self.store.create_unit(database, METADATA_UNIT).await {
            Ok(()) | Err(StoreError::UnitExists { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // ── Tables ───────────────────────────────────────────────────────

    /// All schema records of a database.
    pub async fn list_tables(&self, database: &str) -> Result<Vec<Table>> {
        self.require_database(database).await?;
        self.schema_records(database, Filter::all()).await
    }

    async fn schema_records(&self, database: &str, filter: Filter) -> Result<Vec<Table>> {
        let store = &self.store;
        let filter = &filter;
        let found = self
            .read("list schema records", move || {
                store.find(database, METADATA_UNIT, filter)
            })
            .await;
        let records = match found {
            Ok(records) => records,
            Err(DmsError::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        records
            .into_iter()
            .map(|record| Table::from_document(to_opaque(record.id), record.document))
            .collect()
    }

    /// Resolve a schema record by its identifier.
    pub async fn get_table(&self, database: &str, table_id: &str) -> Result<Table> {
        let id = parse_id("Table", table_id)?;
        self.require_database(database).await?;

        let store = &self.store;
        let found = self
            .read("find schema record", move || {
                store.find_one(database, METADATA_UNIT, id)
            })
            .await;
        match found {
            Ok(Some(document)) => Table::from_document(to_opaque(id), document),
            Ok(None) | Err(DmsError::NotFound { .. }) => Err(DmsError::not_found("Table", table_id)),
            Err(e) => Err(e),
        }
    }

    /// Register a table's schema and create its physical unit.
    ///
    /// Returns the identifier of the schema record. If the unit cannot be
    /// created, the schema record is removed again.
    pub async fn create_table(
        &self,
        database: &str,
        table_name: &str,
        fields: Vec<Field>,
    ) -> Result<String> {
        let table = Table::new(database, table_name, fields);
        table.check()?;
        self.require_database(database).await?;

        if table_name == METADATA_UNIT {
            return Err(DmsError::conflict("Table", table_name));
        }
        let existing = self
            .schema_records(database, Filter::all().eq("table_name", table_name))
            .await?;
        if !existing.is_empty() {
            return Err(DmsError::conflict("Table", table_name));
        }
        let store = &self.store;
        let units = self
            .read("list units", move || store.list_units(database))
            .await?;
        if units.iter().any(|u| u == table_name) {
            return Err(DmsError::conflict("Table", table_name));
        }

        log::debug!("Registering schema for '{database}.{table_name}'");
        self.ensure_registry(database).await?;
        let id = self
            .store
            .insert(database, METADATA_UNIT, table.to_document()?)
            .await?;

        if let Err(e) = self.store.create_unit(database, table_name).await {
            log::warn!("Creating storage for '{database}.{table_name}' failed, removing schema record: {e}");
            if let Err(undo) = self.store.delete(database, METADATA_UNIT, id).await {
                log::error!("Could not remove schema record {id} of '{database}.{table_name}': {undo}");
            }
            return Err(e.into());
        }

        log::info!("Created table '{database}.{table_name}' ({id})");
        Ok(to_opaque(id))
    }

    /// Drop a table's schema record and its physical unit.
    ///
    /// If the unit cannot be dropped, the schema record is restored under the
    /// same identifier.
    pub async fn delete_table(&self, database: &str, table_id: &str) -> Result<String> {
        let table = self.get_table(database, table_id).await?;
        let id = parse_id("Table", table_id)?;
        let document = table.to_document()?;

        if !self.store.delete(database, METADATA_UNIT, id).await? {
            return Err(DmsError::not_found("Table", table_id));
        }

        if let Err(e) = self.store.drop_unit(database, &table.table_name).await {
            log::warn!(
                "Dropping storage for '{database}.{}' failed, restoring schema record: {e}",
                table.table_name
            );
            if let Err(undo) = self
                .store
                .replace(database, METADATA_UNIT, id, document, true)
                .await
            {
                log::error!("Could not restore schema record {id}: {undo}");
            }
            return Err(e.into());
        }

        log::info!("Deleted table '{database}.{}' ({id})", table.table_name);
        Ok(to_opaque(id))
    }
}
