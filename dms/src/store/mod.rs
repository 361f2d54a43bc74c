//! Backing-store contract consumed by the service layer.
//!
//! A store holds named databases; each database holds named physical units;
//! each unit holds JSON documents keyed by a store-assigned [`ObjectId`].

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

mod id;
pub mod memory;
pub mod sqlite;

pub use id::ObjectId;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Namespaces the engine manages itself. Reported by `list_databases`, never user-created.
pub const SYSTEM_DATABASES: &[&str] = &["admin", "config", "local"];

pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("unit {database}.{unit} already exists")]
    UnitExists { database: String, unit: String },

    #[error("unit {database}.{unit} does not exist")]
    UnitMissing { database: String, unit: String },

    #[error("malformed object id '{0}'")]
    MalformedId(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A stored document together with its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: ObjectId,
    pub document: Document,
}

/// Equality filter on top-level document keys. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Document,
}

impl Filter {
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(key, expected)| document.get(key) == Some(expected))
    }
}

#[async_trait]
pub trait BackingStore: Send + Sync + Debug {
    /// Round-trip to the engine; fails when it cannot be reached.
    async fn ping(&self) -> StoreResult<()>;

    async fn list_databases(&self) -> StoreResult<Vec<String>>;

    /// Create the database, or reuse it when it already exists.
    async fn create_database(&self, name: &str) -> StoreResult<()>;

    /// Drop the database with every unit in it. Missing databases are ignored.
    async fn drop_database(&self, name: &str) -> StoreResult<()>;

    /// Units of a database. A missing database has none.
    async fn list_units(&self, database: &str) -> StoreResult<Vec<String>>;

    /// Create an empty unit, implicitly creating the database.
    async fn create_unit(&self, database: &str, unit: &str) -> StoreResult<()>;

    /// Drop a unit and its documents. Missing units are ignored.
    async fn drop_unit(&self, database: &str, unit: &str) -> StoreResult<()>;

    /// Store a new document and return the identifier assigned to it.
    async fn insert(&self, database: &str, unit: &str, document: Document) -> StoreResult<ObjectId>;

    async fn find(&self, database: &str, unit: &str, filter: &Filter) -> StoreResult<Vec<Record>>;

    async fn find_one(&self, database: &str, unit: &str, id: ObjectId) -> StoreResult<Option<Document>>;

    /// Replace the document stored under `id`. With `upsert` a missing document
    /// is created under that id. Returns whether a document was written.
    async fn replace(
        &self,
        database: &str,
        unit: &str,
        id: ObjectId,
        document: Document,
        upsert: bool,
    ) -> StoreResult<bool>;

    /// Remove the document stored under `id`. Returns whether one was removed.
    async fn delete(&self, database: &str, unit: &str, id: ObjectId) -> StoreResult<bool>;
}
