use super::{
    BackingStore, Document, Filter, ObjectId, Record, StoreError, StoreResult, SYSTEM_DATABASES,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Backing store persisted in a single SQLite file.
///
/// Databases, units and records live in three tables. Every call runs on the
/// blocking thread pool so async callers are never stalled by disk I/O.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        store.initialize_tables()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize_tables(&self) -> StoreResult<()> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS databases (
                name TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS units (
                database TEXT NOT NULL REFERENCES databases(name) ON DELETE CASCADE,
                name TEXT NOT NULL,
                PRIMARY KEY (database, name)
            );

            CREATE TABLE IF NOT EXISTS records (
                database TEXT NOT NULL,
                unit TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                PRIMARY KEY (database, unit, id),
                FOREIGN KEY (database, unit) REFERENCES units(database, name) ON DELETE CASCADE
            );
            ",
        )?;
        for name in SYSTEM_DATABASES {
            conn.execute(
                "INSERT OR IGNORE INTO databases (name) VALUES (?1)",
                params![name],
            )?;
        }
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}

fn lock(conn: &Mutex<Connection>) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
}

fn unit_exists(conn: &Connection, database: &str, unit: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM units WHERE database = ?1 AND name = ?2",
            params![database, unit],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn require_unit(conn: &Connection, database: &str, unit: &str) -> StoreResult<()> {
    if unit_exists(conn, database, unit)? {
        Ok(())
    } else {
        Err(StoreError::UnitMissing {
            database: database.to_string(),
            unit: unit.to_string(),
        })
    }
}

fn parse_document(data_json: &str) -> StoreResult<Document> {
    Ok(serde_json::from_str(data_json)?)
}

#[async_trait]
impl BackingStore for SqliteStore {
    async fn ping(&self) -> StoreResult<()> {
        self.run(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM databases ORDER BY name")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            let mut names = Vec::new();
            for row in rows {
                names.push(row?);
            }
            Ok(names)
        })
        .await
    }

    async fn create_database(&self, name: &str) -> StoreResult<()> {
        let name = name.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO databases (name) VALUES (?1)",
                params![name],
            )?;
            Ok(())
        })
        .await
    }

    async fn drop_database(&self, name: &str) -> StoreResult<()> {
        let name = name.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM records WHERE database = ?1", params![name])?;
            tx.execute("DELETE FROM units WHERE database = ?1", params![name])?;
            tx.execute("DELETE FROM databases WHERE name = ?1", params![name])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_units(&self, database: &str) -> StoreResult<Vec<String>> {
        let database = database.to_string();
        self.run(move |conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM units WHERE database = ?1 ORDER BY name")?;
            let rows = stmt.query_map(params![database], |row| row.get(0))?;
            let mut names = Vec::new();
            for row in rows {
                names.push(row?);
            }
            Ok(names)
        })
        .await
    }

    async fn create_unit(&self, database: &str, unit: &str) -> StoreResult<()> {
        let database = database.to_string();
        let unit = unit.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            if unit_exists(&tx, &database, &unit)? {
                return Err(StoreError::UnitExists { database, unit });
            }
            tx.execute(
                "INSERT OR IGNORE INTO databases (name) VALUES (?1)",
                params![database],
            )?;
            tx.execute(
                "INSERT INTO units (database, name) VALUES (?1, ?2)",
                params![database, unit],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn drop_unit(&self, database: &str, unit: &str) -> StoreResult<()> {
        let database = database.to_string();
        let unit = unit.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM records WHERE database = ?1 AND unit = ?2",
                params![database, unit],
            )?;
            tx.execute(
                "DELETE FROM units WHERE database = ?1 AND name = ?2",
                params![database, unit],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn insert(&self, database: &str, unit: &str, document: Document) -> StoreResult<ObjectId> {
        let database = database.to_string();
        let unit = unit.to_string();
        self.run(move |conn| {
            require_unit(conn, &database, &unit)?;
            let id = ObjectId::new();
            let data_json = serde_json::to_string(&document)?;
            conn.execute(
                "INSERT INTO records (database, unit, id, data_json) VALUES (?1, ?2, ?3, ?4)",
                params![database, unit, id.to_string(), data_json],
            )?;
            Ok(id)
        })
        .await
    }

    async fn find(&self, database: &str, unit: &str, filter: &Filter) -> StoreResult<Vec<Record>> {
        let database = database.to_string();
        let unit = unit.to_string();
        let filter = filter.clone();
        self.run(move |conn| {
            require_unit(conn, &database, &unit)?;
            let mut stmt = conn.prepare(
                "SELECT id, data_json FROM records WHERE database = ?1 AND unit = ?2 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![database, unit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (id, data_json) = row?;
                let document = parse_document(&data_json)?;
                if filter.matches(&document) {
                    records.push(Record {
                        id: ObjectId::parse(&id)?,
                        document,
                    });
                }
            }
            Ok(records)
        })
        .await
    }

    async fn find_one(&self, database: &str, unit: &str, id: ObjectId) -> StoreResult<Option<Document>> {
        let database = database.to_string();
        let unit = unit.to_string();
        self.run(move |conn| {
            require_unit(conn, &database, &unit)?;
            let data_json: Option<String> = conn
                .query_row(
                    "SELECT data_json FROM records WHERE database = ?1 AND unit = ?2 AND id = ?3",
                    params![database, unit, id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            data_json.as_deref().map(parse_document).transpose()
        })
        .await
    }

    async fn replace(
        &self,
        database: &str,
        unit: &str,
        id: ObjectId,
        document: Document,
        upsert: bool,
    ) -> StoreResult<bool> {
        let database = database.to_string();
        let unit = unit.to_string();
        self.run(move |conn| {
            require_unit(conn, &database, &unit)?;
            let data_json = serde_json::to_string(&document)?;
            let changed = if upsert {
                conn.execute(
                    "INSERT OR REPLACE INTO records (database, unit, id, data_json) VALUES (?1, ?2, ?3, ?4)",
                    params![database, unit, id.to_string(), data_json],
                )?
            } else {
                conn.execute(
                    "UPDATE records SET data_json = ?4 WHERE database = ?1 AND unit = ?2 AND id = ?3",
                    params![database, unit, id.to_string(), data_json],
                )?
            };
            Ok(changed > 0)
        })
        .await
    }

    async fn delete(&self, database: &str, unit: &str, id: ObjectId) -> StoreResult<bool> {
        let database = database.to_string();
        let unit = unit.to_string();
        self.run(move |conn| {
            require_unit(conn, &database, &unit)?;
            let removed = conn.execute(
                "DELETE FROM records WHERE database = ?1 AND unit = ?2 AND id = ?3",
                params![database, unit, id.to_string()],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}
