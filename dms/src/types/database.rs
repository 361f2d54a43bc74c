use serde::{Deserialize, Serialize};

/// A database as requested at creation: its name and the tables to create in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub database_name: String,
    #[serde(default)]
    pub table_names: Vec<String>,
}

impl Database {
    pub fn new(database_name: impl Into<String>) -> Self {
        Database {
            database_name: database_name.into(),
            table_names: Vec::new(),
        }
    }

    pub fn with_tables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table_names.extend(names.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_default_to_empty() {
        let db: Database = serde_json::from_str(r#"{"database_name": "shop"}"#).unwrap();
        assert_eq!(db, Database::new("shop"));

        let db = Database::new("shop").with_tables(["orders", "customers"]);
        assert_eq!(db.table_names, vec!["orders", "customers"]);
    }
}
