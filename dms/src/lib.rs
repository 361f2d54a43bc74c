pub mod config;
pub mod error;
pub mod service;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{DmsError, ErrorKind, Result};
pub use service::{Health, ItemCursor, Service};
pub use store::BackingStore;
pub use types::{Database, DateInterval, Field, FieldType, FieldValue, ItemPayload, Table, TableItem, TableItemField};
