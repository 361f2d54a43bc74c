use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DmsError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} already exists: {name}")]
    Conflict { kind: &'static str, name: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Backing store unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidValue,
    InvalidIdentifier,
    Unavailable,
    Internal,
}

impl DmsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DmsError::NotFound { .. } => ErrorKind::NotFound,
            DmsError::Conflict { .. } => ErrorKind::Conflict,
            DmsError::InvalidValue(_) => ErrorKind::InvalidValue,
            DmsError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            DmsError::Unavailable(_) => ErrorKind::Unavailable,
            DmsError::Config(_) | DmsError::Io(_) | DmsError::Yaml(_) | DmsError::Json(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        DmsError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn conflict(kind: &'static str, name: impl Into<String>) -> Self {
        DmsError::Conflict {
            kind,
            name: name.into(),
        }
    }
}

/// Store failures surface as `Unavailable` unless the store names a condition
/// the caller can act on.
impl From<StoreError> for DmsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnitExists { database, unit } => DmsError::Conflict {
                kind: "Table",
                name: format!("{database}.{unit}"),
            },
            StoreError::UnitMissing { database, unit } => DmsError::NotFound {
                kind: "Table",
                name: format!("{database}.{unit}"),
            },
            StoreError::MalformedId(id) => DmsError::InvalidIdentifier(id),
            // Undecodable stored data is not a connectivity problem.
            StoreError::Json(e) => DmsError::Json(e),
            other => DmsError::Unavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DmsError>;
