// Conversion between opaque identifiers and store-native ones.

use crate::error::{DmsError, Result};
use crate::store::ObjectId;

/// Decode a caller-supplied identifier. Malformed input is a client error.
pub(crate) fn parse_id(kind: &'static str, text: &str) -> Result<ObjectId> {
    ObjectId::parse(text)
        .map_err(|_| DmsError::InvalidIdentifier(format!("{kind} id '{text}' is malformed")))
}

pub(crate) fn to_opaque(id: ObjectId) -> String {
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_round_trip() {
        let id = ObjectId::new();
        assert_eq!(parse_id("Item", &to_opaque(id)).unwrap(), id);
    }

    #[test]
    fn test_malformed_is_invalid_identifier() {
        let err = parse_id("Table", "42").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidIdentifier);
        assert!(err.to_string().contains("Table id '42'"));
    }
}
