use super::StoreError;
use std::fmt;
use ulid::Ulid;

/// Store-native record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(Ulid);

impl ObjectId {
    pub fn new() -> Self {
        ObjectId(Ulid::new())
    }

    /// Decode the textual form. Case-insensitive.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        Ulid::from_string(&text.to_ascii_uppercase())
            .map(ObjectId)
            .map_err(|_| StoreError::MalformedId(text.to_string()))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        ObjectId::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display_round_trip() {
        let id = ObjectId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 26);
        assert_eq!(ObjectId::parse(&text).unwrap(), id);
        assert_eq!(ObjectId::parse(&text.to_uppercase()).unwrap(), id);
    }

    #[test]
    fn test_malformed_rejected() {
        for bad in ["", "xyz", "not-a-valid-identifier-at-all", "01HQ!!!!!!!!!!!!!!!!!!!!!!"] {
            assert!(matches!(ObjectId::parse(bad), Err(StoreError::MalformedId(_))), "{bad}");
        }
    }
}
