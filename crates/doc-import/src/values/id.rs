use std::fmt;

/// Identifies a document within a collection.
///
/// The id is either taken verbatim from a record field or produced by the
/// target store. Generated ids default to UUID v7 (time-ordered) strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId {
    collection: String,
    id: String,
}

impl DocumentId {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Generate a new DocumentId with a UUID v7 (time-ordered).
    pub fn generate(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: uuid::Uuid::now_v7().to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
