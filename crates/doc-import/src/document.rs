use crate::values::DocumentId;
use serde_json::Value;
use std::collections::BTreeMap;

/// One row of the input array: arbitrary JSON fields, no fixed schema.
pub type ImportRecord = BTreeMap<String, Value>;

/// Where a document's id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSource {
    /// Taken verbatim from the configured id field.
    Field,
    /// Produced by the store because the id field was missing or unusable.
    Generated,
}

/// The persisted form of an [`ImportRecord`].
///
/// The record is stored as-is; the id field (if any) stays in the body.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDocument {
    id: DocumentId,
    id_source: IdSource,
    fields: ImportRecord,
}

impl ImportDocument {
    pub fn new(id: DocumentId, id_source: IdSource, fields: ImportRecord) -> Self {
        Self {
            id,
            id_source,
            fields,
        }
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn id_source(&self) -> IdSource {
        self.id_source
    }

    pub fn fields(&self) -> &ImportRecord {
        &self.fields
    }

    /// Get a field value by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}
