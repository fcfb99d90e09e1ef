use crate::document::{IdSource, ImportDocument, ImportRecord};
use crate::values::DocumentId;
use std::collections::HashMap;

/// An ordered set of `set` writes against a single collection.
///
/// Entries keep input order. Two entries may share an id; when committed
/// the later one overwrites the earlier (last write wins).
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    collection: String,
    writes: Vec<ImportDocument>,
}

impl WriteBatch {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            writes: Vec::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Stage a full-overwrite write of `fields` under `id`.
    pub fn set(&mut self, id: DocumentId, id_source: IdSource, fields: ImportRecord) {
        self.writes.push(ImportDocument::new(id, id_source, fields));
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImportDocument> {
        self.writes.iter()
    }

    pub fn writes(&self) -> &[ImportDocument] {
        &self.writes
    }

    /// Split into consecutive slices of at most `limit` writes.
    ///
    /// A `limit` of zero is treated as one.
    pub fn chunks(&self, limit: usize) -> impl Iterator<Item = &[ImportDocument]> {
        self.writes.chunks(limit.max(1))
    }

    /// Ids staged more than once, with how many times each appears.
    /// Sorted by id for stable output.
    pub fn duplicate_ids(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for doc in &self.writes {
            *counts.entry(doc.id().id()).or_insert(0) += 1;
        }
        let mut dups: Vec<(String, usize)> = counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, n)| (id.to_owned(), n))
            .collect();
        dups.sort();
        dups
    }
}
