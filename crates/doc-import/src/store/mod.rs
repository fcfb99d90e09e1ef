//! Document store seam.
//!
//! The importer only needs two things from a store: a way to mint ids for
//! records without a usable id field, and a `set`-semantics batch commit.

pub mod firestore;
pub mod memory;

pub use firestore::{FirestoreOptions, FirestoreStore};
pub use memory::InMemoryStore;

use crate::document::ImportDocument;
use crate::error::ImportResult;
use crate::values::DocumentId;

/// What the store reported for one successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub writes: usize,
    pub commit_time: Option<String>,
}

#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Produce a fresh unique id within `collection`.
    fn generate_id(&self, collection: &str) -> DocumentId {
        DocumentId::generate(collection)
    }

    /// Apply every write in one commit, overwriting documents that already
    /// exist. Either all writes land or the call returns an error.
    async fn commit(&self, writes: &[ImportDocument]) -> ImportResult<CommitReceipt>;
}
