use super::{CommitReceipt, DocumentStore};
use crate::document::{ImportDocument, ImportRecord};
use crate::error::{ImportError, ImportResult};
use crate::values::{CollectionName, DocumentId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A single collection storing document bodies keyed by id.
///
/// Uses a BTreeMap so listing is ordered by id.
#[derive(Debug, Default)]
struct Collection {
    docs: BTreeMap<String, ImportRecord>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<CollectionName, Collection>,
    commits_attempted: usize,
    commits_applied: usize,
}

/// An in-process document store with `set` semantics.
///
/// Backs `--dry-run` and the test suite. Commits can be made to fail, either
/// by position (`fail_commit`) or by size (`with_max_writes_per_commit`), to
/// emulate store-side rejections.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    failing_commits: HashSet<usize>,
    max_writes_per_commit: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `index`-th commit call (zero-based) fail.
    pub fn fail_commit(mut self, index: usize) -> Self {
        self.failing_commits.insert(index);
        self
    }

    /// Reject commits carrying more than `limit` writes.
    pub fn with_max_writes_per_commit(mut self, limit: usize) -> Self {
        self.max_writes_per_commit = Some(limit);
        self
    }

    /// Get a stored document body by its full id.
    pub fn get(&self, id: &DocumentId) -> Option<ImportRecord> {
        let state = self.state.lock();
        state
            .collections
            .get(id.collection())?
            .docs
            .get(id.id())
            .cloned()
    }

    /// Count documents in a collection. Unknown collections count as empty.
    pub fn count(&self, collection: &str) -> usize {
        let state = self.state.lock();
        state
            .collections
            .get(collection)
            .map_or(0, |c| c.docs.len())
    }

    /// List the ids stored in a collection, ordered.
    pub fn ids(&self, collection: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .collections
            .get(collection)
            .map(|c| c.docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of `commit` calls received, including failed ones.
    pub fn commits_attempted(&self) -> usize {
        self.state.lock().commits_attempted
    }

    /// Number of commits that were applied.
    pub fn commits_applied(&self) -> usize {
        self.state.lock().commits_applied
    }
}

#[async_trait::async_trait]
impl DocumentStore for InMemoryStore {
    async fn commit(&self, writes: &[ImportDocument]) -> ImportResult<CommitReceipt> {
        let mut state = self.state.lock();
        let index = state.commits_attempted;
        state.commits_attempted += 1;

        if self.failing_commits.contains(&index) {
            return Err(ImportError::Commit(format!(
                "commit {index} rejected by store"
            )));
        }
        if let Some(limit) = self.max_writes_per_commit {
            if writes.len() > limit {
                return Err(ImportError::Commit(format!(
                    "maximum {limit} writes allowed per request, got {}",
                    writes.len()
                )));
            }
        }

        for doc in writes {
            state
                .collections
                .entry(doc.id().collection().to_owned())
                .or_default()
                .docs
                .insert(doc.id().id().to_owned(), doc.fields().clone());
        }
        state.commits_applied += 1;

        Ok(CommitReceipt {
            writes: writes.len(),
            commit_time: None,
        })
    }
}
