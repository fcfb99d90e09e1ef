use crate::batch::WriteBatch;
use crate::config::ImportConfig;
use crate::document::{IdSource, ImportRecord};
use crate::error::{ImportError, ImportResult};
use crate::store::{CommitReceipt, DocumentStore};
use crate::values::{type_name, DocumentId};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Result of committing one slice of the batch.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub index: usize,
    pub documents: usize,
    pub result: Result<CommitReceipt, ImportError>,
}

impl ChunkOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of one import run.
#[derive(Debug)]
pub struct ImportReport {
    pub collection: String,
    /// Records found in the input array.
    pub total: usize,
    pub field_ids: usize,
    pub generated_ids: usize,
    /// Ids staged more than once, with their occurrence counts.
    pub duplicate_ids: Vec<(String, usize)>,
    pub chunks: Vec<ChunkOutcome>,
}

impl ImportReport {
    /// Documents written by successful commits.
    pub fn imported(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.is_ok())
            .map(|c| c.documents)
            .sum()
    }

    /// Documents in chunks whose commit failed.
    pub fn failed(&self) -> usize {
        self.total - self.imported()
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(ChunkOutcome::is_ok)
    }
}

/// Read the input file and parse it as JSON.
pub async fn load_source(path: &Path) -> ImportResult<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&content).map_err(|source| ImportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Pull the record array out from under `root_key`.
///
/// Every element must be a JSON object; anything else aborts the import
/// before a single write is staged.
pub fn extract_records(source: Value, root_key: &str) -> ImportResult<Vec<ImportRecord>> {
    let Value::Object(mut root) = source else {
        return Err(ImportError::MissingCollection(root_key.to_owned()));
    };
    let items = match root.remove(root_key) {
        None | Some(Value::Null) => {
            return Err(ImportError::MissingCollection(root_key.to_owned()));
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ImportError::NotAnArray {
                key: root_key.to_owned(),
                found: type_name(&other),
            });
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(fields) => Ok(fields.into_iter().collect()),
            other => Err(ImportError::NotAnObject {
                index,
                found: type_name(&other),
            }),
        })
        .collect()
}

/// The record's own id, if the id field holds a string that is non-empty
/// after trimming. The returned id is the untrimmed value.
pub fn resolve_document_id<'a>(record: &'a ImportRecord, id_field: &str) -> Option<&'a str> {
    match record.get(id_field) {
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.as_str()),
        _ => None,
    }
}

/// Turn records into one staged write each, asking the store for an id
/// wherever the record lacks a usable one.
pub fn stage_records<S>(
    store: &S,
    collection: &str,
    id_field: &str,
    records: Vec<ImportRecord>,
) -> WriteBatch
where
    S: DocumentStore + ?Sized,
{
    let mut batch = WriteBatch::new(collection);
    for record in records {
        let (id, source) = match resolve_document_id(&record, id_field) {
            Some(id) => (DocumentId::new(collection, id), IdSource::Field),
            None => {
                let id = store.generate_id(collection);
                warn!(
                    "Item missing or invalid '{id_field}'. Using auto-ID: {}",
                    id.id()
                );
                (id, IdSource::Generated)
            }
        };
        batch.set(id, source, record);
    }
    batch
}

/// Commit the batch in slices of at most `limit` writes, with up to
/// `concurrency` commits in flight. Outcomes are returned in slice order.
pub async fn commit_batch<S>(
    store: &S,
    batch: &WriteBatch,
    limit: usize,
    concurrency: usize,
) -> Vec<ChunkOutcome>
where
    S: DocumentStore + ?Sized,
{
    stream::iter(batch.chunks(limit).enumerate())
        .map(|(index, chunk)| async move {
            debug!(chunk = index, documents = chunk.len(), "Committing chunk");
            ChunkOutcome {
                index,
                documents: chunk.len(),
                result: store.commit(chunk).await,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Runs one import of `config.data_path` into `config.collection`.
pub struct Importer<'a, S: DocumentStore + ?Sized> {
    config: &'a ImportConfig,
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> Importer<'a, S> {
    pub fn new(config: &'a ImportConfig, store: &'a S) -> Self {
        Self { config, store }
    }

    /// Read, validate, stage and commit.
    ///
    /// Errors before the commit step mean nothing was written. Commit
    /// failures do not abort the run; they are recorded per chunk in the
    /// returned report.
    pub async fn run(&self) -> ImportResult<ImportReport> {
        let config = self.config;
        let source = load_source(&config.data_path).await?;

        info!(
            "Starting data upload to collection: {}...",
            config.collection
        );
        let records = extract_records(source, config.root_key())?;

        let batch = stage_records(self.store, &config.collection, &config.id_field, records);
        debug!(
            collection = batch.collection(),
            staged = batch.len(),
            "Staged writes"
        );
        let generated_ids = batch
            .iter()
            .filter(|d| d.id_source() == IdSource::Generated)
            .count();
        let duplicate_ids = batch.duplicate_ids();
        for (id, count) in &duplicate_ids {
            warn!("Document id '{id}' appears {count} times; the last record wins");
        }

        let chunks = commit_batch(
            self.store,
            &batch,
            config.batch_limit,
            config.max_concurrent_commits,
        )
        .await;

        let report = ImportReport {
            collection: config.collection.clone(),
            total: batch.len(),
            field_ids: batch.len() - generated_ids,
            generated_ids,
            duplicate_ids,
            chunks,
        };

        for chunk in &report.chunks {
            if let Err(e) = &chunk.result {
                error!(
                    "Commit of chunk {} ({} documents) failed: {e}",
                    chunk.index, chunk.documents
                );
            }
        }
        if report.is_complete() {
            info!(
                "Successfully imported {} documents to {}",
                report.imported(),
                report.collection
            );
        } else {
            error!(
                "Imported {} of {} documents to {}; {} failed",
                report.imported(),
                report.total,
                report.collection,
                report.failed()
            );
        }
        Ok(report)
    }
}
