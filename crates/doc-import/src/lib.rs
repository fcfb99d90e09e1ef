pub mod batch;
pub mod config;
pub mod credentials;
pub mod document;
pub mod error;
pub mod importer;
pub mod store;
pub mod values;

pub use batch::WriteBatch;
pub use config::{ImportConfig, LogFormat, LogLevel, LoggingConfig};
pub use credentials::ServiceAccountKey;
pub use document::{IdSource, ImportDocument, ImportRecord};
pub use error::{ImportError, ImportResult};
pub use importer::{ChunkOutcome, ImportReport, Importer};
pub use store::{CommitReceipt, DocumentStore, FirestoreOptions, FirestoreStore, InMemoryStore};
pub use values::{CollectionName, DocumentId};
