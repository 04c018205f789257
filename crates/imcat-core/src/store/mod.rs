//! Store and search-index collaborator contracts
//!
//! The document store is an external system; this module defines the trait
//! the pipeline consumes and an in-memory backend for tests and local runs.

mod memory;
mod retry;

pub use memory::MemoryStore;
pub use retry::{with_retry, MAX_ATTEMPTS, RETRY_DELAY};

use crate::domain::Doc;
use crate::index::KeyType;

/// Result of a keyed lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Doc(Doc),
    /// The key has been superseded; the value is the replacement key.
    Redirect(String),
    Missing,
}

/// Typed query patterns the pipeline issues against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Edition keys matching any of the given blocking-key values.
    EditionsByIndexKey(KeyType, Vec<String>),
    /// Edition keys carrying the given source-record entry.
    EditionsBySourceRecord(String),
    /// Edition keys carrying the given archival scan identifier.
    EditionsByOcaid(String),
    /// Edition keys listing the given author key.
    EditionsByAuthor(String),
    /// Work keys listing the given author key.
    WorksByAuthor(String),
    /// Redirect keys whose location is the given key.
    RedirectsTo(String),
}

/// Errors from the document store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    /// The store rejected a write (schema violation or similar). Permanent
    /// for the item; never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport-level fault (connection reset, malformed response status).
    /// The only class the bounded-retry wrapper retries.
    #[error("transient store error: {0}")]
    Transient(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// The document store contract consumed by the pipeline.
pub trait DocStore: Send + Sync {
    /// Look up one key. Redirect documents surface as [`Lookup::Redirect`];
    /// the caller is responsible for resolving chains.
    fn get(&self, key: &str) -> Result<Lookup, StoreError>;

    /// Fetch many documents; keys that are missing are skipped.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Doc>, StoreError>;

    /// Create a new document. The store assigns and returns its key.
    fn create(&self, doc: Doc, comment: &str) -> Result<String, StoreError>;

    /// Save an existing document (key required).
    fn save(&self, doc: Doc, comment: &str) -> Result<(), StoreError>;

    /// Save a batch of documents under one comment.
    fn save_many(&self, docs: Vec<Doc>, comment: &str) -> Result<(), StoreError>;

    /// Query for document keys matching a pattern.
    fn query(&self, query: &Query) -> Result<Vec<String>, StoreError>;
}

/// Search-index collaborator: reindex notifications are fire and forget.
pub trait SearchIndex: Send + Sync {
    fn notify(&self, keys: &[String]);
}

/// No-op search index.
#[derive(Debug, Default)]
pub struct NullSearchIndex;

impl SearchIndex for NullSearchIndex {
    fn notify(&self, _keys: &[String]) {}
}

/// Cover-image collaborator; invoked on a detached thread after a new
/// edition is committed.
pub trait CoverFetcher: Send + Sync {
    fn fetch(&self, edition_key: &str, ocaid: &str);
}
