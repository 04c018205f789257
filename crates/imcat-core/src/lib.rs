//! Catalog import core
//!
//! Takes decoded MARC records through deduplication and into a document
//! store, then clusters each author's editions into works:
//! - blocking-key extraction and a per-run candidate pool
//! - a pairwise merge scorer (title required, plus corroboration)
//! - an edition/work writer with append-only merge semantics
//! - an import pipeline with audit log and resumable checkpoint
//! - the per-author work clustering engine

pub mod audit;
pub mod cluster;
pub mod domain;
pub mod error;
pub mod import;
pub mod index;
pub mod pool;
pub mod scorer;
pub mod store;
pub mod writer;

pub use audit::{AuditLog, Checkpoint};
pub use cluster::{ClusterStats, WorkClusterer};
pub use domain::{Author, Doc, Edition, Redirect, Work};
pub use error::{ClusterError, ImportError};
pub use import::{ImportItem, Importer, RunStats, Verdict};
pub use index::{index_fields, normalize_title, normalize_title_key, KeyType};
pub use pool::CandidatePool;
pub use scorer::{compare, resolve_candidate, MatchAttributes, MatchDecision, REDIRECT_LIMIT};
pub use store::{
    with_retry, CoverFetcher, DocStore, Lookup, MemoryStore, NullSearchIndex, Query, SearchIndex,
    StoreError,
};
pub use writer::CatalogWriter;
