//! Error taxonomy for the import and clustering pipelines

use im_marc::MarcError;

use crate::store::StoreError;

/// Failure of a single import item.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Malformed record in every available physical encoding.
    #[error(transparent)]
    Format(#[from] MarcError),

    /// Store fault, already past the bounded-retry wrapper.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Audit-log or checkpoint file fault. Fatal for the run: without the
    /// audit trail a crash could not be recovered from.
    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

/// Failure of a per-author clustering run.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Unexpected document type or state mid-cluster. Fatal for the whole
    /// author run; writes committed before the fault are retained.
    #[error("inconsistent document: {0}")]
    Consistency(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
