//! Decoder error types

/// Error type for MARC decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarcError {
    /// The binary record does not begin with a 5-digit ASCII length.
    #[error("record does not start with a 5-digit length")]
    BadLength,

    /// Declared record length disagrees with the actual byte count, even
    /// after one raw-unicode re-encoding attempt.
    #[error("MARC length mismatch: declared {declared}, actual {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The directory is truncated or contains non-numeric entries.
    #[error("bad directory")]
    BadDictionary,

    /// A field carries a blank tag. Signals the caller to retry with the
    /// alternate physical encoding if one is available.
    #[error("blank field tag")]
    BlankTag,

    /// A subfield carries a missing or malformed code. Signals the caller
    /// to retry with the alternate physical encoding if one is available.
    #[error("malformed subfield code")]
    BadSubtag,

    /// The record has no 245 title field.
    #[error("record has no title")]
    NoTitle,

    /// MARCXML structure error.
    #[error("malformed MARCXML: {0}")]
    Xml(String),
}

impl MarcError {
    /// True when the fault is specific to one physical encoding and the
    /// caller should retry with the other encoding if it has one.
    pub fn wants_alternate_encoding(&self) -> bool {
        matches!(self, MarcError::BlankTag | MarcError::BadSubtag)
    }
}

impl From<quick_xml::Error> for MarcError {
    fn from(e: quick_xml::Error) -> Self {
        MarcError::Xml(e.to_string())
    }
}
