//! Import pipeline
//!
//! Drives one item from raw bytes to a verdict: decode, duplicate guard,
//! blocking keys, candidate pool, merge scoring, then either a merge onto
//! an existing edition or a fresh edition write. Every item yields exactly
//! one verdict; item-level faults never abort the run.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use im_marc::{parse_binary, parse_xml, read_edition, ImportRecord, MarcError, Record};
use tracing::{info, warn};

use crate::audit::{AuditLog, Checkpoint};
use crate::index::index_fields;
use crate::pool::CandidatePool;
use crate::scorer::{compare, resolve_candidate, MatchAttributes, MatchDecision};
use crate::store::{with_retry, CoverFetcher, DocStore, Query, SearchIndex, StoreError};
use crate::writer::CatalogWriter;
use crate::ImportError;

/// One item to import: a source identifier plus whichever physical
/// encodings the source provides.
#[derive(Debug, Clone, Default)]
pub struct ImportItem {
    /// Source-record entry, e.g. `marc:file.mrc:offset:length` or
    /// `ia:scan_identifier`.
    pub source_id: String,
    pub xml: Option<String>,
    pub binary: Option<Vec<u8>>,
    /// Archival scan identifier, when the item came from a scan.
    pub ocaid: Option<String>,
    /// When the source produced the item; drives the resume checkpoint.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Per-item outcome, one per item processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A new edition was created under the given key.
    Loaded(String),
    /// The item was merged onto the existing edition at the given key.
    Matched(String),
    /// Nothing written; the reason is permanent for this item.
    Skipped(String),
    /// Nothing further written; the fault may clear on a later run.
    Error(String),
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Loaded(key) => write!(f, "loaded:{key}"),
            Verdict::Matched(key) => write!(f, "matched:{key}"),
            Verdict::Skipped(reason) => write!(f, "skipped:{reason}"),
            Verdict::Error(reason) => write!(f, "error:{reason}"),
        }
    }
}

/// Run totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub loaded: usize,
    pub matched: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RunStats {
    fn count(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Loaded(_) => self.loaded += 1,
            Verdict::Matched(_) => self.matched += 1,
            Verdict::Skipped(_) => self.skipped += 1,
            Verdict::Error(_) => self.errors += 1,
        }
    }
}

/// Imports items against one store. Holds the run-local pool of editions
/// written this run, so later items can match them before the store's own
/// index catches up.
pub struct Importer<'a> {
    store: &'a dyn DocStore,
    writer: CatalogWriter<'a>,
    registered: CandidatePool,
}

impl<'a> Importer<'a> {
    pub fn new(store: &'a dyn DocStore, search: &'a dyn SearchIndex) -> Self {
        Importer {
            store,
            writer: CatalogWriter::new(store, search),
            registered: CandidatePool::default(),
        }
    }

    pub fn with_cover_fetcher(mut self, covers: std::sync::Arc<dyn CoverFetcher>) -> Self {
        self.writer = self.writer.with_cover_fetcher(covers);
        self
    }

    /// Process one item to a verdict. Store faults surface as
    /// [`Verdict::Error`]; format and validation faults as
    /// [`Verdict::Skipped`]. Never panics, never aborts the run.
    pub fn import(&mut self, item: &ImportItem) -> Verdict {
        match self.try_import(item) {
            Ok(verdict) => verdict,
            Err(ImportError::Format(err)) => Verdict::Skipped(err.to_string()),
            Err(ImportError::Store(StoreError::Validation(reason))) => {
                Verdict::Skipped(format!("validation: {reason}"))
            }
            Err(ImportError::Store(err)) => Verdict::Error(err.to_string()),
            Err(ImportError::Audit(err)) => Verdict::Error(err.to_string()),
        }
    }

    /// Process a batch, writing one audit line per item and advancing the
    /// checkpoint after each. Items at or before the saved checkpoint are
    /// not re-processed.
    pub fn run(
        &mut self,
        items: &[ImportItem],
        audit: &mut AuditLog,
        checkpoint: &Checkpoint,
    ) -> Result<RunStats, ImportError> {
        let resume_after = checkpoint.load()?;
        let mut stats = RunStats::default();
        for item in items {
            if let (Some(done), Some(stamp)) = (resume_after, item.timestamp) {
                if stamp <= done {
                    continue;
                }
            }
            let verdict = self.import(item);
            stats.count(&verdict);
            audit.record(&item.source_id, &verdict.to_string())?;
            if let Some(stamp) = item.timestamp {
                checkpoint.save(stamp)?;
            }
        }
        info!(
            loaded = stats.loaded,
            matched = stats.matched,
            skipped = stats.skipped,
            errors = stats.errors,
            "import run finished"
        );
        Ok(stats)
    }

    fn try_import(&mut self, item: &ImportItem) -> Result<Verdict, ImportError> {
        if self.already_loaded(item)? {
            return Ok(Verdict::Skipped("already loaded".to_string()));
        }

        let Some(record) = decode(item) else {
            return Ok(Verdict::Skipped("no record data".to_string()));
        };
        let rec = read_edition(&record?)?;

        let fields = index_fields(&rec.index_record());
        if fields.is_empty() {
            return Ok(Verdict::Skipped("no index keys".to_string()));
        }

        let pool = with_retry("build candidate pool", || {
            CandidatePool::build(self.store, &fields)
        })?;

        // Store candidates first, then editions written earlier this run.
        let mut candidates = pool.candidates();
        let mut seen: BTreeSet<String> = candidates.iter().cloned().collect();
        for key in self.registered.lookup(&fields) {
            if seen.insert(key.clone()) {
                candidates.push(key);
            }
        }

        if let Some((key, edition)) = self.find_match(&rec, &candidates)? {
            self.writer
                .merge_edition(&key, edition, &rec, &item.source_id, item.ocaid.as_deref())?;
            return Ok(Verdict::Matched(key));
        }

        let key =
            self.writer
                .create_edition(&rec, &item.source_id, item.ocaid.as_deref())?;
        self.registered.register(&key, &fields);
        Ok(Verdict::Loaded(key))
    }

    /// Duplicate guard: a source-record entry or scan identifier already in
    /// the store means this item was imported by an earlier run.
    fn already_loaded(&self, item: &ImportItem) -> Result<bool, StoreError> {
        let hits = with_retry("query source records", || {
            self.store
                .query(&Query::EditionsBySourceRecord(item.source_id.clone()))
        })?;
        if !hits.is_empty() {
            return Ok(true);
        }
        if let Some(ocaid) = &item.ocaid {
            let hits = with_retry("query ocaid", || {
                self.store.query(&Query::EditionsByOcaid(ocaid.clone()))
            })?;
            if !hits.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// First candidate the scorer accepts, after redirect resolution.
    fn find_match(
        &self,
        rec: &ImportRecord,
        candidates: &[String],
    ) -> Result<Option<(String, crate::domain::Edition)>, StoreError> {
        let incoming = MatchAttributes::from_import(rec);
        for key in candidates {
            let Some((terminal, edition)) = resolve_candidate(self.store, key)? else {
                continue;
            };
            let existing = MatchAttributes::from_edition(&edition);
            if compare(&incoming, &existing) == MatchDecision::Match {
                return Ok(Some((terminal, edition)));
            }
        }
        Ok(None)
    }
}

/// Decode the item's preferred encoding, or `None` when the item carries
/// no encoding at all. XML first; a blank tag or bad subfield code there
/// falls back to the binary encoding when present.
fn decode(item: &ImportItem) -> Option<Result<Record, MarcError>> {
    match (&item.xml, &item.binary) {
        (Some(xml), binary) => Some(match parse_xml(xml) {
            Ok(record) => Ok(record),
            Err(err) if err.wants_alternate_encoding() => match binary {
                Some(bytes) => {
                    warn!(source = %item.source_id, %err, "xml decode failed, trying binary");
                    parse_binary(bytes)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }),
        (None, Some(bytes)) => Some(parse_binary(bytes)),
        (None, None) => None,
    }
}
