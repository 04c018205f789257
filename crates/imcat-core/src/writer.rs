//! Edition and work writer
//!
//! Commits new editions (with their author and work documents) and applies
//! append-only merges onto matched editions. All store writes go through
//! the bounded transient-retry wrapper; the search index is notified after
//! each commit.

use std::collections::HashMap;
use std::sync::Arc;

use im_marc::ImportRecord;
use tracing::{debug, info};

use crate::domain::{Author, Doc, Edition, Work};
use crate::index::normalize_title;
use crate::store::{with_retry, CoverFetcher, DocStore, Lookup, Query, SearchIndex, StoreError};

const IMPORT_COMMENT: &str = "initial import";
const MERGE_COMMENT: &str = "import merge";

/// Writes import results to the store. One writer serves a whole run; it
/// caches author keys so repeated names within a run reuse one document.
pub struct CatalogWriter<'a> {
    store: &'a dyn DocStore,
    search: &'a dyn SearchIndex,
    covers: Option<Arc<dyn CoverFetcher>>,
    authors_by_name: HashMap<String, String>,
}

impl<'a> CatalogWriter<'a> {
    pub fn new(store: &'a dyn DocStore, search: &'a dyn SearchIndex) -> Self {
        CatalogWriter {
            store,
            search,
            covers: None,
            authors_by_name: HashMap::new(),
        }
    }

    pub fn with_cover_fetcher(mut self, covers: Arc<dyn CoverFetcher>) -> Self {
        self.covers = Some(covers);
        self
    }

    /// Commit a brand-new edition: author documents for each bare name, a
    /// work (matched among the authors' existing works by normalized title,
    /// else created), then the edition itself. Returns the edition key.
    pub fn create_edition(
        &mut self,
        rec: &ImportRecord,
        source_record: &str,
        ocaid: Option<&str>,
    ) -> Result<String, StoreError> {
        let author_keys = self.author_keys(&rec.authors)?;

        let work_title = rec.work_title.clone().unwrap_or_else(|| rec.full_title());
        let work_key = match self.find_matching_work(&author_keys, &work_title)? {
            Some(key) => key,
            None => {
                let work = Work {
                    key: None,
                    title: work_title,
                    subtitle: rec.subtitle.clone(),
                    authors: author_keys.clone(),
                    subjects: rec.subjects.clone(),
                };
                with_retry("create work", || {
                    self.store.create(Doc::Work(work.clone()), IMPORT_COMMENT)
                })?
            }
        };

        let mut edition = Edition::from_record(rec);
        edition.authors = author_keys;
        edition.work = Some(work_key.clone());
        edition.ocaid = ocaid.map(str::to_string);
        edition.source_records = vec![source_record.to_string()];

        let edition_key = with_retry("create edition", || {
            self.store
                .create(Doc::Edition(edition.clone()), IMPORT_COMMENT)
        })?;
        info!(key = %edition_key, work = %work_key, "created edition");

        self.search
            .notify(&[edition_key.clone(), work_key.clone()]);
        self.dispatch_cover_fetch(&edition_key, ocaid);
        Ok(edition_key)
    }

    /// Apply a matched record onto an existing edition. Append-only: the
    /// source-record entry is added once, list fields gain new values, and
    /// scalar fields are filled only when currently empty. Saves and
    /// notifies only when something changed.
    pub fn merge_edition(
        &self,
        edition_key: &str,
        mut edition: Edition,
        rec: &ImportRecord,
        source_record: &str,
        ocaid: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut changed = false;

        if !edition.source_records.iter().any(|s| s == source_record) {
            edition.source_records.push(source_record.to_string());
            changed = true;
        }

        changed |= fill(&mut edition.subtitle, &rec.subtitle);
        changed |= fill(&mut edition.by_statement, &rec.by_statement);
        changed |= fill(&mut edition.work_title, &rec.work_title);
        changed |= fill(&mut edition.publish_date, &rec.publish_date);
        changed |= fill(&mut edition.publish_year, &rec.publish_year);
        changed |= fill(&mut edition.pagination, &rec.pagination);
        changed |= fill(&mut edition.number_of_pages, &rec.number_of_pages);
        if edition.ocaid.is_none() {
            if let Some(id) = ocaid {
                edition.ocaid = Some(id.to_string());
                changed = true;
            }
        }

        changed |= extend(&mut edition.isbns, &rec.isbns);
        changed |= extend(&mut edition.lccns, &rec.lccns);
        changed |= extend(&mut edition.oclc_numbers, &rec.oclc_numbers);
        changed |= extend(&mut edition.languages, &rec.languages);
        changed |= extend(&mut edition.subjects, &rec.subjects);
        if edition.publishers.is_empty() && !rec.publishers.is_empty() {
            edition.publishers = rec.publishers.clone();
            changed = true;
        }
        if edition.publish_places.is_empty() && !rec.publish_places.is_empty() {
            edition.publish_places = rec.publish_places.clone();
            changed = true;
        }
        if edition.table_of_contents.is_empty() && !rec.table_of_contents.is_empty() {
            edition.table_of_contents = rec.table_of_contents.clone();
            changed = true;
        }

        if !changed {
            debug!(key = %edition_key, "merge produced no changes");
            return Ok(false);
        }

        edition.key = Some(edition_key.to_string());
        with_retry("save merged edition", || {
            self.store.save(Doc::Edition(edition.clone()), MERGE_COMMENT)
        })?;
        info!(key = %edition_key, source = source_record, "merged into edition");
        self.search.notify(&[edition_key.to_string()]);
        Ok(true)
    }

    /// Author documents for bare names, created on first sight. Same-name
    /// authors collapse to one document within a run; no wider identity
    /// resolution is attempted.
    fn author_keys(&mut self, names: &[String]) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::with_capacity(names.len());
        for name in names {
            if let Some(key) = self.authors_by_name.get(name) {
                keys.push(key.clone());
                continue;
            }
            let author = Author {
                key: None,
                name: name.clone(),
            };
            let key = with_retry("create author", || {
                self.store.create(Doc::Author(author.clone()), IMPORT_COMMENT)
            })?;
            self.authors_by_name.insert(name.clone(), key.clone());
            keys.push(key);
        }
        Ok(keys)
    }

    /// Look for an existing work by one of the authors whose normalized
    /// title equals the incoming work title.
    fn find_matching_work(
        &self,
        author_keys: &[String],
        work_title: &str,
    ) -> Result<Option<String>, StoreError> {
        let wanted = normalize_title(work_title);
        if wanted.is_empty() {
            return Ok(None);
        }
        for author_key in author_keys {
            let work_keys = with_retry("query works by author", || {
                self.store.query(&Query::WorksByAuthor(author_key.clone()))
            })?;
            for key in work_keys {
                if let Lookup::Doc(Doc::Work(work)) = self.store.get(&key)? {
                    if normalize_title(&work.title) == wanted {
                        return Ok(Some(key));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Hand a new edition's scan identifier to the cover fetcher on a
    /// detached thread. Failures are the fetcher's to log; the import never
    /// waits on it.
    fn dispatch_cover_fetch(&self, edition_key: &str, ocaid: Option<&str>) {
        let (Some(covers), Some(ocaid)) = (&self.covers, ocaid) else {
            return;
        };
        let covers = Arc::clone(covers);
        let key = edition_key.to_string();
        let ocaid = ocaid.to_string();
        std::thread::spawn(move || covers.fetch(&key, &ocaid));
    }
}

/// Fill a scalar only when currently empty.
fn fill<T: Clone>(dst: &mut Option<T>, src: &Option<T>) -> bool {
    if dst.is_none() && src.is_some() {
        *dst = src.clone();
        true
    } else {
        false
    }
}

/// Append values not already present, preserving existing order.
fn extend(dst: &mut Vec<String>, src: &[String]) -> bool {
    let mut changed = false;
    for value in src {
        if !dst.iter().any(|v| v == value) {
            dst.push(value.clone());
            changed = true;
        }
    }
    changed
}
