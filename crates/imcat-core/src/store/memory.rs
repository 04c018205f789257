//! In-memory document store
//!
//! Backend for tests and local runs. Keys follow the catalog convention:
//! `/books/OL{n}M`, `/works/OL{n}W`, `/authors/OL{n}A`.

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{DocStore, Lookup, Query, StoreError};
use crate::domain::Doc;
use crate::index::{normalize_title_key, KeyType};

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Doc>,
    next_id: u64,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("store poisoned").docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn assign_key(inner: &mut Inner, doc: &Doc) -> String {
        inner.next_id += 1;
        let n = inner.next_id;
        match doc {
            Doc::Edition(_) => format!("/books/OL{n}M"),
            Doc::Work(_) => format!("/works/OL{n}W"),
            Doc::Author(_) => format!("/authors/OL{n}A"),
            Doc::Redirect(_) => format!("/redirects/OL{n}R"),
        }
    }
}

impl DocStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Lookup, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(match inner.docs.get(key) {
            Some(Doc::Redirect(r)) => Lookup::Redirect(r.location.clone()),
            Some(doc) => Lookup::Doc(doc.clone()),
            None => Lookup::Missing,
        })
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<Doc>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        Ok(keys
            .iter()
            .filter_map(|k| inner.docs.get(k).cloned())
            .collect())
    }

    fn create(&self, mut doc: Doc, _comment: &str) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().expect("store poisoned");
        let key = Self::assign_key(&mut inner, &doc);
        doc.set_key(key.clone());
        inner.docs.insert(key.clone(), doc);
        Ok(key)
    }

    fn save(&self, doc: Doc, _comment: &str) -> Result<(), StoreError> {
        let key = doc
            .key()
            .ok_or_else(|| StoreError::Validation("save requires a key".to_string()))?
            .to_string();
        let mut inner = self.inner.lock().expect("store poisoned");
        inner.docs.insert(key, doc);
        Ok(())
    }

    fn save_many(&self, docs: Vec<Doc>, comment: &str) -> Result<(), StoreError> {
        for doc in docs {
            self.save(doc, comment)?;
        }
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().expect("store poisoned");
        let mut keys = Vec::new();
        for (key, doc) in &inner.docs {
            let hit = match (query, doc) {
                (Query::EditionsByIndexKey(kind, values), Doc::Edition(e)) => match kind {
                    KeyType::Title => {
                        let norm = normalize_title_key(&e.full_title());
                        values.contains(&norm)
                    }
                    KeyType::Isbn => e.isbns.iter().any(|v| values.contains(v)),
                    KeyType::Lccn => e.lccns.iter().any(|v| values.contains(v)),
                    KeyType::Oclc => e.oclc_numbers.iter().any(|v| values.contains(v)),
                },
                (Query::EditionsBySourceRecord(src), Doc::Edition(e)) => {
                    e.source_records.contains(src)
                }
                (Query::EditionsByOcaid(ocaid), Doc::Edition(e)) => {
                    e.ocaid.as_deref() == Some(ocaid.as_str())
                }
                (Query::EditionsByAuthor(author), Doc::Edition(e)) => {
                    e.authors.contains(author)
                }
                (Query::WorksByAuthor(author), Doc::Work(w)) => w.authors.contains(author),
                (Query::RedirectsTo(target), Doc::Redirect(r)) => r.location == *target,
                _ => false,
            };
            if hit {
                keys.push(key.clone());
            }
        }
        Ok(keys)
    }
}
