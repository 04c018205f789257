//! Catalog document models
//!
//! Documents mirror the store's JSON shapes: an edition describes one
//! published instance, a work the abstract creation its editions share,
//! and a redirect a superseded key pointing at its replacement.

use im_marc::ImportRecord;
use serde::{Deserialize, Serialize};

/// One published instance of a book.
///
/// Holds at most one work reference. Merges are append-only: identifiers
/// and source records are only ever added, never removed or overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edition {
    pub key: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_statement: Option<String>,
    /// Author document keys.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Work document key; at most one in this design.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work: Option<String>,
    /// Work title embedded in the source record (MARC 240), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_title: Option<String>,
    #[serde(default)]
    pub publishers: Vec<String>,
    #[serde(default)]
    pub publish_places: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_pages: Option<u32>,
    #[serde(default)]
    pub isbns: Vec<String>,
    #[serde(default)]
    pub lccns: Vec<String>,
    #[serde(default)]
    pub oclc_numbers: Vec<String>,
    /// Archival scan identifier, when the edition came from a scan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocaid: Option<String>,
    #[serde(default)]
    pub source_records: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub table_of_contents: Vec<String>,
}

impl Edition {
    /// Build an unkeyed edition from a fully extracted record. Author keys
    /// and the work reference are attached by the writer.
    pub fn from_record(rec: &ImportRecord) -> Self {
        Edition {
            key: None,
            title: rec.title.clone(),
            title_prefix: rec.title_prefix.clone(),
            subtitle: rec.subtitle.clone(),
            by_statement: rec.by_statement.clone(),
            authors: Vec::new(),
            work: None,
            work_title: rec.work_title.clone(),
            publishers: rec.publishers.clone(),
            publish_places: rec.publish_places.clone(),
            publish_date: rec.publish_date.clone(),
            publish_year: rec.publish_year,
            pagination: rec.pagination.clone(),
            number_of_pages: rec.number_of_pages,
            isbns: rec.isbns.clone(),
            lccns: rec.lccns.clone(),
            oclc_numbers: rec.oclc_numbers.clone(),
            ocaid: None,
            source_records: Vec::new(),
            languages: rec.languages.clone(),
            subjects: rec.subjects.clone(),
            table_of_contents: rec.table_of_contents.clone(),
        }
    }

    /// Display title including any non-filing prefix.
    pub fn full_title(&self) -> String {
        match &self.title_prefix {
            Some(prefix) => format!("{} {}", prefix.trim_end(), self.title),
            None => self.title.clone(),
        }
    }
}

/// The abstract creation shared by one or more editions. Editions point at
/// works; works do not list their editions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub key: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Author document keys.
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub key: Option<String>,
    pub name: String,
}

/// A superseded document pointing at its replacement key. Redirect chains
/// must always be resolved to a terminal non-redirect before use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    pub key: String,
    pub location: String,
}

/// Any document the store can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Doc {
    Edition(Edition),
    Work(Work),
    Author(Author),
    Redirect(Redirect),
}

impl Doc {
    pub fn key(&self) -> Option<&str> {
        match self {
            Doc::Edition(e) => e.key.as_deref(),
            Doc::Work(w) => w.key.as_deref(),
            Doc::Author(a) => a.key.as_deref(),
            Doc::Redirect(r) => Some(&r.key),
        }
    }

    pub fn set_key(&mut self, key: String) {
        match self {
            Doc::Edition(e) => e.key = Some(key),
            Doc::Work(w) => w.key = Some(key),
            Doc::Author(a) => a.key = Some(key),
            Doc::Redirect(r) => r.key = key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Doc::Edition(_) => "edition",
            Doc::Work(_) => "work",
            Doc::Author(_) => "author",
            Doc::Redirect(_) => "redirect",
        }
    }
}
