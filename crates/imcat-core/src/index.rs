//! Blocking-key extraction
//!
//! Derives the normalized keys used to narrow the candidate search space:
//! a title prefix plus the ISBN/LCCN/OCLC identifiers.

use std::collections::BTreeMap;

use im_marc::IndexRecord;
use unicode_normalization::UnicodeNormalization;

/// Length of the normalized title prefix used as a blocking key.
pub const TITLE_KEY_LEN: usize = 25;

/// Kind of blocking key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyType {
    Title,
    Isbn,
    Lccn,
    Oclc,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Title => "title",
            KeyType::Isbn => "isbn",
            KeyType::Lccn => "lccn",
            KeyType::Oclc => "oclc",
        }
    }
}

/// Normalize a title for comparison: fold diacritics (NFKD), keep only
/// ASCII alphanumerics and spaces, lowercase, drop leading articles,
/// collapse whitespace.
pub fn normalize_title(title: &str) -> String {
    let mut result: String = title
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .collect::<String>()
        .to_lowercase();

    for article in ["a ", "an ", "the "] {
        if result.starts_with(article) {
            result = result[article.len()..].to_string();
        }
    }

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized title truncated to the blocking-key prefix length.
pub fn normalize_title_key(title: &str) -> String {
    let norm = normalize_title(title);
    norm.chars().take(TITLE_KEY_LEN).collect()
}

/// Derive the blocking-key mapping for a cheap-mode record. An empty
/// mapping means the item has no usable key and must be skipped.
pub fn index_fields(record: &IndexRecord) -> BTreeMap<KeyType, Vec<String>> {
    let mut fields = BTreeMap::new();
    if let Some(title) = &record.title {
        let key = normalize_title_key(title);
        if !key.is_empty() {
            fields.insert(KeyType::Title, vec![key]);
        }
    }
    if !record.isbns.is_empty() {
        fields.insert(KeyType::Isbn, record.isbns.clone());
    }
    if !record.lccns.is_empty() {
        fields.insert(KeyType::Lccn, record.lccns.clone());
    }
    if !record.oclc_numbers.is_empty() {
        fields.insert(KeyType::Oclc, record.oclc_numbers.clone());
    }
    fields
}
