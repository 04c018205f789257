//! Field extraction: cheap index-mode and full edition-mode
//!
//! Cheap mode pulls only the handful of fields needed to build blocking
//! keys. Full mode extracts the complete importable dataset and promotes it
//! through a validating builder that requires a title.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MarcError;
use crate::record::Record;

lazy_static! {
    static ref RE_OCLC: Regex = Regex::new(r"^\(OCoLC\)[^0-9]*0*(\d+)").unwrap();
    static ref RE_YEAR: Regex = Regex::new(r"(\d{4})").unwrap();
    static ref RE_PAGES: Regex = Regex::new(r"(\d+)").unwrap();
}

/// Cheap-mode extraction, used purely to derive blocking keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub title: Option<String>,
    pub isbns: Vec<String>,
    pub lccns: Vec<String>,
    pub oclc_numbers: Vec<String>,
}

impl IndexRecord {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.isbns.is_empty()
            && self.lccns.is_empty()
            && self.oclc_numbers.is_empty()
    }
}

/// Full-mode extraction: the complete importable dataset for one edition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub title: String,
    pub title_prefix: Option<String>,
    pub subtitle: Option<String>,
    pub by_statement: Option<String>,
    pub authors: Vec<String>,
    pub work_title: Option<String>,
    pub publishers: Vec<String>,
    pub publish_places: Vec<String>,
    pub publish_date: Option<String>,
    pub publish_year: Option<i32>,
    pub pagination: Option<String>,
    pub number_of_pages: Option<u32>,
    pub isbns: Vec<String>,
    pub lccns: Vec<String>,
    pub oclc_numbers: Vec<String>,
    pub languages: Vec<String>,
    pub subjects: Vec<String>,
    pub table_of_contents: Vec<String>,
}

impl ImportRecord {
    /// Display title including any non-filing prefix.
    pub fn full_title(&self) -> String {
        match &self.title_prefix {
            Some(prefix) => format!("{} {}", prefix.trim_end(), self.title),
            None => self.title.clone(),
        }
    }

    /// Cheap-mode view of an already fully extracted record.
    pub fn index_record(&self) -> IndexRecord {
        IndexRecord {
            title: Some(self.full_title()),
            isbns: self.isbns.clone(),
            lccns: self.lccns.clone(),
            oclc_numbers: self.oclc_numbers.clone(),
        }
    }
}

/// Accumulates extracted fields; `build` promotes to an [`ImportRecord`]
/// only once the required title is present.
#[derive(Debug, Clone, Default)]
pub struct ImportRecordBuilder {
    pub title: Option<String>,
    pub title_prefix: Option<String>,
    pub subtitle: Option<String>,
    pub by_statement: Option<String>,
    pub authors: Vec<String>,
    pub work_title: Option<String>,
    pub publishers: Vec<String>,
    pub publish_places: Vec<String>,
    pub publish_date: Option<String>,
    pub publish_year: Option<i32>,
    pub pagination: Option<String>,
    pub number_of_pages: Option<u32>,
    pub isbns: Vec<String>,
    pub lccns: Vec<String>,
    pub oclc_numbers: Vec<String>,
    pub languages: Vec<String>,
    pub subjects: Vec<String>,
    pub table_of_contents: Vec<String>,
}

impl ImportRecordBuilder {
    pub fn build(self) -> Result<ImportRecord, MarcError> {
        let title = self.title.filter(|t| !t.is_empty()).ok_or(MarcError::NoTitle)?;
        Ok(ImportRecord {
            title,
            title_prefix: self.title_prefix,
            subtitle: self.subtitle,
            by_statement: self.by_statement,
            authors: self.authors,
            work_title: self.work_title,
            publishers: self.publishers,
            publish_places: self.publish_places,
            publish_date: self.publish_date,
            publish_year: self.publish_year,
            pagination: self.pagination,
            number_of_pages: self.number_of_pages,
            isbns: self.isbns,
            lccns: self.lccns,
            oclc_numbers: self.oclc_numbers,
            languages: self.languages,
            subjects: self.subjects,
            table_of_contents: self.table_of_contents,
        })
    }
}

/// Cheap mode: extract only the blocking-key fields (245, 020, 010, 035).
pub fn read_index_record(rec: &Record) -> IndexRecord {
    IndexRecord {
        title: read_title(rec).map(|(prefix, title, subtitle)| {
            join_title(&prefix, &title, &subtitle)
        }),
        isbns: read_isbns(rec),
        lccns: read_lccns(rec),
        oclc_numbers: read_oclc_numbers(rec),
    }
}

/// Full mode: extract the complete importable dataset.
pub fn read_edition(rec: &Record) -> Result<ImportRecord, MarcError> {
    let mut builder = ImportRecordBuilder::default();

    if let Some((prefix, title, subtitle)) = read_title(rec) {
        builder.title = Some(title);
        builder.title_prefix = prefix;
        builder.subtitle = subtitle;
    }
    if let Some(field) = rec.first("245") {
        builder.by_statement = field.value_of('c').map(clean_value);
    }

    builder.authors = read_authors(rec);

    if let Some(field) = rec.first("240") {
        let wt = field.values(&['a']).join(" ");
        let wt = wt.trim_matches(|c| c == '.' || c == ' ').to_string();
        if !wt.is_empty() {
            builder.work_title = Some(wt);
        }
    }

    for field in rec.fields("260") {
        builder
            .publish_places
            .extend(field.values(&['a']).iter().map(|v| clean_value(v)));
        builder
            .publishers
            .extend(field.values(&['b']).iter().map(|v| clean_value(v)));
        if builder.publish_date.is_none() {
            builder.publish_date = field.value_of('c').map(clean_value);
        }
    }

    // Fixed-length data: publish year at bytes 7-10, language at 35-37.
    if let Some(f008) = rec.control_value("008") {
        builder.publish_year = f008
            .get(7..11)
            .filter(|y| y.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|y| y.parse().ok());
        if let Some(lang) = f008.get(35..38).filter(|l| l.bytes().all(|b| b.is_ascii_lowercase())) {
            builder.languages.push(lang.to_string());
        }
    }
    if builder.publish_year.is_none() {
        if let Some(date) = &builder.publish_date {
            builder.publish_year = RE_YEAR
                .captures(date)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok());
        }
    }
    for lang in rec.subfield_values("041", &['a']) {
        let lang = lang.trim().to_lowercase();
        if lang.len() == 3 && !builder.languages.contains(&lang) {
            builder.languages.push(lang);
        }
    }

    if let Some(field) = rec.first("300") {
        let pagination = field.values(&['a']).join(" ");
        if !pagination.is_empty() {
            builder.number_of_pages = RE_PAGES
                .captures(&pagination)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok());
            builder.pagination = Some(pagination);
        }
    }

    builder.isbns = read_isbns(rec);
    builder.lccns = read_lccns(rec);
    builder.oclc_numbers = read_oclc_numbers(rec);

    for tag in ["600", "610", "650", "651"] {
        for value in rec.subfield_values(tag, &['a']) {
            let subject = value.trim_end_matches(['.', ' ']).to_string();
            if !subject.is_empty() && !builder.subjects.contains(&subject) {
                builder.subjects.push(subject);
            }
        }
    }

    for field in rec.fields("505") {
        if let Some(contents) = field.value_of('a') {
            builder
                .table_of_contents
                .extend(contents.split(" -- ").map(|s| s.trim().to_string()));
        } else {
            builder
                .table_of_contents
                .extend(field.values(&['t']).iter().map(|v| clean_value(v)));
        }
    }

    builder.build()
}

/// Title parts from 245: (non-filing prefix, title, subtitle).
fn read_title(rec: &Record) -> Option<(Option<String>, String, Option<String>)> {
    let field = rec.first("245")?;
    let raw = field.value_of('a')?.to_string();

    // Second indicator gives the count of non-filing characters.
    let nonfiling = field.indicator2().to_digit(10).unwrap_or(0) as usize;
    let (prefix, rest) = match raw.char_indices().nth(nonfiling) {
        Some((pos, _)) if pos > 0 => {
            let (p, r) = raw.split_at(pos);
            (Some(p.trim().to_string()).filter(|p| !p.is_empty()), r)
        }
        _ => (None, raw.as_str()),
    };

    let title = clean_value(rest);
    if title.is_empty() {
        return None;
    }
    let subtitle = field
        .value_of('b')
        .map(clean_value)
        .filter(|s| !s.is_empty());
    Some((prefix, title, subtitle))
}

fn join_title(prefix: &Option<String>, title: &str, subtitle: &Option<String>) -> String {
    let mut full = String::new();
    if let Some(p) = prefix {
        full.push_str(p);
        full.push(' ');
    }
    full.push_str(title);
    if let Some(s) = subtitle {
        full.push(' ');
        full.push_str(s);
    }
    full
}

fn read_authors(rec: &Record) -> Vec<String> {
    let mut authors = Vec::new();
    for (tag, codes) in [
        ("100", &['a', 'b', 'c', 'd'][..]),
        ("110", &['a', 'b'][..]),
        ("111", &['a'][..]),
    ] {
        for field in rec.fields(tag) {
            let name = field
                .values(codes)
                .iter()
                .map(|v| v.trim())
                .collect::<Vec<_>>()
                .join(" ");
            let name = name.trim_end_matches(['.', ',', ' ']).to_string();
            if !name.is_empty() {
                authors.push(name);
            }
        }
    }
    authors
}

fn read_isbns(rec: &Record) -> Vec<String> {
    let mut isbns = Vec::new();
    for value in rec.subfield_values("020", &['a']) {
        if let Some(isbn) = normalize_isbn(value) {
            if !isbns.contains(&isbn) {
                isbns.push(isbn);
            }
        }
    }
    isbns
}

/// First token of the subfield, hyphens stripped; must look like an
/// ISBN-10 or ISBN-13.
pub fn normalize_isbn(value: &str) -> Option<String> {
    let token = value.split_whitespace().next()?;
    let isbn: String = token
        .chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    let valid_chars = isbn
        .chars()
        .all(|c| c.is_ascii_digit() || c == 'X');
    if valid_chars && (isbn.len() == 10 || isbn.len() == 13) {
        Some(isbn)
    } else {
        None
    }
}

fn read_lccns(rec: &Record) -> Vec<String> {
    let mut lccns = Vec::new();
    for value in rec.subfield_values("010", &['a']) {
        if let Some(lccn) = normalize_lccn(value) {
            if !lccns.contains(&lccn) {
                lccns.push(lccn);
            }
        }
    }
    lccns
}

/// LCCN normalization: spaces removed, revision suffix after '/' dropped.
pub fn normalize_lccn(value: &str) -> Option<String> {
    let lccn: String = value
        .split('/')
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if lccn.chars().any(|c| c.is_ascii_digit()) {
        Some(lccn)
    } else {
        None
    }
}

fn read_oclc_numbers(rec: &Record) -> Vec<String> {
    let mut numbers = Vec::new();
    for value in rec.subfield_values("035", &['a']) {
        if let Some(caps) = RE_OCLC.captures(value.trim()) {
            let number = caps[1].to_string();
            if !numbers.contains(&number) {
                numbers.push(number);
            }
        }
    }
    numbers
}

/// Strip ISBD separator punctuation and a single trailing dot.
fn clean_value(value: &str) -> String {
    let trimmed = value.trim().trim_end_matches([' ', '/', ',', ';', ':']);
    let trimmed = if trimmed.ends_with('.') && !trimmed.ends_with("..") {
        &trimmed[..trimmed.len() - 1]
    } else {
        trimmed
    };
    trimmed.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, FieldContent, Subfield};

    fn record(fields: Vec<Field>) -> Record {
        Record::new("00000cam a2200000 a 4500".to_string(), fields)
    }

    fn data(tag: &str, ind2: char, subfields: &[(char, &str)]) -> Field {
        Field {
            tag: tag.to_string(),
            content: FieldContent::Data {
                indicators: (' ', ind2),
                subfields: subfields
                    .iter()
                    .map(|(code, value)| Subfield {
                        code: *code,
                        value: value.to_string(),
                    })
                    .collect(),
            },
        }
    }

    fn control(tag: &str, value: &str) -> Field {
        Field {
            tag: tag.to_string(),
            content: FieldContent::Control(value.to_string()),
        }
    }

    #[test]
    fn test_read_edition_full() {
        let rec = record(vec![
            control("008", "850101s1985    nyu           000 0 eng  "),
            data("010", ' ', &[('a', "   85001234 ")]),
            data("020", ' ', &[('a', "0-486-27278-8 (pbk.)")]),
            data("035", ' ', &[('a', "(OCoLC)00012345")]),
            data("100", ' ', &[('a', "Shakespeare, William,"), ('d', "1564-1616.")]),
            data("245", '4', &[('a', "The tragedy of Hamlet :"), ('b', "prince of Denmark /"), ('c', "by William Shakespeare.")]),
            data("260", ' ', &[('a', "New York :"), ('b', "Dover Publications,"), ('c', "1985.")]),
            data("300", ' ', &[('a', "xii, 294 p. ;")]),
            data("650", '0', &[('a', "Princes -- Drama.")]),
        ]);
        let edition = read_edition(&rec).unwrap();
        assert_eq!(edition.title, "tragedy of Hamlet");
        assert_eq!(edition.title_prefix.as_deref(), Some("The"));
        assert_eq!(edition.subtitle.as_deref(), Some("prince of Denmark"));
        assert_eq!(edition.full_title(), "The tragedy of Hamlet");
        assert_eq!(edition.authors, vec!["Shakespeare, William, 1564-1616"]);
        assert_eq!(edition.publishers, vec!["Dover Publications"]);
        assert_eq!(edition.publish_year, Some(1985));
        assert_eq!(edition.isbns, vec!["0486272788"]);
        assert_eq!(edition.lccns, vec!["85001234"]);
        assert_eq!(edition.oclc_numbers, vec!["12345"]);
        assert_eq!(edition.languages, vec!["eng"]);
        assert_eq!(edition.number_of_pages, Some(294));
        assert_eq!(edition.subjects, vec!["Princes -- Drama"]);
    }

    #[test]
    fn test_no_title_is_error() {
        let rec = record(vec![data("020", ' ', &[('a', "0486272788")])]);
        assert_eq!(read_edition(&rec).unwrap_err(), MarcError::NoTitle);
    }

    #[test]
    fn test_cheap_mode_only_index_fields() {
        let rec = record(vec![
            data("245", '0', &[('a', "Macbeth.")]),
            data("020", ' ', &[('a', "9780141396316")]),
        ]);
        let index = read_index_record(&rec);
        assert_eq!(index.title.as_deref(), Some("Macbeth"));
        assert_eq!(index.isbns, vec!["9780141396316"]);
        assert!(index.lccns.is_empty());
    }

    #[test]
    fn test_empty_index_record() {
        let rec = record(vec![data("999", ' ', &[('a', "local note")])]);
        assert!(read_index_record(&rec).is_empty());
    }

    #[test]
    fn test_normalize_isbn() {
        assert_eq!(normalize_isbn("0-486-27278-8"), Some("0486272788".to_string()));
        assert_eq!(normalize_isbn("043963270x (pbk.)"), Some("043963270X".to_string()));
        assert_eq!(normalize_isbn("not an isbn"), None);
    }

    #[test]
    fn test_work_title_from_240() {
        let rec = record(vec![
            data("240", ' ', &[('a', "Hamlet. ")]),
            data("245", '0', &[('a', "The tragicall historie of Hamlet")]),
        ]);
        let edition = read_edition(&rec).unwrap();
        assert_eq!(edition.work_title.as_deref(), Some("Hamlet"));
    }

    #[test]
    fn test_toc_split() {
        let rec = record(vec![
            data("245", '0', &[('a', "Collected plays")]),
            data("505", '0', &[('a', "Hamlet -- Macbeth -- King Lear.")]),
        ]);
        let edition = read_edition(&rec).unwrap();
        assert_eq!(
            edition.table_of_contents,
            vec!["Hamlet", "Macbeth", "King Lear."]
        );
    }
}
