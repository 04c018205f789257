//! Merge scorer
//!
//! Pairwise match decision between an incoming record and a candidate
//! edition. Source quality is heterogeneous, so no single field is trusted
//! alone: the title must match AND at least one of publisher, publish year,
//! or a shared identifier must independently corroborate.

use std::collections::BTreeSet;

use im_marc::ImportRecord;
use lazy_static::lazy_static;
use regex::Regex;
use strsim::jaro_winkler;
use tracing::debug;

use crate::domain::{Doc, Edition};
use crate::index::normalize_title;
use crate::store::{DocStore, Lookup, StoreError};

/// Maximum redirect-chain depth before a candidate is abandoned. Guards
/// against redirect cycles in the store.
pub const REDIRECT_LIMIT: usize = 10;

/// Editions whose page counts differ by more than this are different
/// physical items.
const PAGE_GAP_LIMIT: u32 = 100;

lazy_static! {
    static ref RE_PUBLISHER_STOPWORD: Regex =
        Regex::new(r"^(publishers?|publishing|press|books?|and|co|company|inc|ltd)$").unwrap();
}

/// Outcome of a pairwise comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchDecision {
    Match,
    NoMatch,
}

/// Field set compared by the scorer, normalized once per side.
#[derive(Debug, Clone, Default)]
pub struct MatchAttributes {
    /// Normalized title variants: with and without subtitle.
    pub titles: Vec<String>,
    /// Normalized author surnames.
    pub surnames: Vec<String>,
    /// One token set per publisher, stopwords removed.
    pub publishers: Vec<BTreeSet<String>>,
    pub publish_year: Option<i32>,
    /// Namespaced identifiers ("isbn:...", "lccn:...", "oclc:...").
    pub identifiers: BTreeSet<String>,
    pub number_of_pages: Option<u32>,
}

impl MatchAttributes {
    pub fn from_import(rec: &ImportRecord) -> Self {
        let mut titles = vec![normalize_title(&rec.full_title())];
        if let Some(subtitle) = &rec.subtitle {
            let with_subtitle = normalize_title(&format!("{} {}", rec.full_title(), subtitle));
            titles.push(with_subtitle);
        }
        MatchAttributes {
            titles,
            surnames: rec.authors.iter().map(|a| surname(a)).collect(),
            publishers: rec.publishers.iter().map(|p| publisher_tokens(p)).collect(),
            publish_year: rec.publish_year,
            identifiers: identifier_set(&rec.isbns, &rec.lccns, &rec.oclc_numbers),
            number_of_pages: rec.number_of_pages,
        }
    }

    pub fn from_edition(edition: &Edition) -> Self {
        let mut titles = vec![normalize_title(&edition.full_title())];
        if let Some(subtitle) = &edition.subtitle {
            titles.push(normalize_title(&format!(
                "{} {}",
                edition.full_title(),
                subtitle
            )));
        }
        // Stored editions carry author keys, not names; surnames come from
        // the by-statement when present.
        let surnames = edition
            .by_statement
            .as_deref()
            .map(by_statement_surnames)
            .unwrap_or_default();
        MatchAttributes {
            titles,
            surnames,
            publishers: edition
                .publishers
                .iter()
                .map(|p| publisher_tokens(p))
                .collect(),
            publish_year: edition.publish_year,
            identifiers: identifier_set(&edition.isbns, &edition.lccns, &edition.oclc_numbers),
            number_of_pages: edition.number_of_pages,
        }
    }
}

/// Pairwise decision per the rule above. Adding a shared identifier can
/// only turn NoMatch into Match, never the reverse.
pub fn compare(a: &MatchAttributes, b: &MatchAttributes) -> MatchDecision {
    if !titles_match(&a.titles, &b.titles) {
        return MatchDecision::NoMatch;
    }
    // Disjoint non-empty author sets rule out a match regardless of the
    // weaker signals.
    if !a.surnames.is_empty() && !b.surnames.is_empty() && !surnames_overlap(a, b) {
        return MatchDecision::NoMatch;
    }
    if pages_conflict(a, b) {
        return MatchDecision::NoMatch;
    }

    let identifier = !a.identifiers.is_disjoint(&b.identifiers);
    let year = years_match(a.publish_year, b.publish_year);
    let publisher = publishers_match(&a.publishers, &b.publishers);

    if identifier || year || publisher {
        debug!(identifier, year, publisher, "merge scorer matched");
        MatchDecision::Match
    } else {
        MatchDecision::NoMatch
    }
}

/// Resolve a candidate key through any redirect chain to a terminal
/// edition. Returns None when the chain ends at a missing document, a
/// non-edition document, or exceeds [`REDIRECT_LIMIT`].
pub fn resolve_candidate(
    store: &dyn DocStore,
    key: &str,
) -> Result<Option<(String, Edition)>, StoreError> {
    let mut current = key.to_string();
    for _ in 0..REDIRECT_LIMIT {
        match store.get(&current)? {
            Lookup::Redirect(location) => {
                debug!(from = %current, to = %location, "following redirect");
                current = location;
            }
            Lookup::Doc(Doc::Edition(edition)) => return Ok(Some((current, edition))),
            Lookup::Doc(_) | Lookup::Missing => return Ok(None),
        }
    }
    debug!(key, "redirect chain exceeded depth limit, candidate discarded");
    Ok(None)
}

fn titles_match(a: &[String], b: &[String]) -> bool {
    for ta in a {
        for tb in b {
            if ta.is_empty() || tb.is_empty() {
                continue;
            }
            if ta == tb || ta.contains(tb.as_str()) || tb.contains(ta.as_str()) {
                return true;
            }
        }
    }
    false
}

fn surnames_overlap(a: &MatchAttributes, b: &MatchAttributes) -> bool {
    a.surnames.iter().any(|sa| {
        b.surnames
            .iter()
            .any(|sb| sa == sb || jaro_winkler(sa, sb) > 0.9)
    })
}

fn years_match(a: Option<i32>, b: Option<i32>) -> bool {
    match (a, b) {
        (Some(ya), Some(yb)) => (ya - yb).abs() <= 1,
        _ => false,
    }
}

fn publishers_match(a: &[BTreeSet<String>], b: &[BTreeSet<String>]) -> bool {
    for pa in a {
        for pb in b {
            if pa.is_empty() || pb.is_empty() {
                continue;
            }
            let overlap = pa.intersection(pb).count();
            let smaller = pa.len().min(pb.len());
            if overlap * 2 >= smaller {
                return true;
            }
        }
    }
    false
}

fn pages_conflict(a: &MatchAttributes, b: &MatchAttributes) -> bool {
    match (a.number_of_pages, b.number_of_pages) {
        (Some(pa), Some(pb)) => pa.abs_diff(pb) > PAGE_GAP_LIMIT,
        _ => false,
    }
}

fn publisher_tokens(publisher: &str) -> BTreeSet<String> {
    normalize_title(publisher)
        .split_whitespace()
        .filter(|t| !RE_PUBLISHER_STOPWORD.is_match(t))
        .map(|t| t.to_string())
        .collect()
}

/// Surname of one author name, either "Last, First" or "First Last".
fn surname(name: &str) -> String {
    let norm = normalize_name(name);
    if let Some(comma) = name.find(',') {
        return normalize_name(&name[..comma]);
    }
    norm.split_whitespace()
        .last()
        .unwrap_or_default()
        .to_string()
}

fn by_statement_surnames(by: &str) -> Vec<String> {
    by.split([',', ';'])
        .flat_map(|part| part.split(" and "))
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("by"))
        .map(surname)
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_name(name: &str) -> String {
    normalize_title(name)
        .split_whitespace()
        .filter(|t| t.parse::<u32>().is_err())
        .collect::<Vec<_>>()
        .join(" ")
}

fn identifier_set(isbns: &[String], lccns: &[String], oclcs: &[String]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    out.extend(isbns.iter().map(|v| format!("isbn:{v}")));
    out.extend(lccns.iter().map(|v| format!("lccn:{v}")));
    out.extend(oclcs.iter().map(|v| format!("oclc:{v}")));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(title: &str) -> MatchAttributes {
        MatchAttributes {
            titles: vec![normalize_title(title)],
            ..MatchAttributes::default()
        }
    }

    #[test]
    fn test_title_alone_is_not_enough() {
        let a = attrs("Hamlet");
        let b = attrs("Hamlet");
        assert_eq!(compare(&a, &b), MatchDecision::NoMatch);
    }

    #[test]
    fn test_title_plus_year_matches() {
        let mut a = attrs("Hamlet");
        a.publish_year = Some(1985);
        let mut b = attrs("Hamlet");
        b.publish_year = Some(1986);
        assert_eq!(compare(&a, &b), MatchDecision::Match);
    }

    #[test]
    fn test_title_plus_identifier_matches() {
        let mut a = attrs("Hamlet");
        a.identifiers.insert("isbn:0486272788".to_string());
        let mut b = attrs("Hamlet: a tragedy");
        b.identifiers.insert("isbn:0486272788".to_string());
        assert_eq!(compare(&a, &b), MatchDecision::Match);
    }

    #[test]
    fn test_identifier_without_title_match_is_rejected() {
        let mut a = attrs("Hamlet");
        a.identifiers.insert("isbn:0486272788".to_string());
        let mut b = attrs("Macbeth");
        b.identifiers.insert("isbn:0486272788".to_string());
        assert_eq!(compare(&a, &b), MatchDecision::NoMatch);
    }

    #[test]
    fn test_publisher_fuzzy_match() {
        let mut a = attrs("Hamlet");
        a.publishers = vec![publisher_tokens("Dover Publications")];
        let mut b = attrs("Hamlet");
        b.publishers = vec![publisher_tokens("Dover Press and Co.")];
        assert_eq!(compare(&a, &b), MatchDecision::Match);
    }

    #[test]
    fn test_disjoint_authors_veto() {
        let mut a = attrs("Collected poems");
        a.publish_year = Some(1950);
        a.surnames = vec!["yeats".to_string()];
        let mut b = attrs("Collected poems");
        b.publish_year = Some(1950);
        b.surnames = vec!["frost".to_string()];
        assert_eq!(compare(&a, &b), MatchDecision::NoMatch);
    }

    #[test]
    fn test_scorer_monotone_in_identifiers() {
        let mut a = attrs("Hamlet");
        a.publish_year = Some(1985);
        let mut b = attrs("Hamlet");
        b.publish_year = Some(1985);
        assert_eq!(compare(&a, &b), MatchDecision::Match);

        // Adding the same ISBN to both sides must keep the match.
        a.identifiers.insert("isbn:0486272788".to_string());
        b.identifiers.insert("isbn:0486272788".to_string());
        assert_eq!(compare(&a, &b), MatchDecision::Match);
    }

    #[test]
    fn test_page_gap_rules_out() {
        let mut a = attrs("Hamlet");
        a.publish_year = Some(1985);
        a.number_of_pages = Some(90);
        let mut b = attrs("Hamlet");
        b.publish_year = Some(1985);
        b.number_of_pages = Some(600);
        assert_eq!(compare(&a, &b), MatchDecision::NoMatch);
    }

    #[test]
    fn test_substring_title_match() {
        let a = attrs("Hamlet");
        let mut b = attrs("Hamlet: A Tragedy");
        b.publish_year = Some(1985);
        let mut a2 = a.clone();
        a2.publish_year = Some(1985);
        assert_eq!(compare(&a2, &b), MatchDecision::Match);
    }

    #[test]
    fn test_redirect_chain_resolution() {
        use crate::domain::{Edition, Redirect};
        use crate::store::{DocStore, MemoryStore};

        let store = MemoryStore::new();
        let terminal = store
            .create(
                Doc::Edition(Edition {
                    title: "Hamlet".to_string(),
                    ..Edition::default()
                }),
                "test",
            )
            .unwrap();
        store
            .save(
                Doc::Redirect(Redirect {
                    key: "/books/OL90M".to_string(),
                    location: "/books/OL91M".to_string(),
                }),
                "merge",
            )
            .unwrap();
        store
            .save(
                Doc::Redirect(Redirect {
                    key: "/books/OL91M".to_string(),
                    location: terminal.clone(),
                }),
                "merge",
            )
            .unwrap();

        let resolved = resolve_candidate(&store, "/books/OL90M").unwrap();
        assert_eq!(resolved.unwrap().0, terminal);
    }

    #[test]
    fn test_redirect_cycle_discarded() {
        use crate::domain::Redirect;
        use crate::store::{DocStore, MemoryStore};

        let store = MemoryStore::new();
        let a = "/books/OL1M".to_string();
        let b = "/books/OL2M".to_string();
        store
            .save(
                Doc::Redirect(Redirect {
                    key: a.clone(),
                    location: b.clone(),
                }),
                "merge",
            )
            .unwrap();
        store
            .save(
                Doc::Redirect(Redirect {
                    key: b,
                    location: a.clone(),
                }),
                "merge",
            )
            .unwrap();
        assert!(resolve_candidate(&store, &a).unwrap().is_none());
    }
}
