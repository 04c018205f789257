//! Work clustering engine
//!
//! Groups one author's editions into works. Editions vote on a shared
//! normalized title (optionally remapped through embedded work titles),
//! each group becomes a provisional cluster, and clusters are reconciled
//! against the works already in the store: merge where a single work is
//! uniquely claimed, redirect superseded works to a winner, and resolve
//! contested works by majority edition count.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::domain::{Doc, Edition, Redirect, Work};
use crate::error::ClusterError;
use crate::index::normalize_title;
use crate::scorer::REDIRECT_LIMIT;
use crate::store::{with_retry, DocStore, Lookup, Query, SearchIndex};

lazy_static! {
    /// Trailing dot that belongs to an abbreviation, not sentence
    /// punctuation.
    static ref RE_ABBREV: Regex =
        Regex::new(r"\b([A-Z]|Co|Dr|Jr|Capt|Mr|Mrs|Ms|Prof|Rev|Revd|Hon|etc)\.$").unwrap();
    /// Franchise suffixes like "The Dollar Hen (Illustrated Edition) (Dodo Press)".
    static ref RE_PARENS: Regex = Regex::new(
        r"(?i)^(.*?)(?: \(.+ (?:Edition|Press|Print|Plays|Collection|Publication|Novels|Mysteries|Book Series|Classics Library|Classics|Books)\))+$"
    ).unwrap();
}

/// Generic collection titles that say nothing about the work itself.
const BAD_WORK_TITLES: &[&str] = &[
    "Publications",
    "Works. English",
    "Missal",
    "Works",
    "Report",
    "Letters",
    "Calendar",
    "Bulletin",
    "Plays",
    "Sermons",
    "Correspondence",
    "Bill",
    "Bills",
    "Selections",
    "Selected works",
    "Selected works. English",
    "The Novels",
    "Laws, etc",
];

/// Totals for one author's clustering run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClusterStats {
    pub clusters: usize,
    pub works_created: usize,
    pub works_merged: usize,
    pub redirects_written: usize,
    pub editions_updated: usize,
}

/// One edition prepared for clustering.
#[derive(Debug, Clone)]
struct Book {
    key: String,
    /// Cleaned display title, subtitle split off.
    title: String,
    norm_title: String,
    work_title: Option<String>,
    norm_wt: Option<String>,
    subtitle: Option<String>,
    english: bool,
    subjects: Vec<String>,
}

/// Provisional cluster: editions agreeing on a normalized title.
#[derive(Debug, Clone)]
struct Cluster {
    norm: String,
    /// Canonical display title: the most frequent literal variant.
    title: String,
    subtitle: Option<String>,
    editions: Vec<String>,
    subjects: Vec<String>,
    /// Existing work keys claimed by member editions, with claim counts.
    existing: BTreeMap<String, u32>,
    best_match: Option<String>,
}

/// Clusters one author's editions into works against a store.
pub struct WorkClusterer<'a> {
    store: &'a dyn DocStore,
    search: &'a dyn SearchIndex,
}

impl<'a> WorkClusterer<'a> {
    pub fn new(store: &'a dyn DocStore, search: &'a dyn SearchIndex) -> Self {
        WorkClusterer { store, search }
    }

    /// Run the full clustering pass for one author. Committed writes are
    /// retained even when a consistency fault aborts the remaining
    /// clusters.
    pub fn cluster_author(&self, author_key: &str) -> Result<ClusterStats, ClusterError> {
        let books = self.load_books(author_key)?;
        if books.is_empty() {
            return Ok(ClusterStats::default());
        }
        let mut clusters = build_clusters(&books);
        let mut stats = ClusterStats {
            clusters: clusters.len(),
            ..ClusterStats::default()
        };

        let (edition_to_work, work_to_edition, work_by_key) =
            self.repair_redirects(author_key)?;

        claim_existing_works(&mut clusters, &edition_to_work, &work_by_key);
        let claimed_titles = titles_by_claimed_work(&clusters);
        self.resolve_contests(
            &mut clusters,
            &claimed_titles,
            &work_to_edition,
            &work_by_key,
        )?;

        // Member editions must never be re-pointed by a rival cluster's
        // merge.
        let mut owner: BTreeMap<String, usize> = BTreeMap::new();
        for (i, cluster) in clusters.iter().enumerate() {
            for ekey in &cluster.editions {
                owner.insert(ekey.clone(), i);
            }
        }

        for i in 0..clusters.len() {
            if clusters[i].best_match.is_none() {
                if let Some((wkey, _)) = single_uncontested_claim(&clusters[i], &claimed_titles) {
                    clusters[i].best_match = Some(wkey);
                }
            }
            let cluster = clusters[i].clone();
            if let Some(best) = &cluster.best_match {
                self.merge_into_existing(
                    author_key,
                    &cluster,
                    best,
                    &work_to_edition,
                    &work_by_key,
                    &owner,
                    i,
                    &mut stats,
                )?;
            } else if cluster.existing.is_empty() {
                self.create_new_work(author_key, &cluster, &mut stats)?;
            } else {
                // Several uncontested existing works: the one whose live
                // editions carry the most matching literal titles wins,
                // ties broken by key order.
                let best = self
                    .best_claimed_work(&cluster, &work_to_edition)?
                    .ok_or_else(|| ClusterError::Consistency("empty claim table".to_string()))?;
                self.merge_into_existing(
                    author_key,
                    &cluster,
                    &best,
                    &work_to_edition,
                    &work_by_key,
                    &owner,
                    i,
                    &mut stats,
                )?;
            }
        }
        info!(
            author = author_key,
            clusters = stats.clusters,
            created = stats.works_created,
            merged = stats.works_merged,
            "clustered author"
        );
        Ok(stats)
    }

    fn load_books(&self, author_key: &str) -> Result<Vec<Book>, ClusterError> {
        let keys = with_retry("query editions by author", || {
            self.store
                .query(&Query::EditionsByAuthor(author_key.to_string()))
        })?;
        let mut books = Vec::new();
        for key in keys {
            let edition = self.get_edition(&key)?;
            if let Some(book) = prepare_book(&key, &edition) {
                books.push(book);
            }
        }
        Ok(books)
    }

    /// Repair edition-to-work links that point at redirects, looping until
    /// none remain. Returns the final link maps and the works themselves.
    #[allow(clippy::type_complexity)]
    fn repair_redirects(
        &self,
        author_key: &str,
    ) -> Result<
        (
            BTreeMap<String, String>,
            BTreeMap<String, BTreeSet<String>>,
            BTreeMap<String, Work>,
        ),
        ClusterError,
    > {
        for _ in 0..REDIRECT_LIMIT {
            let mut edition_to_work = BTreeMap::new();
            let mut work_to_edition: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
            let edition_keys = with_retry("query editions by author", || {
                self.store
                    .query(&Query::EditionsByAuthor(author_key.to_string()))
            })?;
            for ekey in &edition_keys {
                let edition = self.get_edition(ekey)?;
                if let Some(wkey) = edition.work {
                    edition_to_work.insert(ekey.clone(), wkey.clone());
                    work_to_edition.entry(wkey).or_default().insert(ekey.clone());
                }
            }

            let mut work_by_key = BTreeMap::new();
            let mut fixes: Vec<Doc> = Vec::new();
            for (wkey, ekeys) in &work_to_edition {
                match with_retry("get work", || self.store.get(wkey))? {
                    Lookup::Redirect(location) => {
                        debug!(from = %wkey, to = %location, "repointing editions past redirect");
                        for ekey in ekeys {
                            let mut edition = self.get_edition(ekey)?;
                            edition.work = Some(location.clone());
                            fixes.push(Doc::Edition(edition));
                        }
                    }
                    Lookup::Doc(Doc::Work(work)) => {
                        work_by_key.insert(wkey.clone(), work);
                    }
                    Lookup::Missing => {
                        return Err(ClusterError::Consistency(format!(
                            "edition work reference {wkey} is missing"
                        )));
                    }
                    Lookup::Doc(other) => {
                        return Err(ClusterError::Consistency(format!(
                            "expected work at {wkey}, found {}",
                            other.kind()
                        )));
                    }
                }
            }
            if fixes.is_empty() {
                return Ok((edition_to_work, work_to_edition, work_by_key));
            }
            with_retry("save redirect fixes", || {
                self.store.save_many(fixes.clone(), "merge works")
            })?;
        }
        Err(ClusterError::Consistency(
            "redirect repair did not converge".to_string(),
        ))
    }

    /// Resolve works claimed by clusters with different canonical titles.
    /// Majority of the work's actual editions decides ownership; losing
    /// clusters drop their claim.
    fn resolve_contests(
        &self,
        clusters: &mut [Cluster],
        claimed_titles: &BTreeMap<String, BTreeSet<String>>,
        work_to_edition: &BTreeMap<String, BTreeSet<String>>,
        work_by_key: &BTreeMap<String, Work>,
    ) -> Result<(), ClusterError> {
        let mut contested: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for cluster in clusters.iter() {
            for wkey in cluster.existing.keys() {
                let titles = &claimed_titles[wkey];
                if titles.iter().any(|t| *t != cluster.title) {
                    contested
                        .entry(wkey.clone())
                        .or_default()
                        .insert(cluster.title.clone());
                }
            }
        }

        for (wkey, claiming) in contested {
            if !work_by_key.contains_key(&wkey) {
                return Err(ClusterError::Consistency(format!(
                    "contested work {wkey} not loaded"
                )));
            }
            let live_titles = match work_to_edition.get(&wkey) {
                Some(ekeys) => self.live_title_counts(ekeys)?,
                None => BTreeMap::new(),
            };
            // Highest live-edition count wins; equal counts fall to title
            // order so reruns pick the same winner.
            let winner = claiming
                .iter()
                .max_by(|a, b| {
                    let ca = live_titles.get(*a).copied().unwrap_or(0);
                    let cb = live_titles.get(*b).copied().unwrap_or(0);
                    ca.cmp(&cb).then_with(|| b.cmp(a))
                })
                .cloned()
                .ok_or_else(|| ClusterError::Consistency("empty contest".to_string()))?;
            debug!(work = %wkey, %winner, "contested work resolved");
            for cluster in clusters.iter_mut() {
                if !claiming.contains(&cluster.title) {
                    continue;
                }
                if cluster.title == winner {
                    cluster.best_match = Some(wkey.clone());
                } else {
                    // The loser only drops this claim; claims on other
                    // works still route it to those works.
                    cluster.existing.remove(&wkey);
                }
            }
        }
        Ok(())
    }

    /// Cleaned title counts of the given editions, using the same cleanup
    /// that produces cluster titles.
    fn live_title_counts(
        &self,
        ekeys: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, u32>, ClusterError> {
        let mut counts = BTreeMap::new();
        for ekey in ekeys {
            let edition = self.get_edition(ekey)?;
            if let Some(book) = prepare_book(ekey, &edition) {
                *counts.entry(book.title).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Of the works the cluster claims, the one whose live editions carry
    /// the most titles matching the cluster's canonical title.
    fn best_claimed_work(
        &self,
        cluster: &Cluster,
        work_to_edition: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<Option<String>, ClusterError> {
        let mut best: Option<(u32, String)> = None;
        for wkey in cluster.existing.keys() {
            let matching = match work_to_edition.get(wkey) {
                Some(ekeys) => self
                    .live_title_counts(ekeys)?
                    .get(&cluster.title)
                    .copied()
                    .unwrap_or(0),
                None => 0,
            };
            let better = match &best {
                Some((count, key)) => {
                    matching > *count || (matching == *count && wkey < key)
                }
                None => true,
            };
            if better {
                best = Some((matching, wkey.clone()));
            }
        }
        Ok(best.map(|(_, key)| key))
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_into_existing(
        &self,
        author_key: &str,
        cluster: &Cluster,
        best: &str,
        work_to_edition: &BTreeMap<String, BTreeSet<String>>,
        work_by_key: &BTreeMap<String, Work>,
        owner: &BTreeMap<String, usize>,
        cluster_index: usize,
        stats: &mut ClusterStats,
    ) -> Result<(), ClusterError> {
        let mut work = work_by_key
            .get(best)
            .cloned()
            .ok_or_else(|| ClusterError::Consistency(format!("claimed work {best} not loaded")))?;
        let mut batch: Vec<Doc> = Vec::new();
        let mut touched: Vec<String> = vec![best.to_string()];

        // Losing works redirect to the winner; their subjects move across.
        let mut edition_keys: BTreeSet<String> = cluster.editions.iter().cloned().collect();
        for wkey in cluster.existing.keys() {
            if let Some(ekeys) = work_to_edition.get(wkey) {
                edition_keys.extend(ekeys.iter().cloned());
            }
            if wkey == best {
                continue;
            }
            let losing = work_by_key.get(wkey).cloned().ok_or_else(|| {
                ClusterError::Consistency(format!("claimed work {wkey} not loaded"))
            })?;
            for subject in losing.subjects {
                if !work.subjects.contains(&subject) {
                    work.subjects.push(subject);
                }
            }
            batch.push(Doc::Redirect(Redirect {
                key: wkey.clone(),
                location: best.to_string(),
            }));
            touched.push(wkey.clone());
            stats.redirects_written += 1;
        }

        for ekey in edition_keys {
            // An edition claimed by a rival cluster is that cluster's to
            // re-point.
            if owner.get(&ekey).is_some_and(|i| *i != cluster_index) {
                continue;
            }
            let mut edition = self.get_edition(&ekey)?;
            edition.work = Some(best.to_string());
            edition.authors = self.resolve_authors(&edition.authors)?;
            touched.push(ekey);
            batch.push(Doc::Edition(edition));
            stats.editions_updated += 1;
        }

        work.title = cluster.title.clone();
        if work.subtitle.is_none() {
            work.subtitle = cluster.subtitle.clone();
        }
        for subject in &cluster.subjects {
            if !work.subjects.contains(subject) {
                work.subjects.push(subject.clone());
            }
        }
        if !work.authors.iter().any(|a| a == author_key) {
            work.authors.push(author_key.to_string());
        }
        work.authors = self.resolve_authors(&work.authors)?;
        batch.push(Doc::Work(work));

        with_retry("save merged works", || {
            self.store.save_many(batch.clone(), "merge works")
        })?;
        self.search.notify(&touched);
        stats.works_merged += 1;
        Ok(())
    }

    fn create_new_work(
        &self,
        author_key: &str,
        cluster: &Cluster,
        stats: &mut ClusterStats,
    ) -> Result<(), ClusterError> {
        let work = Work {
            key: None,
            title: cluster.title.clone(),
            subtitle: cluster.subtitle.clone(),
            authors: vec![author_key.to_string()],
            subjects: cluster.subjects.clone(),
        };
        let wkey = with_retry("create work", || {
            self.store.create(Doc::Work(work.clone()), "work found")
        })?;

        let mut batch: Vec<Doc> = Vec::new();
        let mut touched = vec![wkey.clone()];
        for ekey in &cluster.editions {
            let mut edition = self.get_edition(ekey)?;
            edition.work = Some(wkey.clone());
            touched.push(ekey.clone());
            batch.push(Doc::Edition(edition));
            stats.editions_updated += 1;
        }
        with_retry("attach editions to new work", || {
            self.store
                .save_many(batch.clone(), "add editions to new work")
        })?;
        self.search.notify(&touched);
        stats.works_created += 1;
        Ok(())
    }

    fn get_edition(&self, key: &str) -> Result<Edition, ClusterError> {
        match with_retry("get edition", || self.store.get(key))? {
            Lookup::Doc(Doc::Edition(edition)) => Ok(edition),
            Lookup::Redirect(_) => Err(ClusterError::Consistency(format!(
                "expected edition at {key}, found redirect"
            ))),
            Lookup::Missing => Err(ClusterError::Consistency(format!(
                "expected edition at {key}, found nothing"
            ))),
            Lookup::Doc(other) => Err(ClusterError::Consistency(format!(
                "expected edition at {key}, found {}",
                other.kind()
            ))),
        }
    }

    /// Replace redirected author keys with their terminal author.
    fn resolve_authors(&self, keys: &[String]) -> Result<Vec<String>, ClusterError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let mut current = key.clone();
            let mut depth = 0;
            loop {
                match with_retry("get author", || self.store.get(&current))? {
                    Lookup::Redirect(location) => {
                        current = location;
                        depth += 1;
                        if depth > REDIRECT_LIMIT {
                            return Err(ClusterError::Consistency(format!(
                                "author redirect chain from {key} did not terminate"
                            )));
                        }
                    }
                    Lookup::Doc(Doc::Author(_)) => break,
                    Lookup::Missing => {
                        return Err(ClusterError::Consistency(format!(
                            "author reference {current} is missing"
                        )));
                    }
                    Lookup::Doc(other) => {
                        return Err(ClusterError::Consistency(format!(
                            "expected author at {current}, found {}",
                            other.kind()
                        )));
                    }
                }
            }
            out.push(current);
        }
        Ok(out)
    }
}

/// Clean an edition into a clustering book. Returns None for an empty
/// title.
fn prepare_book(key: &str, edition: &Edition) -> Option<Book> {
    let mut title = edition.full_title().trim().to_string();
    if title.ends_with('.') && !RE_ABBREV.is_match(&title) {
        title.pop();
    }
    if let Some(caps) = RE_PARENS.captures(&title) {
        title = caps[1].to_string();
    }
    // Editions sometimes carry "Title: Subtitle" in one field; the tail
    // counts as a subtitle for aggregation.
    let (main, split_subtitle) = match title.split_once(": ") {
        Some((main, tail)) if !main.is_empty() && !tail.is_empty() => {
            (main.to_string(), Some(tail.to_string()))
        }
        _ => (title.clone(), None),
    };
    let norm_title = normalize_title(&main);
    if norm_title.is_empty() {
        return None;
    }

    let work_title = edition
        .work_title
        .as_deref()
        .map(|wt| wt.trim_matches(['.', ' ']).to_string())
        .filter(|wt| !wt.is_empty() && !BAD_WORK_TITLES.contains(&wt.as_str()));
    let norm_wt = work_title.as_deref().map(normalize_title);

    Some(Book {
        key: key.to_string(),
        title: main,
        norm_title,
        work_title,
        norm_wt,
        subtitle: edition.subtitle.clone().or(split_subtitle),
        english: edition.languages.iter().any(|l| l == "eng"),
        subjects: edition.subjects.clone(),
    })
}

/// Group books into provisional clusters, smallest first.
fn build_clusters(books: &[Book]) -> Vec<Cluster> {
    // Equivalence and popularity tables drive the title remapping.
    let mut equiv: HashMap<(String, String), u32> = HashMap::new();
    let mut norm_titles: HashMap<String, u32> = HashMap::new();
    let mut rev_wt: HashMap<String, BTreeMap<String, u32>> = HashMap::new();
    let mut by_key: HashMap<&str, &Book> = HashMap::new();
    for book in books {
        if let (Some(wt), Some(nwt)) = (&book.work_title, &book.norm_wt) {
            *equiv
                .entry((book.norm_title.clone(), nwt.clone()))
                .or_insert(0) += 1;
            *rev_wt
                .entry(nwt.clone())
                .or_default()
                .entry(wt.clone())
                .or_insert(0) += 1;
        }
        *norm_titles.entry(book.norm_title.clone()).or_insert(0) += 1;
        by_key.insert(&book.key, book);
    }
    let title_map = build_title_map(&equiv, &norm_titles);

    let mut groups: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    let mut side: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for book in books {
        if !book.english {
            if let Some(nwt) = &book.norm_wt {
                side.entry(nwt.clone()).or_default().push(book.key.clone());
            }
        }
        let mut norm = book.norm_title.clone();
        let mut title = book.title.clone();
        if let Some(mapped) = title_map.get(&norm) {
            norm = mapped.clone();
            if let Some(counts) = rev_wt.get(&norm) {
                title = top_literal(counts);
            }
        }
        groups
            .entry(norm)
            .or_default()
            .entry(title)
            .or_default()
            .push(book.key.clone());
    }

    let mut clusters = Vec::new();
    for (norm, by_title) in groups {
        let mut members: BTreeSet<String> = by_title.values().flatten().cloned().collect();
        if let Some(extra) = side.get(&norm) {
            members.extend(extra.iter().cloned());
        }
        let member_books: Vec<&Book> = members
            .iter()
            .filter_map(|k| by_key.get(k.as_str()).copied())
            .collect();

        let mut title_votes: BTreeMap<&str, u32> = BTreeMap::new();
        for book in &member_books {
            *title_votes.entry(book.title.as_str()).or_insert(0) += 1;
        }
        let title = title_votes
            .iter()
            .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then_with(|| tb.cmp(ta)))
            .map(|(t, _)| t.to_string())
            .unwrap_or_else(|| norm.clone());

        let mut subjects: Vec<String> = Vec::new();
        for book in &member_books {
            for subject in &book.subjects {
                if !subjects.contains(subject) {
                    subjects.push(subject.clone());
                }
            }
        }

        clusters.push(Cluster {
            subtitle: choose_subtitle(&member_books, &norm),
            norm,
            title,
            editions: members.into_iter().collect(),
            subjects,
            existing: BTreeMap::new(),
            best_match: None,
        });
    }
    clusters.sort_by(|a, b| {
        a.editions
            .len()
            .cmp(&b.editions.len())
            .then_with(|| a.norm.cmp(&b.norm))
    });
    clusters
}

/// Remap normalized edition titles that co-occur (more than once) with
/// work titles onto the most popular of those work titles.
fn build_title_map(
    equiv: &HashMap<(String, String), u32>,
    norm_titles: &HashMap<String, u32>,
) -> HashMap<String, String> {
    let mut title_to_wt: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for ((norm_title, norm_wt), count) in equiv {
        if *count > 1 {
            title_to_wt
                .entry(norm_title)
                .or_default()
                .insert(norm_wt);
        }
    }

    let mut map = HashMap::new();
    for (norm_title, work_titles) in title_to_wt {
        if work_titles.len() == 1 {
            let only = work_titles.into_iter().next().unwrap_or_default();
            map.insert(norm_title.to_string(), only.to_string());
            continue;
        }
        // Most popular work title wins; a work title equal to the edition
        // title beats an equally popular rival.
        let best = work_titles
            .iter()
            .max_by(|a, b| {
                let ca = norm_titles.get(**a).copied().unwrap_or(0);
                let cb = norm_titles.get(**b).copied().unwrap_or(0);
                ca.cmp(&cb)
                    .then_with(|| (**a == norm_title).cmp(&(**b == norm_title)))
                    .then_with(|| b.cmp(a))
            })
            .copied()
            .unwrap_or(norm_title);
        if norm_title != best {
            map.insert(norm_title.to_string(), best.to_string());
        }
        for work_title in work_titles {
            if work_title != best {
                map.insert(work_title.to_string(), best.to_string());
            }
        }
    }
    map
}

/// Most frequent literal form; longer strings win ties, then title order.
fn top_literal(counts: &BTreeMap<String, u32>) -> String {
    counts
        .iter()
        .max_by(|(ta, ca), (tb, cb)| {
            ca.cmp(cb)
                .then_with(|| ta.len().cmp(&tb.len()))
                .then_with(|| tb.cmp(ta))
        })
        .map(|(t, _)| t.clone())
        .unwrap_or_default()
}

/// A cluster adopts a subtitle only when enough editions agree: over 20%
/// of all editions carry it and over half of the subtitled editions carry
/// the same one.
fn choose_subtitle(members: &[&Book], norm: &str) -> Option<String> {
    let edition_count = members.len() as f64;
    let with_subtitle = members
        .iter()
        .filter(|b| b.subtitle.as_deref().is_some_and(|s| !s.is_empty()))
        .count() as f64;
    if with_subtitle == 0.0 {
        return None;
    }

    let mut variants: BTreeMap<String, BTreeMap<String, u32>> = BTreeMap::new();
    for book in members {
        let Some(subtitle) = book.subtitle.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };
        let norm_subtitle = normalize_title(subtitle);
        if norm_subtitle == norm {
            continue;
        }
        *variants
            .entry(norm_subtitle)
            .or_default()
            .entry(subtitle.to_string())
            .or_insert(0) += 1;
    }

    let mut chosen = None;
    for (norm_subtitle, literals) in &variants {
        let trimmed = norm_subtitle.trim_matches([' ', '.']).to_lowercase();
        if trimmed.is_empty() || trimmed == "roman" || trimmed.contains("edition") {
            continue;
        }
        let num: u32 = literals.values().sum();
        let overall = f64::from(num) / edition_count;
        let ratio = f64::from(num) / with_subtitle;
        if overall > 0.2 && ratio > 0.5 {
            chosen = Some(top_literal(literals));
        }
    }
    chosen
}

/// First pass plus claim counting: record which existing works each
/// cluster's editions point at. A work whose title already equals some
/// cluster's title is only claimable by that cluster.
fn claim_existing_works(
    clusters: &mut [Cluster],
    edition_to_work: &BTreeMap<String, String>,
    work_by_key: &BTreeMap<String, Work>,
) {
    let mut title_match: BTreeMap<String, String> = BTreeMap::new();
    for cluster in clusters.iter() {
        for ekey in &cluster.editions {
            let Some(wkey) = edition_to_work.get(ekey) else {
                continue;
            };
            if let Some(work) = work_by_key.get(wkey) {
                if work.title == cluster.title {
                    title_match.insert(wkey.clone(), cluster.title.clone());
                }
            }
        }
    }

    for cluster in clusters.iter_mut() {
        for ekey in &cluster.editions {
            let Some(wkey) = edition_to_work.get(ekey) else {
                continue;
            };
            if let Some(matched) = title_match.get(wkey) {
                if *matched != cluster.title {
                    continue;
                }
            }
            *cluster.existing.entry(wkey.clone()).or_insert(0) += 1;
        }
    }
}

/// Which cluster titles claim each existing work.
fn titles_by_claimed_work(clusters: &[Cluster]) -> BTreeMap<String, BTreeSet<String>> {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for cluster in clusters {
        for wkey in cluster.existing.keys() {
            map.entry(wkey.clone()).or_default().insert(cluster.title.clone());
        }
    }
    map
}

/// The cluster's single existing work, provided no other cluster claims
/// it.
fn single_uncontested_claim(
    cluster: &Cluster,
    claimed_titles: &BTreeMap<String, BTreeSet<String>>,
) -> Option<(String, u32)> {
    if cluster.existing.len() != 1 {
        return None;
    }
    let (wkey, count) = cluster.existing.iter().next()?;
    let titles = claimed_titles.get(wkey)?;
    if titles.iter().any(|t| *t != cluster.title) {
        return None;
    }
    Some((wkey.clone(), *count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocStore, MemoryStore, NullSearchIndex};

    fn author(store: &MemoryStore, name: &str) -> String {
        store
            .create(
                Doc::Author(crate::domain::Author {
                    key: None,
                    name: name.to_string(),
                }),
                "test",
            )
            .unwrap()
    }

    fn edition(store: &MemoryStore, akey: &str, title: &str) -> String {
        edition_with(store, akey, title, |_| {})
    }

    fn edition_with(
        store: &MemoryStore,
        akey: &str,
        title: &str,
        tweak: impl FnOnce(&mut Edition),
    ) -> String {
        let mut e = Edition {
            title: title.to_string(),
            authors: vec![akey.to_string()],
            ..Edition::default()
        };
        tweak(&mut e);
        store.create(Doc::Edition(e), "test").unwrap()
    }

    fn get_edition(store: &MemoryStore, key: &str) -> Edition {
        match store.get(key).unwrap() {
            Lookup::Doc(Doc::Edition(e)) => e,
            other => panic!("expected edition at {key}, got {other:?}"),
        }
    }

    fn get_work(store: &MemoryStore, key: &str) -> Work {
        match store.get(key).unwrap() {
            Lookup::Doc(Doc::Work(w)) => w,
            other => panic!("expected work at {key}, got {other:?}"),
        }
    }

    #[test]
    fn test_title_variants_cluster_into_two_works() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        let e1 = edition(&store, &akey, "Hamlet");
        let e2 = edition(&store, &akey, "Hamlet: A Tragedy");
        let e3 = edition(&store, &akey, "Macbeth");

        let stats = WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap();
        assert_eq!(stats.clusters, 2);
        assert_eq!(stats.works_created, 2);

        let w1 = get_edition(&store, &e1).work.unwrap();
        let w2 = get_edition(&store, &e2).work.unwrap();
        let w3 = get_edition(&store, &e3).work.unwrap();
        assert_eq!(w1, w2);
        assert_ne!(w1, w3);
        assert_eq!(get_work(&store, &w1).title, "Hamlet");
        assert_eq!(get_work(&store, &w3).title, "Macbeth");
    }

    #[test]
    fn test_embedded_work_titles_pull_variants_together() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        let mut keys = vec![
            edition(&store, &akey, "Hamlet"),
            edition(&store, &akey, "Hamlet"),
        ];
        for _ in 0..2 {
            keys.push(edition_with(
                &store,
                &akey,
                "The Tragedy of Hamlet",
                |e| e.work_title = Some("Hamlet".to_string()),
            ));
        }

        let stats = WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap();
        assert_eq!(stats.works_created, 1);
        let works: BTreeSet<String> = keys
            .iter()
            .map(|k| get_edition(&store, k).work.unwrap())
            .collect();
        assert_eq!(works.len(), 1);
    }

    #[test]
    fn test_generic_work_title_is_ignored() {
        let edition = Edition {
            title: "Hamlet".to_string(),
            work_title: Some("Works".to_string()),
            ..Edition::default()
        };
        let book = prepare_book("/books/OL1M", &edition).unwrap();
        assert!(book.work_title.is_none());
        assert_eq!(book.norm_title, "hamlet");
    }

    #[test]
    fn test_franchise_suffix_and_trailing_dot_stripped() {
        let edition = Edition {
            title: "The Dollar Hen (Illustrated Edition) (Dodo Press)".to_string(),
            ..Edition::default()
        };
        let book = prepare_book("/books/OL1M", &edition).unwrap();
        assert_eq!(book.title, "The Dollar Hen");

        let edition = Edition {
            title: "History of the peninsular war.".to_string(),
            ..Edition::default()
        };
        let book = prepare_book("/books/OL2M", &edition).unwrap();
        assert_eq!(book.title, "History of the peninsular war");

        // Abbreviation dot survives.
        let edition = Edition {
            title: "Letters to Mr. Wilson Jr.".to_string(),
            ..Edition::default()
        };
        let book = prepare_book("/books/OL3M", &edition).unwrap();
        assert_eq!(book.title, "Letters to Mr. Wilson Jr.");
    }

    #[test]
    fn test_redirect_repair_repoints_editions() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        let work_key = store
            .create(
                Doc::Work(Work {
                    title: "Hamlet".to_string(),
                    authors: vec![akey.clone()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();
        store
            .save(
                Doc::Redirect(Redirect {
                    key: "/works/OL900W".to_string(),
                    location: work_key.clone(),
                }),
                "merge works",
            )
            .unwrap();
        let ekey = edition_with(&store, &akey, "Hamlet", |e| {
            e.work = Some("/works/OL900W".to_string())
        });

        WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap();
        assert_eq!(get_edition(&store, &ekey).work.unwrap(), work_key);
    }

    #[test]
    fn test_contested_work_goes_to_majority_cluster() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        let wkey = store
            .create(
                Doc::Work(Work {
                    title: "Old Title".to_string(),
                    authors: vec![akey.clone()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();

        let mut hamlets = Vec::new();
        for _ in 0..3 {
            hamlets.push(edition_with(&store, &akey, "Hamlet", |e| {
                e.work = Some(wkey.clone())
            }));
        }
        let prince = edition_with(&store, &akey, "Prince of Denmark", |e| {
            e.work = Some(wkey.clone())
        });

        let stats = WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap();

        // Majority cluster keeps the work and renames it; the loser gets a
        // fresh work instead of overwriting.
        assert_eq!(get_work(&store, &wkey).title, "Hamlet");
        for key in &hamlets {
            assert_eq!(get_edition(&store, key).work.unwrap(), wkey);
        }
        let loser_work = get_edition(&store, &prince).work.unwrap();
        assert_ne!(loser_work, wkey);
        assert_eq!(get_work(&store, &loser_work).title, "Prince of Denmark");
        assert_eq!(stats.works_created, 1);
        assert_eq!(stats.works_merged, 1);
    }

    #[test]
    fn test_contested_majority_counts_cleaned_titles() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        let wkey = store
            .create(
                Doc::Work(Work {
                    title: "Old Title".to_string(),
                    authors: vec![akey.clone()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();

        // Trailing dots are stripped before titles vote, so these three
        // still outnumber the single rival.
        let mut hamlets = Vec::new();
        for _ in 0..3 {
            hamlets.push(edition_with(&store, &akey, "Hamlet.", |e| {
                e.work = Some(wkey.clone())
            }));
        }
        let prince = edition_with(&store, &akey, "Prince of Denmark", |e| {
            e.work = Some(wkey.clone())
        });

        WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap();

        assert_eq!(get_work(&store, &wkey).title, "Hamlet");
        for key in &hamlets {
            assert_eq!(get_edition(&store, key).work.unwrap(), wkey);
        }
        assert_ne!(get_edition(&store, &prince).work.unwrap(), wkey);
    }

    #[test]
    fn test_contest_loser_falls_back_to_other_claimed_work() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        let contested = store
            .create(
                Doc::Work(Work {
                    title: "Old Title".to_string(),
                    authors: vec![akey.clone()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();
        let fallback = store
            .create(
                Doc::Work(Work {
                    title: "Prince of Denmark".to_string(),
                    authors: vec![akey.clone()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();

        for _ in 0..3 {
            edition_with(&store, &akey, "Hamlet", |e| e.work = Some(contested.clone()));
        }
        let mut princes = vec![edition_with(&store, &akey, "Prince of Denmark", |e| {
            e.work = Some(contested.clone())
        })];
        for _ in 0..2 {
            princes.push(edition_with(&store, &akey, "Prince of Denmark", |e| {
                e.work = Some(fallback.clone())
            }));
        }

        let stats = WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap();

        // The loser of the contest still claims its second work, so no
        // fresh work appears and the second work keeps its editions.
        assert_eq!(stats.works_created, 0);
        assert_eq!(get_work(&store, &contested).title, "Hamlet");
        for key in &princes {
            assert_eq!(get_edition(&store, key).work.unwrap(), fallback);
        }
    }

    #[test]
    fn test_multi_claim_prefers_work_with_matching_live_titles() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        let variant_work = store
            .create(
                Doc::Work(Work {
                    title: "The Tragedie of Hamlet".to_string(),
                    authors: vec![akey.clone()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();
        let canonical_work = store
            .create(
                Doc::Work(Work {
                    title: "Hamlet".to_string(),
                    authors: vec![akey.clone()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();

        // Two variant-titled editions join the cluster through their
        // embedded work title, so the variant work collects more claims
        // but none of its editions carry the canonical title.
        let mut keys = Vec::new();
        for _ in 0..2 {
            keys.push(edition_with(&store, &akey, "The Tragedie of Hamlet", |e| {
                e.work_title = Some("Hamlet".to_string());
                e.work = Some(variant_work.clone());
            }));
        }
        keys.push(edition_with(&store, &akey, "Hamlet", |e| {
            e.work = Some(canonical_work.clone())
        }));

        let stats = WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap();

        assert_eq!(stats.works_merged, 1);
        assert_eq!(stats.works_created, 0);
        for key in &keys {
            assert_eq!(get_edition(&store, key).work.unwrap(), canonical_work);
        }
        assert_eq!(
            store.get(&variant_work).unwrap(),
            Lookup::Redirect(canonical_work.clone())
        );
        assert_eq!(get_work(&store, &canonical_work).title, "Hamlet");
    }

    #[test]
    fn test_unique_claim_merges_and_redirects_losers() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        let w1 = store
            .create(
                Doc::Work(Work {
                    title: "Hamlet".to_string(),
                    authors: vec![akey.clone()],
                    subjects: vec!["Drama".to_string()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();
        let w2 = store
            .create(
                Doc::Work(Work {
                    title: "Hamlet".to_string(),
                    authors: vec![akey.clone()],
                    subjects: vec!["Tragedy".to_string()],
                    ..Work::default()
                }),
                "test",
            )
            .unwrap();
        let e1 = edition_with(&store, &akey, "Hamlet", |e| e.work = Some(w1.clone()));
        let e2 = edition_with(&store, &akey, "Hamlet", |e| e.work = Some(w1.clone()));
        let e3 = edition_with(&store, &akey, "Hamlet", |e| e.work = Some(w2.clone()));

        let stats = WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap();
        assert_eq!(stats.works_merged, 1);
        assert_eq!(stats.redirects_written, 1);

        // w1 holds more editions, so w2 redirects to it.
        assert_eq!(store.get(&w2).unwrap(), Lookup::Redirect(w1.clone()));
        for key in [&e1, &e2, &e3] {
            assert_eq!(get_edition(&store, key).work.unwrap(), w1);
        }
        let merged = get_work(&store, &w1);
        assert!(merged.subjects.contains(&"Drama".to_string()));
        assert!(merged.subjects.contains(&"Tragedy".to_string()));
    }

    #[test]
    fn test_subtitle_needs_enough_votes() {
        let make = |titles: &[(&str, Option<&str>)]| -> Vec<Book> {
            titles
                .iter()
                .enumerate()
                .map(|(i, (title, subtitle))| {
                    let edition = Edition {
                        title: title.to_string(),
                        subtitle: subtitle.map(str::to_string),
                        ..Edition::default()
                    };
                    prepare_book(&format!("/books/OL{i}M"), &edition).unwrap()
                })
                .collect()
        };

        // 2 of 5 share a subtitle: overall 0.4, ratio 1.0 -> adopted.
        let books = make(&[
            ("Hamlet", Some("A Tragedy")),
            ("Hamlet", Some("A Tragedy")),
            ("Hamlet", None),
            ("Hamlet", None),
            ("Hamlet", None),
        ]);
        let refs: Vec<&Book> = books.iter().collect();
        assert_eq!(choose_subtitle(&refs, "hamlet"), Some("A Tragedy".to_string()));

        // 1 of 6, and subtitled editions disagree: rejected.
        let books = make(&[
            ("Hamlet", Some("A Tragedy")),
            ("Hamlet", Some("In Five Acts")),
            ("Hamlet", None),
            ("Hamlet", None),
            ("Hamlet", None),
            ("Hamlet", None),
        ]);
        let refs: Vec<&Book> = books.iter().collect();
        assert_eq!(choose_subtitle(&refs, "hamlet"), None);

        // "edition" subtitles never count.
        let books = make(&[
            ("Hamlet", Some("Second Edition")),
            ("Hamlet", Some("Second Edition")),
            ("Hamlet", None),
        ]);
        let refs: Vec<&Book> = books.iter().collect();
        assert_eq!(choose_subtitle(&refs, "hamlet"), None);
    }

    #[test]
    fn test_dangling_work_reference_is_consistency_error() {
        let store = MemoryStore::new();
        let search = NullSearchIndex;
        let akey = author(&store, "William Shakespeare");
        edition_with(&store, &akey, "Hamlet", |e| {
            e.work = Some("/works/OL404W".to_string())
        });

        let err = WorkClusterer::new(&store, &search)
            .cluster_author(&akey)
            .unwrap_err();
        assert!(matches!(err, ClusterError::Consistency(_)));
    }
}
