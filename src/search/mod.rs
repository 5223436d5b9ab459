//! Search over the media index.
//!
//! Scoring, per field (file name, caption), against the lower-cased query:
//!
//! | match                               | points |
//! |-------------------------------------|--------|
//! | field equals the query              | 1000   |
//! | field starts with the query         | 500    |
//! | query appears as a whole word       | 300    |
//! | query appears anywhere              | 100    |
//! | the match is in the file name       | +50    |
//!
//! Multi-word queries add 50 for every further distinct word found in file
//! name + caption, and 200 when all of them are found. Zero scores are
//! dropped; ties keep index order.

use std::sync::Arc;

use thiserror::Error;

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::MediaEntry;
use crate::utils::html_unescape;

pub const PAGE_SIZE: usize = 10;
pub const MIN_QUERY_LEN: usize = 2;
pub const MAX_QUERY_LEN: usize = 64;

const EXACT: u32 = 1000;
const PREFIX: u32 = 500;
const WORD: u32 = 300;
const CONTAINS: u32 = 100;
const FILENAME: u32 = 50;
const EXTRA_WORD: u32 = 50;
const ALL_WORDS: u32 = 200;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("query must be at least 2 characters")]
    TooShort,

    #[error("query must be at most 64 characters")]
    TooLong,
}

/// Trim and lower-case a query, enforcing its length bounds.
pub fn normalize_query(raw: &str) -> Result<String, QueryError> {
    let query = raw.trim().to_lowercase();
    let len = query.chars().count();
    if len < MIN_QUERY_LEN {
        Err(QueryError::TooShort)
    } else if len > MAX_QUERY_LEN {
        Err(QueryError::TooLong)
    } else {
        Ok(query)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub message_id: i32,
    pub display_name: String,
    pub size_bytes: u64,
    pub caption: Option<String>,
    pub relevance_score: u32,
}

/// Score of `query` against one lower-cased field.
fn field_score(query: &str, field: &str) -> u32 {
    if field.is_empty() {
        return 0;
    }
    if field == query {
        return EXACT;
    }

    let mut score = 0;
    if field.starts_with(query) {
        score += PREFIX;
    }
    if has_whole_word(field, query) {
        score += WORD;
    }
    if field.contains(query) {
        score += CONTAINS;
    }
    score
}

/// Whether `needle` occurs in `haystack` with no alphanumeric character on
/// either side.
fn has_whole_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Relevance of one index entry. `query` must already be normalized;
/// `caption` is the stored, HTML-escaped caption.
pub fn score(query: &str, file_name: Option<&str>, caption: Option<&str>) -> u32 {
    let file_name = file_name.unwrap_or_default().to_lowercase();
    let caption = html_unescape(caption.unwrap_or_default()).to_lowercase();

    let in_name = field_score(query, &file_name);
    let mut total = if in_name > 0 {
        in_name + FILENAME
    } else {
        field_score(query, &caption)
    };

    let mut words: Vec<&str> = Vec::new();
    for word in query.split_whitespace() {
        if !words.contains(&word) {
            words.push(word);
        }
    }

    if words.len() > 1 {
        let combined = format!("{} {}", file_name, caption);
        let matched = words.iter().filter(|w| combined.contains(*w)).count();

        total += matched.saturating_sub(1) as u32 * EXTRA_WORD;
        if matched == words.len() {
            total += ALL_WORDS;
        }
    }

    total
}

/// Score and rank entries, best first. Entries scoring zero are dropped.
pub fn rank(query: &str, entries: &[MediaEntry]) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = entries
        .iter()
        .filter_map(|entry| {
            let relevance_score = score(query, entry.file_name.as_deref(), entry.caption.as_deref());
            (relevance_score > 0).then(|| SearchResult {
                message_id: entry.message_id,
                display_name: entry.display_name(),
                size_bytes: entry.size_bytes,
                caption: entry.caption.clone(),
                relevance_score,
            })
        })
        .collect();

    // sort_by is stable, so ties keep index order.
    results.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
    results
}

/// One page of results.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub items: &'a [SearchResult],
    pub index: usize,
    pub total_pages: usize,
}

impl Page<'_> {
    pub fn has_prev(&self) -> bool {
        self.index > 0
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.total_pages
    }
}

/// Slice page `index`, clamped to the last page.
pub fn page(results: &[SearchResult], index: usize) -> Page<'_> {
    let total_pages = results.len().div_ceil(PAGE_SIZE).max(1);
    let index = index.min(total_pages - 1);
    let start = (index * PAGE_SIZE).min(results.len());
    let end = (start + PAGE_SIZE).min(results.len());

    Page {
        items: &results[start..end],
        index,
        total_pages,
    }
}

/// A user's last search.
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// Last search per user. Bounded and expiring, a new search overwrites.
#[derive(Clone)]
pub struct SearchCache {
    cache: TypedCache<u64, Arc<SearchSession>>,
}

impl SearchCache {
    pub fn new(registry: &CacheRegistry) -> Self {
        Self {
            cache: registry.get_or_create("search_results", CacheConfig::search_results()),
        }
    }

    pub fn store(&self, user_id: u64, query: String, results: Vec<SearchResult>) -> Arc<SearchSession> {
        let session = Arc::new(SearchSession { query, results });
        self.cache.insert(user_id, Arc::clone(&session));
        session
    }

    pub fn get(&self, user_id: u64) -> Option<Arc<SearchSession>> {
        self.cache.get(&user_id)
    }
}
