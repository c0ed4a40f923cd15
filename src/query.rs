//! Directory-listing queries over a metadata index.
//!
//! The engine is a pure filter → sort → slice pipeline so that any
//! [`MetadataStore`](crate::backend::MetadataStore) can run it over its own
//! entry iterator.

use crate::metadata::{FileMetadata, FileType};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Key,
    Size,
    ModifyTime,
    CreateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// A listing query against a metadata index.
#[derive(Debug, Clone, Default)]
pub struct MetadataQuery {
    /// Key prefix all entries must carry. Empty matches everything.
    pub prefix: String,
    /// With the `/` delimiter set, only direct children of `prefix` are
    /// returned; without it, the scan is recursive.
    pub delimiter: Option<char>,
    /// `type/subtype` pattern; either part may be `*`.
    pub content_type: Option<String>,
    pub filter_type: Option<FileType>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// Every listed attribute must be present with an equal value.
    pub attribute_match: HashMap<String, String>,
    /// Page size; `0` means unlimited.
    pub limit: usize,
    pub offset: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}
impl MetadataQuery {
    /// Direct children of `prefix`, sorted by key.
    pub fn children_of(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: Some('/'),
            ..Self::default()
        }
    }

    /// Everything below `prefix`, recursively.
    pub fn subtree_of(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MetadataQueryResult {
    pub entries: Vec<FileMetadata>,
    /// Cardinality before pagination.
    pub total_count: usize,
    /// True if the slice stopped short of `total_count`.
    pub paginating: bool,
}

/// Runs `query` over an entry iterator.
pub fn run_query(
    entries: impl IntoIterator<Item = FileMetadata>,
    query: &MetadataQuery,
) -> MetadataQueryResult {
    let mut matched: Vec<FileMetadata> = entries
        .into_iter()
        .filter(|entry| matches(entry, query))
        .collect();

    matched.sort_by(|a, b| {
        let ord = match query.sort_by {
            SortBy::Key => a.key.cmp(&b.key),
            SortBy::Size => a.size.cmp(&b.size),
            SortBy::ModifyTime => a.modify_time.cmp(&b.modify_time),
            SortBy::CreateTime => a.create_time.cmp(&b.create_time),
        };
        match query.sort_order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });

    let total_count = matched.len();
    let start = query.offset.min(total_count);
    let end = if query.limit == 0 {
        total_count
    } else {
        (start + query.limit).min(total_count)
    };
    let entries = matched.drain(start..end).collect();

    MetadataQueryResult {
        entries,
        total_count,
        paginating: end < total_count,
    }
}

fn matches(entry: &FileMetadata, query: &MetadataQuery) -> bool {
    if !within_listing(&entry.key, &query.prefix, query.delimiter) {
        return false;
    }
    if let Some(pattern) = &query.content_type {
        if !content_type_matches(pattern, &entry.content_type) {
            return false;
        }
    }
    if let Some(file_type) = query.filter_type {
        if entry.mode.file_type() != file_type {
            return false;
        }
    }
    if query.min_size.is_some_and(|min| entry.size < min) {
        return false;
    }
    if query.max_size.is_some_and(|max| entry.size > max) {
        return false;
    }
    query
        .attribute_match
        .iter()
        .all(|(k, v)| entry.attributes.get(k) == Some(v))
}

/// Whether `key` belongs to the listing window described by `prefix` and
/// `delimiter`.
fn within_listing(key: &str, prefix: &str, delimiter: Option<char>) -> bool {
    let Some(rest) = key.strip_prefix(prefix) else {
        return false;
    };
    // The prefix entry itself is never part of its own listing.
    if rest.is_empty() {
        return false;
    }
    match delimiter {
        Some(sep) => !rest.contains(sep),
        None => true,
    }
}

/// Wildcard match over `type/subtype`; `*` stands for either part, and a
/// bare `*` matches everything.
pub fn content_type_matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let (pat_type, pat_sub) = pattern.split_once('/').unwrap_or((pattern, "*"));
    let (val_type, val_sub) = value.split_once('/').unwrap_or((value, ""));
    (pat_type == "*" || pat_type == val_type) && (pat_sub == "*" || pat_sub == val_sub)
}
