//! Chronological version assignment within a category.
//!
//! Documents with a parseable `dd-mm-yyyy` date come first, ascending by
//! `(date, filename)`. Documents without one follow, ascending by filename.
//! Versions are `1..=N` over that order. The result depends only on the
//! input set, so re-running over the same documents yields the same chain.

use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::models::{DatedEntry, VersionChain, VersionedDocument, VersioningResults};

pub const DATE_FORMAT: &str = "%d-%m-%Y";

// chrono's `%Y` takes any number of digits, so the year width is checked first.
static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}-\d{1,2}-\d{4}$").expect("valid regex"));

/// A parsed document date. `Unparseable` orders after every real date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DateToken {
    Parsed(NaiveDate),
    Unparseable,
}

impl DateToken {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if !DATE_SHAPE.is_match(raw) {
            return DateToken::Unparseable;
        }
        match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            Ok(date) => DateToken::Parsed(date),
            Err(_) => DateToken::Unparseable,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            DateToken::Parsed(d) => Some(*d),
            DateToken::Unparseable => None,
        }
    }
}

/// Order one bucket and number it from 1.
pub fn assign_versions(category: &str, bucket: &[DatedEntry]) -> VersionChain {
    let (mut with_date, mut without_date): (Vec<_>, Vec<_>) = bucket
        .iter()
        .map(|entry| (DateToken::parse(&entry.date), entry))
        .partition(|(token, _)| token.date().is_some());

    with_date.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.filename.cmp(&b.filename)));
    without_date.sort_by(|(_, a), (_, b)| a.filename.cmp(&b.filename));

    let documents = with_date
        .into_iter()
        .chain(without_date)
        .enumerate()
        .map(|(idx, (_, entry))| VersionedDocument {
            filename: entry.filename.clone(),
            category: category.to_string(),
            date: entry.date.clone(),
            version: idx as u32 + 1,
        })
        .collect();

    VersionChain {
        category: category.to_string(),
        documents,
    }
}

/// Assign versions to every bucket.
pub fn assign_all(buckets: &BTreeMap<String, Vec<DatedEntry>>) -> VersioningResults {
    buckets
        .iter()
        .map(|(category, bucket)| (category.clone(), assign_versions(category, bucket)))
        .collect()
}
