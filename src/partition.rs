//! Category partitioning of classified documents.

use std::collections::BTreeMap;

use crate::models::{ClassifiedDocument, DatedEntry};

/// Group documents into per-category buckets of `{filename, date}`.
///
/// Every input document lands in exactly one bucket, in input order.
/// Category labels are used verbatim, so an unexpected label becomes its own
/// bucket instead of being dropped. A missing date becomes an empty string.
pub fn partition_by_category(docs: &[ClassifiedDocument]) -> BTreeMap<String, Vec<DatedEntry>> {
    let mut buckets: BTreeMap<String, Vec<DatedEntry>> = BTreeMap::new();
    for doc in docs {
        buckets
            .entry(doc.category.clone())
            .or_default()
            .push(DatedEntry {
                filename: doc.filename.clone(),
                date: doc.raw_date.clone().unwrap_or_default(),
            });
    }
    buckets
}
