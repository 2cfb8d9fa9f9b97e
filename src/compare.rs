//! Pairwise comparison of adjacent versions.
//!
//! A chain of N versions yields at most N − 1 comparisons: (1→2), (2→3), …
//! Non-adjacent pairs are never diffed. A pair is skipped, not failed, when
//! either side has no text or the differ errors.

use tracing::{info, warn};

use crate::models::{ComparisonResults, TextIndex, VersionChain, VersionComparison, VersioningResults};
use crate::traits::VersionDiffer;

/// Diff every adjacent pair of `chain`, oldest pair first.
pub async fn compare_chain(
    chain: &VersionChain,
    texts: &TextIndex,
    differ: &dyn VersionDiffer,
) -> Vec<VersionComparison> {
    let mut comparisons = Vec::new();

    for pair in chain.documents.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);

        let (Some(before), Some(after)) = (texts.get(&from.filename), texts.get(&to.filename))
        else {
            warn!(
                category = %chain.category,
                from = from.version,
                to = to.version,
                "missing text for version pair, skipping"
            );
            continue;
        };

        match differ.diff(before, after).await {
            Ok(result) => comparisons.push(VersionComparison {
                category: chain.category.clone(),
                from: from.clone(),
                to: to.clone(),
                changes: result.changes,
                summary: result.summary,
            }),
            Err(e) => warn!(
                category = %chain.category,
                from = from.version,
                to = to.version,
                error = %e,
                "diff failed, skipping pair"
            ),
        }
    }

    comparisons
}

/// Compare every chain, or only the categories in `only` when non-empty.
///
/// Categories with fewer than two versions produce no entry.
pub async fn compare_all(
    versioning: &VersioningResults,
    texts: &TextIndex,
    differ: &dyn VersionDiffer,
    only: &[String],
) -> ComparisonResults {
    let mut results = ComparisonResults::new();

    for (category, chain) in versioning {
        if !only.is_empty() && !only.iter().any(|c| c == category) {
            continue;
        }
        if chain.len() < 2 {
            continue;
        }
        let comparisons = compare_chain(chain, texts, differ).await;
        info!(
            category = %category,
            versions = chain.len(),
            compared = comparisons.len(),
            "compared version chain"
        );
        if !comparisons.is_empty() {
            results.insert(category.clone(), comparisons);
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::models::{ChangeRecord, DiffResult, VersionedDocument};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the pairs it sees and fails on texts listed in `fail_on`.
    #[derive(Default)]
    struct RecordingDiffer {
        seen: Mutex<Vec<(String, String)>>,
        fail_on: Vec<String>,
    }

    #[async_trait]
    impl VersionDiffer for RecordingDiffer {
        async fn diff(&self, before: &str, after: &str) -> Result<DiffResult, CollaboratorError> {
            self.seen
                .lock()
                .unwrap()
                .push((before.to_string(), after.to_string()));
            if self.fail_on.iter().any(|t| t == after) {
                return Err(CollaboratorError::Malformed("bad".into()));
            }
            Ok(DiffResult {
                changes: vec![ChangeRecord {
                    title: "Capital".into(),
                    before: before.into(),
                    after: after.into(),
                }],
                summary: format!("{} -> {}", before, after),
            })
        }
    }

    fn chain(names: &[&str]) -> VersionChain {
        VersionChain {
            category: "constitucion".into(),
            documents: names
                .iter()
                .enumerate()
                .map(|(i, n)| VersionedDocument {
                    filename: n.to_string(),
                    category: "constitucion".into(),
                    date: String::new(),
                    version: i as u32 + 1,
                })
                .collect(),
        }
    }

    fn texts(names: &[&str]) -> TextIndex {
        names.iter().map(|n| (n.to_string(), n.to_uppercase())).collect()
    }

    #[tokio::test]
    async fn only_adjacent_pairs_are_diffed() {
        let differ = RecordingDiffer::default();
        let result = compare_chain(
            &chain(&["v1", "v2", "v3"]),
            &texts(&["v1", "v2", "v3"]),
            &differ,
        )
        .await;

        let pairs: Vec<(u32, u32)> = result.iter().map(|c| (c.from.version, c.to.version)).collect();
        assert_eq!(pairs, vec![(1, 2), (2, 3)]);
        assert_eq!(result[0].summary, "V1 -> V2");
        assert_eq!(differ.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn short_chains_yield_nothing() {
        let differ = RecordingDiffer::default();
        assert!(compare_chain(&chain(&[]), &texts(&[]), &differ).await.is_empty());
        assert!(compare_chain(&chain(&["v1"]), &texts(&["v1"]), &differ)
            .await
            .is_empty());
        assert!(differ.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_text_skips_only_pairs_touching_it() {
        let differ = RecordingDiffer::default();
        let result = compare_chain(
            &chain(&["v1", "v2", "v3", "v4"]),
            &texts(&["v1", "v3", "v4"]),
            &differ,
        )
        .await;

        let pairs: Vec<(u32, u32)> = result.iter().map(|c| (c.from.version, c.to.version)).collect();
        assert_eq!(pairs, vec![(3, 4)]);
    }

    #[tokio::test]
    async fn diff_failure_skips_that_pair() {
        let differ = RecordingDiffer {
            fail_on: vec!["V2".into()],
            ..Default::default()
        };
        let result = compare_chain(
            &chain(&["v1", "v2", "v3"]),
            &texts(&["v1", "v2", "v3"]),
            &differ,
        )
        .await;

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].from.version, 2);
        assert_eq!(result[0].to.version, 3);
    }

    #[tokio::test]
    async fn compare_all_honours_category_filter() {
        let mut versioning = VersioningResults::new();
        versioning.insert("constitucion".into(), chain(&["a", "b"]));
        let mut other = chain(&["c", "d"]);
        other.category = "inscripcion".into();
        versioning.insert("inscripcion".into(), other);
        versioning.insert("cedula".into(), chain(&["e"]));

        let differ = RecordingDiffer::default();
        let all_texts = texts(&["a", "b", "c", "d", "e"]);

        let all = compare_all(&versioning, &all_texts, &differ, &[]).await;
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["constitucion", "inscripcion"]);

        let filtered =
            compare_all(&versioning, &all_texts, &differ, &["inscripcion".to_string()]).await;
        assert_eq!(filtered.keys().collect::<Vec<_>>(), vec!["inscripcion"]);
    }
}
