//! Metric clusters and set-overlap similarity between them.

use std::collections::BTreeSet;

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityMetric {
    /// `|A ∩ B| / |A ∪ B|`
    Jaccard,
    /// `|A ∩ B| / |B|`, normalized by the other side only.
    ModifiedJaccard,
}

pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub fn modified_jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if b.is_empty() {
        return 0.0;
    }
    a.intersection(b).count() as f64 / b.len() as f64
}

/// One representative metric and its member metrics, for one service in
/// one snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub service_name: String,
    pub rep_metric: String,
    pub other_metrics: BTreeSet<String>,
}

impl Cluster {
    pub fn new(
        cluster_id: impl Into<String>,
        service_name: impl Into<String>,
        rep_metric: impl Into<String>,
        other_metrics: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            service_name: service_name.into(),
            rep_metric: rep_metric.into(),
            other_metrics: other_metrics.into_iter().collect(),
        }
    }

    pub fn similarity(&self, other: &Cluster, metric: SimilarityMetric) -> f64 {
        match metric {
            SimilarityMetric::Jaccard => jaccard(&self.other_metrics, &other.other_metrics),
            SimilarityMetric::ModifiedJaccard => {
                modified_jaccard(&self.other_metrics, &other.other_metrics)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_modified_jaccard_is_directional() {
        let a = set(&["a", "b"]);
        let b = set(&["a", "b", "c"]);
        assert_eq!(modified_jaccard(&a, &b), 2.0 / 3.0);
        assert_eq!(modified_jaccard(&b, &a), 1.0);
        assert_ne!(modified_jaccard(&a, &b), modified_jaccard(&b, &a));
    }

    #[test]
    fn test_jaccard_values() {
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(jaccard(&set(&["a"]), &set(&["a"])), 1.0);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
        assert_eq!(modified_jaccard(&set(&["a"]), &set(&[])), 0.0);
    }

    #[test]
    fn test_cluster_similarity_dispatch() {
        let a = Cluster::new("0", "nova", "cpu", set(&["cpu", "mem"]));
        let b = Cluster::new("1", "nova", "cpu", set(&["cpu", "mem", "rx"]));
        assert_eq!(a.similarity(&b, SimilarityMetric::Jaccard), 2.0 / 3.0);
        assert_eq!(a.similarity(&b, SimilarityMetric::ModifiedJaccard), 2.0 / 3.0);
        assert_eq!(b.similarity(&a, SimilarityMetric::ModifiedJaccard), 1.0);
    }

    proptest! {
        #[test]
        fn jaccard_is_symmetric(
            a in proptest::collection::btree_set("[a-f]{1,2}", 0..8),
            b in proptest::collection::btree_set("[a-f]{1,2}", 0..8),
        ) {
            prop_assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
            let score = jaccard(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn modified_jaccard_bounded(
            a in proptest::collection::btree_set("[a-f]{1,2}", 0..8),
            b in proptest::collection::btree_set("[a-f]{1,2}", 0..8),
        ) {
            let score = modified_jaccard(&a, &b);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
