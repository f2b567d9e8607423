//! Cluster-level diff: cross-version cluster matching and per-cluster
//! metric partitions.
//!
//! Matching runs in both directions with modified-Jaccard similarity, since
//! the score is normalized by the target cluster and so is not symmetric.
//! Results are plain values keyed by `(service, representative metric)`;
//! the graphs are never mutated.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::diff::metric::{MetricDiffs, MetricPartition};
use crate::graph::{Cluster, Graph, SimilarityMetric};

/// Best counterpart of a cluster in the other version.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterMatch {
    /// Representative metric of the matched cluster.
    pub matched: Option<String>,
    pub score: f64,
}

impl ClusterMatch {
    pub fn none() -> Self {
        Self {
            matched: None,
            score: 0.0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ServiceClusterDiff {
    /// Silhouette score in the faulty and non-faulty version.
    pub silhouette: (Option<f64>, Option<f64>),
    /// Faulty representative -> best non-faulty match.
    pub faulty_to_non_faulty: Option<IndexMap<String, ClusterMatch>>,
    /// Non-faulty representative -> best faulty match.
    pub non_faulty_to_faulty: Option<IndexMap<String, ClusterMatch>>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ClusterDiffs {
    pub services: IndexMap<String, ServiceClusterDiff>,
    /// Service -> faulty representative -> partition of the cluster's
    /// members.
    pub metric_diffs: IndexMap<String, IndexMap<String, MetricPartition>>,
}

impl ClusterDiffs {
    pub fn contains_service(&self, service: &str) -> bool {
        self.services.contains_key(service)
    }

    pub fn service(&self, service: &str) -> Option<&ServiceClusterDiff> {
        self.services.get(service)
    }

    pub fn faulty_match(&self, service: &str, rep_metric: &str) -> Option<&ClusterMatch> {
        self.services
            .get(service)?
            .faulty_to_non_faulty
            .as_ref()?
            .get(rep_metric)
    }

    pub fn non_faulty_match(&self, service: &str, rep_metric: &str) -> Option<&ClusterMatch> {
        self.services
            .get(service)?
            .non_faulty_to_faulty
            .as_ref()?
            .get(rep_metric)
    }

    pub fn cluster_metric_diff(&self, service: &str, rep_metric: &str) -> Option<&MetricPartition> {
        self.metric_diffs.get(service)?.get(rep_metric)
    }

    /// New plus discarded members of a faulty cluster; `0` if unknown.
    pub fn novelty_score(&self, service: &str, rep_metric: &str) -> usize {
        self.cluster_metric_diff(service, rep_metric)
            .map_or(0, MetricPartition::churn)
    }
}

/// Highest-scoring candidate by `source.similarity(candidate)`; the first
/// of equal maxima wins and a zero score never matches.
pub fn best_match<'a>(
    source: &Cluster,
    candidates: impl IntoIterator<Item = &'a Cluster>,
    metric: SimilarityMetric,
) -> ClusterMatch {
    let mut best = ClusterMatch::none();
    for candidate in candidates {
        let score = source.similarity(candidate, metric);
        if score > best.score {
            best = ClusterMatch {
                matched: Some(candidate.rep_metric.clone()),
                score,
            };
        }
    }
    best
}

fn restricted(members: &BTreeSet<String>, metrics: &BTreeSet<String>) -> BTreeSet<String> {
    members.intersection(metrics).cloned().collect()
}

/// Match clusters of every service in `metric_diffs` (faulty orientation).
pub fn cluster_diffs(faulty: &Graph, non_faulty: &Graph, metric_diffs: &MetricDiffs) -> ClusterDiffs {
    let metric = SimilarityMetric::ModifiedJaccard;
    let mut diffs = ClusterDiffs::default();
    let mut processed: HashSet<&str> = HashSet::new();

    for (service, partition) in &metric_diffs.by_service {
        let Some(f_clusters) = faulty.clusters().get(service) else {
            continue;
        };
        processed.insert(service.as_str());
        let nf_clusters = non_faulty.clusters().get(service);

        let mut entry = ServiceClusterDiff {
            silhouette: (
                f_clusters.silhouette_score,
                nf_clusters.and_then(|c| c.silhouette_score),
            ),
            ..ServiceClusterDiff::default()
        };
        let mut per_cluster: IndexMap<String, MetricPartition> = IndexMap::new();
        let mut forward: IndexMap<String, ClusterMatch> = IndexMap::new();

        for (rep, cluster) in &f_clusters.cluster_table {
            let found = match nf_clusters {
                Some(nf) => best_match(cluster, nf.cluster_table.values(), metric),
                None => ClusterMatch::none(),
            };
            forward.insert(rep.clone(), found);
            per_cluster.insert(
                rep.clone(),
                MetricPartition {
                    new: restricted(&cluster.other_metrics, &partition.new),
                    unchanged: restricted(&cluster.other_metrics, &partition.unchanged),
                    discarded: BTreeSet::new(),
                },
            );
        }
        entry.faulty_to_non_faulty = Some(forward);

        if let Some(nf) = nf_clusters {
            let mut backward: IndexMap<String, ClusterMatch> = IndexMap::new();
            for (rep, cluster) in &nf.cluster_table {
                let found = best_match(cluster, f_clusters.cluster_table.values(), metric);
                if let Some(target) = found.matched.as_ref().and_then(|m| per_cluster.get_mut(m)) {
                    target
                        .discarded
                        .extend(restricted(&cluster.other_metrics, &partition.discarded));
                }
                backward.insert(rep.clone(), found);
            }
            entry.non_faulty_to_faulty = Some(backward);
        } else {
            debug!(service = %service, "service only clustered in faulty version");
        }

        diffs.services.insert(service.clone(), entry);
        diffs.metric_diffs.insert(service.clone(), per_cluster);
    }

    for (service, nf) in non_faulty.clusters() {
        if processed.contains(service.as_str()) || nf.cluster_table.is_empty() {
            continue;
        }
        debug!(service = %service, "service only clustered in non-faulty version");
        let backward = nf
            .cluster_table
            .keys()
            .map(|rep| (rep.clone(), ClusterMatch::none()))
            .collect();
        diffs.services.insert(
            service.clone(),
            ServiceClusterDiff {
                silhouette: (None, nf.silhouette_score),
                faulty_to_non_faulty: None,
                non_faulty_to_faulty: Some(backward),
            },
        );
    }
    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::clustered_graph;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn diff_of(faulty: &Graph, non_faulty: &Graph) -> ClusterDiffs {
        faulty.get_cluster_diffs(non_faulty, &faulty.get_metric_diffs(non_faulty))
    }

    #[test]
    fn test_best_match_strict_greater_keeps_first() {
        let source = Cluster::new("0", "a", "m1", set(&["m1", "m2"]));
        let first = Cluster::new("0", "a", "x", set(&["m1"]));
        let second = Cluster::new("1", "a", "y", set(&["m2"]));
        let found = best_match(&source, [&first, &second], SimilarityMetric::ModifiedJaccard);
        assert_eq!(found.matched.as_deref(), Some("x"));
        assert_eq!(found.score, 1.0);

        let disjoint = Cluster::new("2", "a", "z", set(&["m9"]));
        assert_eq!(
            best_match(&source, [&disjoint], SimilarityMetric::ModifiedJaccard),
            ClusterMatch::none()
        );
    }

    #[test]
    fn test_matching_both_directions_and_discarded_attribution() {
        let faulty = clustered_graph(
            &[],
            &[("a", &[("m1", &["m1", "m2", "m3"]), ("m5", &["m5"])])],
        );
        let non_faulty = clustered_graph(
            &[],
            &[("a", &[("m1", &["m1", "m2"]), ("m4", &["m4", "m3"])])],
        );
        let diffs = diff_of(&faulty, &non_faulty);

        let m1 = diffs.faulty_match("a", "m1").unwrap();
        assert_eq!(m1.matched.as_deref(), Some("m1"));
        assert_eq!(m1.score, 1.0);
        assert_eq!(diffs.faulty_match("a", "m5").unwrap(), &ClusterMatch::none());

        let m4 = diffs.non_faulty_match("a", "m4").unwrap();
        assert_eq!(m4.matched.as_deref(), Some("m1"));
        assert_eq!(m4.score, 1.0 / 3.0);

        let m1_diff = diffs.cluster_metric_diff("a", "m1").unwrap();
        assert_eq!(m1_diff.unchanged, set(&["m1", "m2", "m3"]));
        assert_eq!(m1_diff.discarded, set(&["m4"]));
        assert!(m1_diff.new.is_empty());
        assert_eq!(diffs.novelty_score("a", "m1"), 1);
        assert_eq!(diffs.novelty_score("a", "m5"), 1);
        assert_eq!(diffs.novelty_score("a", "missing"), 0);
        assert_eq!(diffs.service("a").unwrap().silhouette, (Some(0.5), Some(0.5)));
    }

    #[test]
    fn test_one_sided_services() {
        let faulty = clustered_graph(&[], &[("e", &[("m1", &["m1", "m2"])])]);
        let non_faulty = clustered_graph(&[], &[("c", &[("m1", &["m1"])])]);
        let diffs = diff_of(&faulty, &non_faulty);

        let e = diffs.service("e").unwrap();
        assert_eq!(e.silhouette, (Some(0.5), None));
        assert!(e.non_faulty_to_faulty.is_none());
        assert_eq!(diffs.faulty_match("e", "m1"), Some(&ClusterMatch::none()));
        assert_eq!(diffs.novelty_score("e", "m1"), 2);

        let c = diffs.service("c").unwrap();
        assert_eq!(c.silhouette, (None, Some(0.5)));
        assert!(c.faulty_to_non_faulty.is_none());
        assert_eq!(diffs.non_faulty_match("c", "m1"), Some(&ClusterMatch::none()));
    }

    #[test]
    fn test_self_diff_matches_itself() {
        let graph = clustered_graph(
            &[],
            &[
                ("a", &[("m1", &["m1", "m2"]), ("m5", &["m5", "m6"])]),
                ("b", &[("m2", &["m2"])]),
            ],
        );
        let diffs = diff_of(&graph, &graph.clone());
        for (service, clusters) in graph.clusters() {
            for rep in clusters.cluster_table.keys() {
                for found in [
                    diffs.faulty_match(service, rep).unwrap(),
                    diffs.non_faulty_match(service, rep).unwrap(),
                ] {
                    assert_eq!(found.matched.as_deref(), Some(rep.as_str()));
                    assert_eq!(found.score, 1.0);
                }
                assert_eq!(diffs.novelty_score(service, rep), 0);
            }
        }
    }
}
