//! Edge-level diff between representative-metric clusters.
//!
//! Every egress edge of a relevant service is gated on both endpoints'
//! novelty and cross-version similarity, then looked up in the other
//! version through the cluster matches. An edge can land in the
//! `similarity` bucket, the `novelty` bucket, or both.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::config::EdgeDiffThresholds;
use crate::diff::cluster::ClusterDiffs;
use crate::graph::{Direction, Graph};
use crate::models::Lag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeChange {
    New,
    Discarded,
    Unchanged,
    LagChange,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffBucket {
    Similarity,
    Novelty,
}

/// One classified edge; endpoints are `(service, representative metric)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EdgeRecord {
    #[serde(rename = "type")]
    pub change: EdgeChange,
    pub perpetrator: (String, String),
    pub consequence: (String, String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EdgeCounts {
    pub new: usize,
    pub discarded: usize,
    pub unchanged: usize,
    #[serde(rename = "lag-change")]
    pub lag_change: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BucketDiffs {
    pub new: Vec<EdgeRecord>,
    pub discarded: Vec<EdgeRecord>,
    pub unchanged: Vec<EdgeRecord>,
    #[serde(rename = "lag-change")]
    pub lag_change: Vec<EdgeRecord>,
}

impl BucketDiffs {
    pub fn get(&self, change: EdgeChange) -> &[EdgeRecord] {
        match change {
            EdgeChange::New => &self.new,
            EdgeChange::Discarded => &self.discarded,
            EdgeChange::Unchanged => &self.unchanged,
            EdgeChange::LagChange => &self.lag_change,
        }
    }

    fn push(&mut self, record: EdgeRecord) {
        match record.change {
            EdgeChange::New => self.new.push(record),
            EdgeChange::Discarded => self.discarded.push(record),
            EdgeChange::Unchanged => self.unchanged.push(record),
            EdgeChange::LagChange => self.lag_change.push(record),
        }
    }

    pub fn counts(&self) -> EdgeCounts {
        EdgeCounts {
            new: self.new.len(),
            discarded: self.discarded.len(),
            unchanged: self.unchanged.len(),
            lag_change: self.lag_change.len(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EdgeDiffs {
    pub similarity: BucketDiffs,
    pub novelty: BucketDiffs,
}

impl EdgeDiffs {
    pub fn bucket(&self, bucket: DiffBucket) -> &BucketDiffs {
        match bucket {
            DiffBucket::Similarity => &self.similarity,
            DiffBucket::Novelty => &self.novelty,
        }
    }

    fn bucket_mut(&mut self, bucket: DiffBucket) -> &mut BucketDiffs {
        match bucket {
            DiffBucket::Similarity => &mut self.similarity,
            DiffBucket::Novelty => &mut self.novelty,
        }
    }

    fn record(&mut self, buckets: &[DiffBucket], record: EdgeRecord) {
        for &bucket in buckets {
            self.bucket_mut(bucket).push(record.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Edge extraction
// ---------------------------------------------------------------------------

/// Perpetrator metric -> consequence service -> consequence metric -> lags.
pub type ServiceEdges = IndexMap<String, IndexMap<String, IndexMap<String, BTreeSet<Lag>>>>;

/// Egress edges of `service` towards relevant services. Repeated metric
/// pairs merge their lags.
pub fn extract_service_edges(graph: &Graph, service: &str, relevant: &HashSet<&str>) -> ServiceEdges {
    let mut edges = ServiceEdges::new();
    for node in graph.service_nodes(Direction::Egress, service) {
        if !relevant.contains(node.service_name()) {
            continue;
        }
        for edge in node.edges() {
            edges
                .entry(edge.p_metric.clone())
                .or_default()
                .entry(node.service_name().to_string())
                .or_default()
                .entry(edge.c_metric.clone())
                .or_default()
                .extend(edge.lags.iter().copied());
        }
    }
    edges
}

fn lookup<'a>(
    edges: &'a ServiceEdges,
    p_metric: &str,
    adjacent: &str,
    c_metric: &str,
) -> Option<&'a BTreeSet<Lag>> {
    edges.get(p_metric)?.get(adjacent)?.get(c_metric)
}

// ---------------------------------------------------------------------------
// Gating
// ---------------------------------------------------------------------------

/// A cluster endpoint as seen by the gates.
struct Endpoint<'a> {
    similarity: f64,
    novelty: usize,
    counterpart: Option<&'a str>,
}

impl<'a> Endpoint<'a> {
    fn faulty(diffs: &'a ClusterDiffs, service: &str, rep_metric: &str) -> Self {
        let found = diffs.faulty_match(service, rep_metric);
        Self {
            similarity: found.map_or(0.0, |m| m.score),
            novelty: diffs.novelty_score(service, rep_metric),
            counterpart: found.and_then(|m| m.matched.as_deref()),
        }
    }

    /// Novelty is that of the matched faulty cluster.
    fn non_faulty(diffs: &'a ClusterDiffs, service: &str, rep_metric: &str) -> Self {
        let found = diffs.non_faulty_match(service, rep_metric);
        let counterpart = found.and_then(|m| m.matched.as_deref());
        Self {
            similarity: found.map_or(0.0, |m| m.score),
            novelty: counterpart.map_or(0, |f| diffs.novelty_score(service, f)),
            counterpart,
        }
    }

    fn passes(&self, thresholds: EdgeDiffThresholds) -> bool {
        self.novelty >= thresholds.novelty && self.similarity >= thresholds.similarity
    }
}

fn qualifying_buckets(
    source: &Endpoint<'_>,
    dest: &Endpoint<'_>,
    thresholds: EdgeDiffThresholds,
) -> Vec<DiffBucket> {
    let mut buckets = Vec::with_capacity(2);
    let both_matched = source.counterpart.is_some() && dest.counterpart.is_some();
    if dest.passes(thresholds) && both_matched {
        buckets.push(DiffBucket::Similarity);
    }
    if dest.novelty >= thresholds.novelty {
        buckets.push(DiffBucket::Novelty);
    }
    buckets
}

fn pair(service: &str, metric: &str) -> (String, String) {
    (service.to_string(), metric.to_string())
}

// ---------------------------------------------------------------------------
// Diff
// ---------------------------------------------------------------------------

/// Classify edges of `relevant_services` between `faulty` and `non_faulty`.
pub fn edge_diffs(
    faulty: &Graph,
    non_faulty: &Graph,
    cluster_diffs: &ClusterDiffs,
    relevant_services: &[String],
    thresholds: EdgeDiffThresholds,
) -> EdgeDiffs {
    let relevant: HashSet<&str> = relevant_services.iter().map(String::as_str).collect();
    let mut diffs = EdgeDiffs::default();

    for service in cluster_diffs.services.keys() {
        if !relevant.contains(service.as_str()) {
            debug!(service = %service, "skipping service outside relevant set");
            continue;
        }
        let f_edges = extract_service_edges(faulty, service, &relevant);
        let nf_edges = extract_service_edges(non_faulty, service, &relevant);

        // Edges of the faulty version: new, unchanged or lag-change.
        for (p_metric, by_service) in &f_edges {
            let source = Endpoint::faulty(cluster_diffs, service, p_metric);
            if !source.passes(thresholds) {
                continue;
            }
            for (adjacent, by_metric) in by_service {
                if !cluster_diffs.contains_service(adjacent) {
                    continue;
                }
                for (c_metric, lags) in by_metric {
                    let dest = Endpoint::faulty(cluster_diffs, adjacent, c_metric);
                    let buckets = qualifying_buckets(&source, &dest, thresholds);
                    if buckets.is_empty() {
                        continue;
                    }
                    let counterpart_lags = match (source.counterpart, dest.counterpart) {
                        (Some(nf_p), Some(nf_c)) => lookup(&nf_edges, nf_p, adjacent, nf_c),
                        _ => None,
                    };
                    let change = match counterpart_lags {
                        None => EdgeChange::New,
                        Some(other) if other != lags => EdgeChange::LagChange,
                        Some(_) => EdgeChange::Unchanged,
                    };
                    debug!(
                        perpetrator = %format!("{service}.{p_metric}"),
                        consequence = %format!("{adjacent}.{c_metric}"),
                        ?change,
                        "classified edge"
                    );
                    diffs.record(
                        &buckets,
                        EdgeRecord {
                            change,
                            perpetrator: pair(service, p_metric),
                            consequence: pair(adjacent, c_metric),
                        },
                    );
                }
            }
        }

        // Edges only in the non-faulty version: discarded.
        let has_backward = cluster_diffs
            .service(service)
            .is_some_and(|s| s.non_faulty_to_faulty.is_some());
        if !has_backward {
            continue;
        }
        for (p_metric, by_service) in &nf_edges {
            let source = Endpoint::non_faulty(cluster_diffs, service, p_metric);
            if !source.passes(thresholds) {
                continue;
            }
            for (adjacent, by_metric) in by_service {
                if !cluster_diffs.contains_service(adjacent) {
                    continue;
                }
                for c_metric in by_metric.keys() {
                    let dest = Endpoint::non_faulty(cluster_diffs, adjacent, c_metric);
                    let buckets = qualifying_buckets(&source, &dest, thresholds);
                    if buckets.is_empty() {
                        continue;
                    }
                    let present = match (source.counterpart, dest.counterpart) {
                        (Some(f_p), Some(f_c)) => lookup(&f_edges, f_p, adjacent, f_c).is_some(),
                        _ => false,
                    };
                    if present {
                        continue;
                    }
                    diffs.record(
                        &buckets,
                        EdgeRecord {
                            change: EdgeChange::Discarded,
                            perpetrator: pair(service, p_metric),
                            consequence: pair(adjacent, c_metric),
                        },
                    );
                }
            }
        }
    }
    diffs
}
