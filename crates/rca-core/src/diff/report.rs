//! End-to-end comparison of a faulty and a non-faulty snapshot.

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use crate::config::{DiffOptions, RcaConfig};
use crate::diff::cluster::ClusterDiffs;
use crate::diff::edge::{EdgeCounts, EdgeDiffs};
use crate::diff::metric::MetricDiffs;
use crate::errors::{RcaError, RcaResult};
use crate::graph::{Graph, GraphStats};

/// How many faulty clusters gained or lost member metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClusterNoveltySummary {
    pub new_and_discarded: usize,
    pub only_new: usize,
    pub only_discarded: usize,
    pub changed: usize,
    pub total: usize,
}

impl ClusterNoveltySummary {
    pub fn from_diffs(cluster_diffs: &ClusterDiffs) -> Self {
        let mut summary = Self::default();
        for partition in cluster_diffs.metric_diffs.values().flat_map(|m| m.values()) {
            summary.total += 1;
            match (partition.new.is_empty(), partition.discarded.is_empty()) {
                (false, false) => summary.new_and_discarded += 1,
                (false, true) => summary.only_new += 1,
                (true, false) => summary.only_discarded += 1,
                (true, true) => continue,
            }
            summary.changed += 1;
        }
        summary
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub similarity: EdgeCounts,
    pub novelty: EdgeCounts,
}

/// Edge diff at one similarity threshold.
#[derive(Clone, Debug, Serialize)]
pub struct ThresholdEdgeDiffs {
    pub similarity_threshold: f64,
    pub novelty_threshold: usize,
    pub counts: BucketCounts,
    pub edges: EdgeDiffs,
}

#[derive(Clone, Debug, Serialize)]
pub struct RcaReport {
    pub faulty_stats: GraphStats,
    pub non_faulty_stats: GraphStats,
    pub metric_diffs: MetricDiffs,
    /// Services by descending metric churn.
    pub ranked_services: Vec<String>,
    pub relevant_services: Vec<String>,
    pub cluster_diffs: ClusterDiffs,
    pub cluster_novelty: ClusterNoveltySummary,
    pub edge_diffs: Vec<ThresholdEdgeDiffs>,
}

impl RcaReport {
    pub fn build(faulty: &Graph, non_faulty: &Graph, options: &DiffOptions) -> Self {
        let start = Instant::now();
        let metric_diffs = faulty.get_metric_diffs(non_faulty);
        let ranked_services: Vec<String> = metric_diffs
            .ranked_services()
            .into_iter()
            .map(str::to_string)
            .collect();
        let relevant_services: Vec<String> = match options.top_services {
            Some(n) => ranked_services.iter().take(n).cloned().collect(),
            None => ranked_services.clone(),
        };

        let cluster_diffs = faulty.get_cluster_diffs(non_faulty, &metric_diffs);
        let cluster_novelty = ClusterNoveltySummary::from_diffs(&cluster_diffs);

        let edge_diffs: Vec<ThresholdEdgeDiffs> = options
            .similarity_thresholds
            .iter()
            .map(|&similarity| {
                let thresholds = options.thresholds(similarity);
                let edges =
                    faulty.get_edge_diffs(non_faulty, &cluster_diffs, &relevant_services, thresholds);
                ThresholdEdgeDiffs {
                    similarity_threshold: similarity,
                    novelty_threshold: thresholds.novelty,
                    counts: BucketCounts {
                        similarity: edges.similarity.counts(),
                        novelty: edges.novelty.counts(),
                    },
                    edges,
                }
            })
            .collect();

        info!(
            services = ranked_services.len(),
            relevant = relevant_services.len(),
            changed_clusters = cluster_novelty.changed,
            thresholds = edge_diffs.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rca report built"
        );

        Self {
            faulty_stats: faulty.stats().clone(),
            non_faulty_stats: non_faulty.stats().clone(),
            metric_diffs,
            ranked_services,
            relevant_services,
            cluster_diffs,
            cluster_novelty,
            edge_diffs,
        }
    }

    pub fn to_json(&self) -> RcaResult<String> {
        serde_json::to_string(self).map_err(RcaError::from)
    }
}

/// Build both snapshot graphs concurrently and compare them.
pub fn analyze_snapshots(
    faulty_dir: &Path,
    non_faulty_dir: &Path,
    config: &RcaConfig,
) -> RcaResult<RcaReport> {
    config.diff.validate()?;
    let (faulty, non_faulty) = rayon::join(
        || Graph::from_snapshot(faulty_dir, &config.fill, &config.diff),
        || Graph::from_snapshot(non_faulty_dir, &config.fill, &config.diff),
    );
    let (faulty, non_faulty) = (faulty?, non_faulty?);
    Ok(RcaReport::build(&faulty, &non_faulty, &config.diff))
}
