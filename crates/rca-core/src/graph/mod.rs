//! Per-snapshot service dependency graph.
//!
//! Nodes are services; each directed service pair carries the causal edges
//! observed between their metrics. The graph keeps two adjacency views
//! (ingress and egress) that always hold the same `Arc<Edge>` instances.

pub mod adjacency;
pub mod cluster;
pub mod edge;
pub mod spec_lines;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DiffOptions, EdgeDiffThresholds, FillOptions};
use crate::diff::cluster::ClusterDiffs;
use crate::diff::edge::EdgeDiffs;
use crate::diff::metric::MetricDiffs;
use crate::errors::RcaResult;
use crate::metadata::document::MetadataDocument;
use crate::models::{canonical_metric, Lag};

pub use adjacency::{Adjacency, Direction};
pub use cluster::{jaccard, modified_jaccard, Cluster, SimilarityMetric};
pub use edge::{Edge, ServiceNode};

/// Construction counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Significant (lag, direction) classifications seen while filling.
    pub edges: usize,
    /// Distinct services involved in at least one significant lag.
    pub services: usize,
    pub files: usize,
    pub row_pairs: usize,
}

/// Cluster table of one service.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ServiceClusters {
    pub silhouette_score: Option<f64>,
    /// Keyed by canonical representative metric.
    pub cluster_table: IndexMap<String, Cluster>,
}

#[derive(Clone, Debug, Default)]
pub struct Graph {
    ingress: Adjacency,
    egress: Adjacency,
    metrics: IndexMap<String, BTreeSet<String>>,
    clusters: IndexMap<String, ServiceClusters>,
    pub(crate) stats: GraphStats,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a snapshot directory holding causality files and
    /// `metadata.json`, then attach cluster metadata.
    pub fn from_snapshot(
        dir: &Path,
        options: &FillOptions,
        diff_options: &DiffOptions,
    ) -> RcaResult<Self> {
        let document = MetadataDocument::load(dir)?;
        let mut graph = Graph::new();
        graph.fill(dir, &document, options)?;
        graph.extract_metadata(&document, &diff_options.add_services);
        Ok(graph)
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Record one causal edge in both adjacency views.
    ///
    /// Repeated calls for the same metric pair append distinct edges.
    #[allow(clippy::too_many_arguments)]
    pub fn add_edge(
        &mut self,
        p_service: &str,
        p_metric: &str,
        p_score: f64,
        c_service: &str,
        c_metric: &str,
        lags: Vec<Lag>,
        is_bidirectional: bool,
    ) -> Arc<Edge> {
        let edge = Arc::new(Edge::new(p_metric, c_metric, p_score, lags, is_bidirectional));
        self.egress
            .node_entry(p_service, c_service)
            .push(Arc::clone(&edge));
        self.ingress
            .node_entry(c_service, p_service)
            .push(Arc::clone(&edge));
        edge
    }

    /// Read every causality file in `dir` into this graph.
    pub fn fill(
        &mut self,
        dir: &Path,
        document: &MetadataDocument,
        options: &FillOptions,
    ) -> RcaResult<()> {
        crate::ingest::loader::fill(self, dir, document, options)
    }

    /// Attach cluster metadata for every service with edges, plus
    /// `add_services`.
    pub fn extract_metadata(&mut self, document: &MetadataDocument, add_services: &[String]) {
        let mut services: IndexSet<String> =
            self.services().into_iter().map(str::to_string).collect();
        services.extend(add_services.iter().cloned());
        for service in &services {
            self.extract_service_metadata(service, document);
        }
        info!(
            services = services.len(),
            clustered = self.metrics.len(),
            "cluster metadata extracted"
        );
    }

    /// Attach cluster metadata for one service; a second call is a no-op.
    pub fn extract_service_metadata(&mut self, service: &str, document: &MetadataDocument) {
        if self.clusters.contains_key(service) {
            return;
        }
        let (silhouette_score, cluster_metrics) = document.get_cluster_metrics(service);
        if cluster_metrics.is_empty() {
            if document.is_clustered(service) {
                warn!(service, "clustered service has no run with representative metrics");
            } else {
                debug!(service, "no representative clustering available");
            }
        }

        let mut table = ServiceClusters {
            silhouette_score,
            cluster_table: IndexMap::new(),
        };
        for entry in cluster_metrics {
            let rep_metric = canonical_metric(&entry.rep_metric).to_string();
            let members: BTreeSet<String> = entry
                .other_metrics
                .iter()
                .map(|m| canonical_metric(m).to_string())
                .collect();
            self.metrics
                .entry(service.to_string())
                .or_default()
                .extend(members.iter().cloned());
            table.cluster_table.insert(
                rep_metric.clone(),
                Cluster::new(entry.cluster_id, service, rep_metric, members),
            );
        }
        self.clusters.insert(service.to_string(), table);
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn adjacency(&self, direction: Direction) -> &Adjacency {
        match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        }
    }

    pub fn service_nodes(
        &self,
        direction: Direction,
        service: &str,
    ) -> impl Iterator<Item = &ServiceNode> {
        self.adjacency(direction).nodes(service)
    }

    pub fn node(&self, direction: Direction, service: &str, adjacent: &str) -> Option<&ServiceNode> {
        self.adjacency(direction).node(service, adjacent)
    }

    /// Services with at least one edge, egress bases first.
    pub fn services(&self) -> Vec<&str> {
        let mut seen: IndexSet<&str> = self.egress.services().collect();
        seen.extend(self.ingress.services());
        seen.into_iter().collect()
    }

    pub fn metrics(&self) -> &IndexMap<String, BTreeSet<String>> {
        &self.metrics
    }

    pub fn clusters(&self) -> &IndexMap<String, ServiceClusters> {
        &self.clusters
    }

    pub fn cluster(&self, service: &str, rep_metric: &str) -> Option<&Cluster> {
        self.clusters.get(service)?.cluster_table.get(rep_metric)
    }

    pub fn stats(&self) -> &GraphStats {
        &self.stats
    }

    // -----------------------------------------------------------------------
    // Diffing (self = faulty, other = non-faulty)
    // -----------------------------------------------------------------------

    pub fn get_metric_diffs(&self, other: &Graph) -> MetricDiffs {
        crate::diff::metric::metric_diffs(self, other)
    }

    pub fn get_cluster_diffs(&self, other: &Graph, metric_diffs: &MetricDiffs) -> ClusterDiffs {
        crate::diff::cluster::cluster_diffs(self, other, metric_diffs)
    }

    pub fn get_edge_diffs(
        &self,
        other: &Graph,
        cluster_diffs: &ClusterDiffs,
        relevant_services: &[String],
        thresholds: EdgeDiffThresholds,
    ) -> EdgeDiffs {
        crate::diff::edge::edge_diffs(self, other, cluster_diffs, relevant_services, thresholds)
    }
}
