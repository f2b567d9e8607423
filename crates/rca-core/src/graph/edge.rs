//! Causal edges between metrics and the per-service nodes that group them.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

use crate::models::Lag;

/// A causal relationship from a perpetrator metric to a consequence metric.
///
/// Equality and hashing only look at the metric pair; two edges for the
/// same pair compare equal even when their lags differ.
#[derive(Clone, Debug, Serialize)]
pub struct Edge {
    pub p_metric: String,
    pub c_metric: String,
    pub p_score: f64,
    pub lags: Vec<Lag>,
    pub is_bidirectional: bool,
}

impl Edge {
    pub fn new(
        p_metric: impl Into<String>,
        c_metric: impl Into<String>,
        p_score: f64,
        lags: Vec<Lag>,
        is_bidirectional: bool,
    ) -> Self {
        Self {
            p_metric: p_metric.into(),
            c_metric: c_metric.into(),
            p_score,
            lags,
            is_bidirectional,
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.p_metric, &self.c_metric)
    }

    pub fn lag_set(&self) -> BTreeSet<Lag> {
        self.lags.iter().copied().collect()
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Edge {}

impl Hash for Edge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// An adjacent service as seen from one (base service, direction) context.
///
/// `total_edges` and `total_p_score` always agree with the edge list; the
/// only way to add an edge is [`ServiceNode::push`].
#[derive(Clone, Debug)]
pub struct ServiceNode {
    service_name: String,
    total_edges: usize,
    total_p_score: f64,
    edges: Vec<Arc<Edge>>,
}

impl ServiceNode {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            total_edges: 0,
            total_p_score: 0.0,
            edges: Vec::new(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn total_edges(&self) -> usize {
        self.total_edges
    }

    pub fn total_p_score(&self) -> f64 {
        self.total_p_score
    }

    pub fn edges(&self) -> &[Arc<Edge>] {
        &self.edges
    }

    pub(crate) fn push(&mut self, edge: Arc<Edge>) {
        self.total_edges += 1;
        self.total_p_score += edge.p_score;
        self.edges.push(edge);
    }
}

impl fmt::Display for ServiceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service name = {}, total edges = {}, total p_score = {:4.2}",
            self.service_name, self.total_edges, self.total_p_score
        )
    }
}
