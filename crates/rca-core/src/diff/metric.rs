//! Metric-level diff: plain set algebra per service.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use serde::Serialize;

use crate::graph::Graph;
use crate::models::DiffCategory;

/// Metrics of one service (or cluster) split by diff category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricPartition {
    pub new: BTreeSet<String>,
    pub discarded: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
}

impl MetricPartition {
    /// `new = a - b`, `discarded = b - a`, `unchanged = a ∩ b`.
    pub fn between(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Self {
        Self {
            new: a.difference(b).cloned().collect(),
            discarded: b.difference(a).cloned().collect(),
            unchanged: a.intersection(b).cloned().collect(),
        }
    }

    pub fn get(&self, category: DiffCategory) -> &BTreeSet<String> {
        match category {
            DiffCategory::New => &self.new,
            DiffCategory::Discarded => &self.discarded,
            DiffCategory::Unchanged => &self.unchanged,
        }
    }

    /// Number of new plus discarded metrics.
    pub fn churn(&self) -> usize {
        self.new.len() + self.discarded.len()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MetricTotals {
    pub new: usize,
    pub discarded: usize,
    pub unchanged: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MetricDiffs {
    pub by_service: IndexMap<String, MetricPartition>,
    pub totals: MetricTotals,
}

impl MetricDiffs {
    pub fn service(&self, name: &str) -> Option<&MetricPartition> {
        self.by_service.get(name)
    }

    /// Services by descending churn, ties broken by name.
    pub fn ranked_services(&self) -> Vec<&str> {
        let mut ranked: Vec<(&str, usize)> = self
            .by_service
            .iter()
            .map(|(name, partition)| (name.as_str(), partition.churn()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().map(|(name, _)| name).collect()
    }
}

/// Partition every service of `this` against `other`.
///
/// Services missing from `other` get an all-new partition but stay out of
/// the totals.
pub fn metric_diffs(this: &Graph, other: &Graph) -> MetricDiffs {
    let empty = BTreeSet::new();
    let mut diffs = MetricDiffs::default();
    for (service, metrics) in this.metrics() {
        let theirs = other.metrics().get(service);
        let partition = MetricPartition::between(metrics, theirs.unwrap_or(&empty));
        if theirs.is_some() {
            diffs.totals.new += partition.new.len();
            diffs.totals.discarded += partition.discarded.len();
            diffs.totals.unchanged += partition.unchanged.len();
        }
        diffs.by_service.insert(service.clone(), partition);
    }
    diffs
}
