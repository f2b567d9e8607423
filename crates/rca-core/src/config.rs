//! Tunables for graph construction and diffing.
//!
//! Every options struct deserializes from a partial JSON document (missing
//! fields take their defaults) and can be adjusted from `RCA_*` environment
//! variables.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{RcaError, RcaResult};
use crate::models::service_prefix;

// Construction defaults
pub const DEFAULT_SIGNIFICANCE: f64 = 0.01;
pub const DEFAULT_WORKERS: usize = 4;
pub const MAX_WORKERS: usize = 256;

// Diff defaults
pub const DEFAULT_SIMILARITY_THRESHOLDS: &[f64] = &[0.01, 0.50, 0.60, 0.70];
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.01;
pub const DEFAULT_NOVELTY_THRESHOLD: usize = 1;

/// Object-storage daemons left out of the dependency graph by default.
pub const DEFAULT_EXCLUDED_SERVICES: &[&str] = &[
    "swift_proxy_server",
    "swift_object_updater",
    "swift_object_replicator",
    "swift_object_auditor",
    "swift_object_server",
    "swift_container_updater",
    "swift_container_replicator",
    "swift_container_auditor",
    "swift_container_server",
    "swift_account_reaper",
    "swift_account_replicator",
    "swift_account_auditor",
    "swift_account_server",
    "swift_rsyncd",
];

// ---------------------------------------------------------------------------
// Construction options
// ---------------------------------------------------------------------------

/// Which service pairs make it into the graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "services")]
pub enum ServiceSelection {
    /// Drop a pair if either service is listed.
    Exclude(BTreeSet<String>),
    /// Keep a pair only if both service prefixes occur in some listed name.
    Include(Vec<String>),
}

impl Default for ServiceSelection {
    fn default() -> Self {
        ServiceSelection::Exclude(
            DEFAULT_EXCLUDED_SERVICES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}

impl ServiceSelection {
    pub fn admits(&self, service_a: &str, service_b: &str) -> bool {
        match self {
            ServiceSelection::Exclude(excluded) => {
                !excluded.contains(service_a) && !excluded.contains(service_b)
            }
            ServiceSelection::Include(included) => {
                let matches = |service: &str| {
                    let prefix = service_prefix(service);
                    included.iter().any(|s| s.contains(prefix))
                };
                matches(service_a) && matches(service_b)
            }
        }
    }
}

/// Uncertainty band over per-metric scores.
///
/// A pair is skipped when `score(perpetrator) < upper` and
/// `score(consequence) > lower`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreBand {
    pub lower: f64,
    pub upper: f64,
    /// `metric<TAB>score` table, optionally gzip-compressed.
    pub scores_path: PathBuf,
}

/// How lags significant in both directions become edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BidirectionalPolicy {
    /// Counted in the stats, never materialized.
    #[default]
    Exclude,
    /// One flagged edge, perpetrator -> consequence.
    SingleEdge,
    /// One flagged edge in each direction.
    TwoEdges,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillOptions {
    /// p-value cutoff below which a lag's test counts as significant.
    pub significance: f64,
    pub selection: ServiceSelection,
    /// Metric names (without `-diff`) whose pairs are dropped.
    pub excluded_metrics: BTreeSet<String>,
    pub score_band: Option<ScoreBand>,
    pub bidirectional: BidirectionalPolicy,
    /// Threads used to parse causality files.
    pub workers: usize,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            significance: DEFAULT_SIGNIFICANCE,
            selection: ServiceSelection::default(),
            excluded_metrics: BTreeSet::new(),
            score_band: None,
            bidirectional: BidirectionalPolicy::default(),
            workers: DEFAULT_WORKERS,
        }
    }
}

impl FillOptions {
    pub fn validate(&self) -> RcaResult<()> {
        if !(self.significance > 0.0 && self.significance <= 1.0) {
            return Err(RcaError::Config(format!(
                "significance must be in (0, 1], got {}",
                self.significance
            )));
        }
        if let Some(band) = &self.score_band {
            if band.lower > band.upper {
                return Err(RcaError::Config(format!(
                    "score band lower bound {} exceeds upper bound {}",
                    band.lower, band.upper
                )));
            }
        }
        Ok(())
    }

    pub fn bounded_workers(&self) -> usize {
        self.workers.clamp(1, MAX_WORKERS)
    }
}

// ---------------------------------------------------------------------------
// Diff options
// ---------------------------------------------------------------------------

/// Gates applied to both ends of an edge during edge diffing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeDiffThresholds {
    pub similarity: f64,
    pub novelty: usize,
}

impl Default for EdgeDiffThresholds {
    fn default() -> Self {
        Self {
            similarity: DEFAULT_SIMILARITY_THRESHOLD,
            novelty: DEFAULT_NOVELTY_THRESHOLD,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// One edge diff is produced per threshold.
    pub similarity_thresholds: Vec<f64>,
    pub novelty_threshold: usize,
    /// Number of highest-churn services treated as relevant; `None` keeps all.
    pub top_services: Option<usize>,
    /// Services to pull cluster metadata for even without edges.
    pub add_services: Vec<String>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            similarity_thresholds: DEFAULT_SIMILARITY_THRESHOLDS.to_vec(),
            novelty_threshold: DEFAULT_NOVELTY_THRESHOLD,
            top_services: None,
            add_services: Vec::new(),
        }
    }
}

impl DiffOptions {
    pub fn validate(&self) -> RcaResult<()> {
        if let Some(bad) = self
            .similarity_thresholds
            .iter()
            .find(|t| !(0.0..=1.0).contains(*t))
        {
            return Err(RcaError::Config(format!(
                "similarity threshold must be in [0, 1], got {bad}"
            )));
        }
        Ok(())
    }

    pub fn thresholds(&self, similarity: f64) -> EdgeDiffThresholds {
        EdgeDiffThresholds {
            similarity,
            novelty: self.novelty_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RcaConfig {
    pub fill: FillOptions,
    pub diff: DiffOptions,
}

fn parse_override<T: FromStr>(name: &str, raw: &str) -> RcaResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| RcaError::Config(format!("invalid value for {name}: {raw:?}")))
}

impl RcaConfig {
    pub fn from_json_str(raw: &str) -> RcaResult<Self> {
        let config: RcaConfig = serde_json::from_str(raw)?;
        config.fill.validate()?;
        config.diff.validate()?;
        Ok(config)
    }

    /// Apply `RCA_*` variables from the process environment.
    pub fn with_env_overrides(self) -> RcaResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> RcaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("RCA_GC_SIGNIFICANCE") {
            self.fill.significance = parse_override("RCA_GC_SIGNIFICANCE", &raw)?;
        }
        if let Some(raw) = lookup("RCA_WORKERS") {
            self.fill.workers = parse_override("RCA_WORKERS", &raw)?;
        }
        if let Some(raw) = lookup("RCA_EXCLUDE_METRICS") {
            self.fill.excluded_metrics = raw
                .split('|')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("RCA_INCLUDE_SERVICES") {
            let included: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !included.is_empty() {
                self.fill.selection = ServiceSelection::Include(included);
            }
        }
        if let Some(raw) = lookup("RCA_NOVELTY_THRESHOLD") {
            self.diff.novelty_threshold = parse_override("RCA_NOVELTY_THRESHOLD", &raw)?;
        }
        if let Some(raw) = lookup("RCA_TOP_SERVICES") {
            self.diff.top_services = Some(parse_override("RCA_TOP_SERVICES", &raw)?);
        }
        self.fill.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_selection_excludes_swift() {
        let selection = ServiceSelection::default();
        assert!(!selection.admits("swift_rsyncd", "nova_api"));
        assert!(!selection.admits("nova_api", "swift_proxy_server"));
        assert!(selection.admits("nova_api", "keystone"));
    }

    #[test]
    fn test_include_selection_matches_prefixes() {
        let selection = ServiceSelection::Include(vec!["nova".into(), "keystone".into()]);
        assert!(selection.admits("nova_api", "keystone"));
        assert!(!selection.admits("nova_api", "glance_api"));
        assert!(!selection.admits("rabbitmq", "keystone"));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config =
            RcaConfig::from_json_str(r#"{"fill": {"significance": 0.001}}"#).unwrap();
        assert_eq!(config.fill.significance, 0.001);
        assert_eq!(config.fill.workers, DEFAULT_WORKERS);
        assert_eq!(config.diff.similarity_thresholds, DEFAULT_SIMILARITY_THRESHOLDS);
        assert_eq!(config.fill.bidirectional, BidirectionalPolicy::Exclude);
    }

    #[test]
    fn test_json_selection_modes() {
        let config = RcaConfig::from_json_str(
            r#"{"fill": {"selection": {"mode": "include", "services": ["nova"]}}}"#,
        )
        .unwrap();
        assert_eq!(
            config.fill.selection,
            ServiceSelection::Include(vec!["nova".to_string()])
        );
    }

    #[test]
    fn test_invalid_significance_rejected() {
        let err = RcaConfig::from_json_str(r#"{"fill": {"significance": 0.0}}"#).unwrap_err();
        assert!(matches!(err, RcaError::Config(_)));
    }

    #[test]
    fn test_overrides_applied() {
        let vars: HashMap<&str, &str> = [
            ("RCA_GC_SIGNIFICANCE", "0.05"),
            ("RCA_EXCLUDE_METRICS", "rx_bytes|tx_bytes"),
            ("RCA_INCLUDE_SERVICES", "nova, neutron"),
            ("RCA_TOP_SERVICES", "3"),
        ]
        .into_iter()
        .collect();
        let config = RcaConfig::default()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.fill.significance, 0.05);
        assert!(config.fill.excluded_metrics.contains("rx_bytes"));
        assert!(config.fill.excluded_metrics.contains("tx_bytes"));
        assert_eq!(
            config.fill.selection,
            ServiceSelection::Include(vec!["nova".into(), "neutron".into()])
        );
        assert_eq!(config.diff.top_services, Some(3));
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let err = RcaConfig::default()
            .with_overrides(|name| (name == "RCA_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, RcaError::Config(_)));
    }

    #[test]
    fn test_similarity_threshold_out_of_range() {
        let err = RcaConfig::from_json_str(r#"{"diff": {"similarity_thresholds": [0.5, 1.5]}}"#)
            .unwrap_err();
        assert!(matches!(err, RcaError::Config(ref m) if m.contains("1.5")));
    }

    #[test]
    fn test_workers_bounded() {
        let options = FillOptions {
            workers: 0,
            ..FillOptions::default()
        };
        assert_eq!(options.bounded_workers(), 1);
    }
}
