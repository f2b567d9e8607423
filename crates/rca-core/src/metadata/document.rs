//! Typed schema of the clustering metadata document (`metadata.json`).
//!
//! The document is produced and enriched by the clustering stage. It is
//! parsed and validated once here; everything downstream works with the
//! typed records. Fields this crate does not interpret are carried in
//! `extra` so a load/save cycle does not drop them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{RcaError, RcaResult};

pub const METADATA_FILENAME: &str = "metadata.json";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    /// Preferred cluster count; `0` means the service could not be clustered.
    #[serde(default)]
    pub pref_cluster: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessed_filename: Option<String>,
    /// Clustering runs keyed by cluster count.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub clusters: BTreeMap<String, ClusteringRun>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One clustering run of a service at a fixed cluster count.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteringRun {
    pub silhouette_score: f64,
    #[serde(default)]
    pub filenames: Vec<String>,
    /// Cluster id -> member metrics.
    #[serde(default)]
    pub metrics: BTreeMap<String, Vec<String>>,
    /// Cluster id -> representative metric; added by a later enrichment pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep_metrics: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Representative and member metrics of one cluster, as stored.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterMetrics {
    pub cluster_id: String,
    pub rep_metric: String,
    pub other_metrics: Vec<String>,
}

fn numeric_key(key: &str) -> (u64, &str) {
    (key.parse().unwrap_or(u64::MAX), key)
}

impl MetadataDocument {
    pub fn from_json_str(raw: &str) -> RcaResult<Self> {
        let document: MetadataDocument = serde_json::from_str(raw)
            .map_err(|e| RcaError::Metadata(format!("malformed metadata document: {e}")))?;
        document.validate()?;
        Ok(document)
    }

    /// Load `metadata.json` from a snapshot directory.
    pub fn load(dir: &Path) -> RcaResult<Self> {
        let raw = std::fs::read_to_string(dir.join(METADATA_FILENAME))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> RcaResult<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                return Err(RcaError::Metadata(format!(
                    "service {} listed more than once",
                    service.name
                )));
            }
            for (cluster_size, run) in &service.clusters {
                let Some(rep_metrics) = &run.rep_metrics else {
                    continue;
                };
                for cluster_id in run.metrics.keys() {
                    if !rep_metrics.contains_key(cluster_id) {
                        return Err(RcaError::Metadata(format!(
                            "{}: run {cluster_size} has no representative for cluster {cluster_id}",
                            service.name
                        )));
                    }
                }
                for cluster_id in rep_metrics.keys() {
                    if !run.metrics.contains_key(cluster_id) {
                        return Err(RcaError::Metadata(format!(
                            "{}: run {cluster_size} names a representative for unknown cluster {cluster_id}",
                            service.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServiceEntry> {
        self.services.iter_mut().find(|s| s.name == name)
    }

    /// Whether the clustering stage produced a usable clustering for `name`.
    pub fn is_clustered(&self, name: &str) -> bool {
        self.service(name).is_some_and(|s| s.pref_cluster != 0)
    }

    /// Names of all clustered services.
    pub fn clustered_services(&self) -> HashSet<String> {
        self.services
            .iter()
            .filter(|s| s.pref_cluster != 0)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Silhouette score and clusters of the run chosen for `service_name`.
    ///
    /// The chosen run is the one carrying representative metrics (the
    /// largest cluster count if several do). Unknown services and services
    /// without such a run yield `(None, [])`.
    pub fn get_cluster_metrics(&self, service_name: &str) -> (Option<f64>, Vec<ClusterMetrics>) {
        let Some(service) = self.service(service_name) else {
            return (None, Vec::new());
        };
        let chosen = service
            .clusters
            .iter()
            .filter(|(_, run)| run.rep_metrics.is_some())
            .max_by(|(a, _), (b, _)| numeric_key(a).cmp(&numeric_key(b)));
        let Some((_, run)) = chosen else {
            return (None, Vec::new());
        };
        let Some(rep_metrics) = &run.rep_metrics else {
            return (None, Vec::new());
        };

        let mut ids: Vec<&String> = run.metrics.keys().collect();
        ids.sort_by(|a, b| numeric_key(a).cmp(&numeric_key(b)));

        let clusters = ids
            .into_iter()
            .filter_map(|id| {
                let rep_metric = rep_metrics.get(id)?;
                Some(ClusterMetrics {
                    cluster_id: id.clone(),
                    rep_metric: rep_metric.clone(),
                    other_metrics: run.metrics[id].clone(),
                })
            })
            .collect();
        (Some(run.silhouette_score), clusters)
    }
}
