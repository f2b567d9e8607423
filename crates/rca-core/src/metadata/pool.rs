//! Per-service clustering jobs on a worker pool.
//!
//! Jobs never touch the shared document: each returns its partial result,
//! and a single-threaded reducer merges them once the pool is done.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::RcaResult;
use crate::metadata::document::{ClusteringRun, MetadataDocument, ServiceEntry};
use crate::metadata::store::MetadataStore;

/// The external clustering procedure, run once per (service, cluster size).
pub trait Clusterer: Sync {
    /// `Ok(None)` means no usable clustering at this size.
    fn cluster(&self, service: &ServiceEntry, cluster_size: u32) -> RcaResult<Option<ClusteringRun>>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailedJob {
    pub service: String,
    pub cluster_size: u32,
    pub error: String,
}

/// Results of one pool run, ready to merge into a document.
#[derive(Clone, Debug, Default)]
pub struct ClusteringOutcome {
    pub runs: Vec<(String, u32, ClusteringRun)>,
    pub skipped: Vec<(String, u32)>,
    pub failed: Vec<FailedJob>,
}

enum JobResult {
    Done(String, u32, ClusteringRun),
    Skipped(String, u32),
    Failed(FailedJob),
}

fn run_job<C: Clusterer>(clusterer: &C, service: &ServiceEntry, cluster_size: u32) -> JobResult {
    match clusterer.cluster(service, cluster_size) {
        Ok(Some(run)) => JobResult::Done(service.name.clone(), cluster_size, run),
        Ok(None) => JobResult::Skipped(service.name.clone(), cluster_size),
        Err(e) => {
            warn!(service = %service.name, cluster_size, error = %e, "clustering job failed");
            JobResult::Failed(FailedJob {
                service: service.name.clone(),
                cluster_size,
                error: e.to_string(),
            })
        }
    }
}

/// Cluster every service of `document` at every size in `cluster_sizes`.
pub fn run_clustering_pool<C: Clusterer>(
    document: &MetadataDocument,
    clusterer: &C,
    cluster_sizes: &[u32],
    workers: usize,
) -> ClusteringOutcome {
    let jobs: Vec<(&ServiceEntry, u32)> = cluster_sizes
        .iter()
        .flat_map(|&size| document.services.iter().map(move |s| (s, size)))
        .collect();
    if jobs.is_empty() {
        return ClusteringOutcome::default();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();
    let results: Vec<JobResult> = match pool {
        Ok(pool) => pool.install(|| {
            jobs.par_iter()
                .map(|(service, size)| run_job(clusterer, service, *size))
                .collect()
        }),
        Err(_) => jobs
            .iter()
            .map(|(service, size)| run_job(clusterer, service, *size))
            .collect(),
    };

    let mut outcome = ClusteringOutcome::default();
    for result in results {
        match result {
            JobResult::Done(name, size, run) => outcome.runs.push((name, size, run)),
            JobResult::Skipped(name, size) => outcome.skipped.push((name, size)),
            JobResult::Failed(failed) => outcome.failed.push(failed),
        }
    }
    info!(
        jobs = jobs.len(),
        completed = outcome.runs.len(),
        skipped = outcome.skipped.len(),
        failed = outcome.failed.len(),
        "clustering pool finished"
    );
    outcome
}

impl ClusteringOutcome {
    /// Fold the collected runs into `document`; returns the number merged.
    ///
    /// Runs for services the document no longer lists are dropped.
    pub fn merge_into(&self, document: &mut MetadataDocument) -> usize {
        let mut merged = 0;
        for (name, size, run) in &self.runs {
            if let Some(entry) = document.service_mut(name) {
                entry.clusters.insert(size.to_string(), run.clone());
                merged += 1;
            }
        }
        merged
    }

    /// Merge through the store's locked update.
    pub fn persist(&self, store: &MetadataStore) -> RcaResult<usize> {
        store.update(|document| self.merge_into(document))
    }
}
