//! Python entry points.

use std::collections::BTreeSet;
use std::path::Path;

use pyo3::prelude::*;

use crate::config::RcaConfig;
use crate::diff::report::analyze_snapshots;
use crate::graph::cluster;

fn loads(py: Python<'_>, json_str: String) -> PyResult<PyObject> {
    let json_module = py.import("json")?;
    json_module
        .call_method1("loads", (json_str,))
        .map(|o| o.into())
}

/// Compare two snapshot directories and return the report as Python objects.
///
/// `config_json` is a partial `RcaConfig` document; `RCA_*` environment
/// variables are applied on top of it.
#[pyfunction]
#[pyo3(signature = (faulty_dir, non_faulty_dir, config_json=None))]
pub fn run_rca(
    py: Python<'_>,
    faulty_dir: &str,
    non_faulty_dir: &str,
    config_json: Option<&str>,
) -> PyResult<PyObject> {
    let config = match config_json {
        Some(raw) => RcaConfig::from_json_str(raw)?,
        None => RcaConfig::default(),
    }
    .with_env_overrides()?;
    let report = py.allow_threads(|| {
        analyze_snapshots(Path::new(faulty_dir), Path::new(non_faulty_dir), &config)
    })?;
    loads(py, report.to_json()?)
}

/// Default configuration as Python objects.
#[pyfunction]
pub fn default_config(py: Python<'_>) -> PyResult<PyObject> {
    let json_str = serde_json::to_string(&RcaConfig::default())
        .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(e.to_string()))?;
    loads(py, json_str)
}

#[pyfunction]
pub fn jaccard(a: Vec<String>, b: Vec<String>) -> f64 {
    let a: BTreeSet<String> = a.into_iter().collect();
    let b: BTreeSet<String> = b.into_iter().collect();
    cluster::jaccard(&a, &b)
}

#[pyfunction]
pub fn modified_jaccard(a: Vec<String>, b: Vec<String>) -> f64 {
    let a: BTreeSet<String> = a.into_iter().collect();
    let b: BTreeSet<String> = b.into_iter().collect();
    cluster::modified_jaccard(&a, &b)
}
