//! RCA core library: dependency graphs built from Granger-causality test
//! results, and the diff between a faulty and a non-faulty snapshot.
//!
//! A snapshot directory holds gzip-compressed causality tables plus the
//! clustering metadata document. Each snapshot becomes a [`graph::Graph`];
//! [`diff::report::RcaReport`] compares two of them at the metric, cluster
//! and edge level. With the `python` feature the crate also builds as the
//! `_rca_core` extension module.

pub mod config;
pub mod diff;
pub mod errors;
pub mod graph;
pub mod ingest;
pub mod metadata;
pub mod models;

#[cfg(feature = "python")]
pub mod bindings;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::RcaConfig;
pub use diff::report::{analyze_snapshots, RcaReport};
pub use errors::{RcaError, RcaResult};
pub use graph::Graph;

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::wrap_pyfunction;

// ---------------------------------------------------------------------------
// Top-level Python module: _rca_core
// ---------------------------------------------------------------------------

#[cfg(feature = "python")]
#[pymodule]
fn _rca_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("DEFAULT_SIGNIFICANCE", config::DEFAULT_SIGNIFICANCE)?;
    m.add("DEFAULT_NOVELTY_THRESHOLD", config::DEFAULT_NOVELTY_THRESHOLD)?;
    m.add(
        "DEFAULT_SIMILARITY_THRESHOLDS",
        config::DEFAULT_SIMILARITY_THRESHOLDS.to_vec(),
    )?;

    m.add_function(wrap_pyfunction!(bindings::run_rca, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::default_config, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::jaccard, m)?)?;
    m.add_function(wrap_pyfunction!(bindings::modified_jaccard, m)?)?;

    Ok(())
}
