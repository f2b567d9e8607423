//! Three-level comparison of a faulty snapshot against a non-faulty one:
//! metrics, clusters, then edges between cluster representatives.

pub mod cluster;
pub mod edge;
pub mod metric;
pub mod report;
