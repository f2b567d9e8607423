//! Fixture builders shared by unit tests.

use std::collections::BTreeMap;

use crate::graph::Graph;
use crate::metadata::document::{ClusteringRun, MetadataDocument, ServiceEntry};

/// `(representative, members)` of one cluster.
pub(crate) type ClusterSpec<'a> = (&'a str, &'a [&'a str]);

pub(crate) fn document(services: &[(&str, &[ClusterSpec])]) -> MetadataDocument {
    let services = services
        .iter()
        .map(|(name, clusters)| {
            let mut metrics = BTreeMap::new();
            let mut reps = BTreeMap::new();
            for (id, (rep, members)) in clusters.iter().enumerate() {
                metrics.insert(
                    id.to_string(),
                    members.iter().map(|m| format!("{name}|{m}")).collect(),
                );
                reps.insert(id.to_string(), format!("{name}|{rep}"));
            }
            let size = clusters.len().max(1) as u32;
            let run = ClusteringRun {
                silhouette_score: 0.5,
                metrics,
                rep_metrics: Some(reps),
                ..ClusteringRun::default()
            };
            ServiceEntry {
                name: name.to_string(),
                pref_cluster: size,
                clusters: [(size.to_string(), run)].into_iter().collect(),
                ..ServiceEntry::default()
            }
        })
        .collect();
    MetadataDocument {
        services,
        ..MetadataDocument::default()
    }
}

/// Graph from edge-spec lines with clusters attached for `services`.
pub(crate) fn clustered_graph(lines: &[&str], services: &[(&str, &[ClusterSpec])]) -> Graph {
    let mut graph = Graph::from_spec_lines(lines).unwrap();
    let names: Vec<String> = services.iter().map(|(n, _)| n.to_string()).collect();
    graph.extract_metadata(&document(services), &names);
    graph
}
