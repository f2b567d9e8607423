//! Snapshot construction: parse causality files in parallel, then apply
//! their edges to the graph in file order.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{BidirectionalPolicy, FillOptions};
use crate::errors::{RcaError, RcaResult};
use crate::graph::Graph;
use crate::ingest::classify::{classify_pair, LagBuckets};
use crate::ingest::reader::{list_causality_files, read_causality_file};
use crate::ingest::scores::{BandCheck, MetricScores};
use crate::metadata::document::MetadataDocument;
use crate::models::{split_identifier, strip_diff_suffix, LagDirection};

/// A row pair that passed filtering, ready to become edges.
#[derive(Clone, Debug, PartialEq)]
pub struct PairRecord {
    pub service_a: String,
    pub metric_a: String,
    pub service_b: String,
    pub metric_b: String,
    pub weight_a: f64,
    pub weight_b: f64,
    pub buckets: LagBuckets,
}

#[derive(Debug, Default)]
struct ParsedFile {
    pairs: Vec<PairRecord>,
    row_pairs: usize,
}

struct RowFilter<'a> {
    options: &'a FillOptions,
    clustered: &'a HashSet<String>,
    scores: Option<&'a MetricScores>,
}

fn split_or_err<'r>(identifier: &'r str, path: &Path) -> RcaResult<(&'r str, &'r str)> {
    split_identifier(identifier).ok_or_else(|| {
        RcaError::Parse(format!(
            "{}: identifier without service delimiter: {identifier:?}",
            path.display()
        ))
    })
}

impl RowFilter<'_> {
    /// Weights for an admitted pair, `None` if it is filtered out.
    fn admit(
        &self,
        service_a: &str,
        metric_a: &str,
        service_b: &str,
        metric_b: &str,
    ) -> Option<(f64, f64)> {
        if !self.options.selection.admits(service_a, service_b) {
            return None;
        }
        if !self.clustered.contains(service_a) || !self.clustered.contains(service_b) {
            return None;
        }
        let base_a = strip_diff_suffix(metric_a);
        let base_b = strip_diff_suffix(metric_b);
        let excluded = &self.options.excluded_metrics;
        if excluded.contains(base_a) || excluded.contains(base_b) {
            return None;
        }

        let (Some(band), Some(scores)) = (&self.options.score_band, self.scores) else {
            return Some((1.0, 1.0));
        };
        match scores.check(band, base_a, base_b) {
            BandCheck::Weights(a, b) => Some((a, b)),
            BandCheck::Uncertain => None,
            BandCheck::Missing(metric) => {
                warn!(metric = %metric, "no score for metric, skipping pair");
                None
            }
        }
    }

    fn parse_file(&self, path: &Path) -> RcaResult<ParsedFile> {
        let rows = read_causality_file(path)?;
        let mut parsed = ParsedFile::default();
        for pair in rows.chunks_exact(2) {
            let (row_a, row_b) = (&pair[0], &pair[1]);
            parsed.row_pairs += 1;
            let (service_a, metric_a) = split_or_err(&row_a.perpetrator, path)?;
            let (service_b, metric_b) = split_or_err(&row_a.consequence, path)?;
            let Some((weight_a, weight_b)) = self.admit(service_a, metric_a, service_b, metric_b)
            else {
                continue;
            };
            let buckets = classify_pair(row_a, row_b, self.options.significance);
            if buckets.is_empty() {
                continue;
            }
            parsed.pairs.push(PairRecord {
                service_a: service_a.to_string(),
                metric_a: metric_a.to_string(),
                service_b: service_b.to_string(),
                metric_b: metric_b.to_string(),
                weight_a,
                weight_b,
                buckets,
            });
        }
        if rows.len() % 2 == 1 {
            debug!(file = %path.display(), "dropping unpaired trailing row");
        }
        debug!(
            file = %path.display(),
            rows = rows.len(),
            kept = parsed.pairs.len(),
            "parsed causality file"
        );
        Ok(parsed)
    }
}

fn add_repeated(graph: &mut Graph, pair: &PairRecord, direction: LagDirection, a_to_b: bool) {
    let lags = pair.buckets.bucket(direction);
    let is_bidirectional = direction == LagDirection::Bidir;
    let (p_service, p_metric, p_score, c_service, c_metric) = if a_to_b {
        (&pair.service_a, &pair.metric_a, pair.weight_a, &pair.service_b, &pair.metric_b)
    } else {
        (&pair.service_b, &pair.metric_b, pair.weight_b, &pair.service_a, &pair.metric_a)
    };
    for _ in 0..pair.buckets.emissions(direction) {
        graph.add_edge(
            p_service,
            p_metric,
            p_score,
            c_service,
            c_metric,
            lags.to_vec(),
            is_bidirectional,
        );
    }
}

/// Turn one admitted pair into edges according to `policy`.
///
/// Each bucket is added once per emission, always with its full lag list.
pub fn apply_pair(graph: &mut Graph, pair: &PairRecord, policy: BidirectionalPolicy) {
    add_repeated(graph, pair, LagDirection::Forward, true);
    add_repeated(graph, pair, LagDirection::Back, false);
    match policy {
        BidirectionalPolicy::Exclude => {}
        BidirectionalPolicy::SingleEdge => {
            add_repeated(graph, pair, LagDirection::Bidir, true);
        }
        BidirectionalPolicy::TwoEdges => {
            add_repeated(graph, pair, LagDirection::Bidir, true);
            add_repeated(graph, pair, LagDirection::Bidir, false);
        }
    }
}

/// Populate `graph` from every causality file in `dir`.
pub fn fill(
    graph: &mut Graph,
    dir: &Path,
    document: &MetadataDocument,
    options: &FillOptions,
) -> RcaResult<()> {
    let start = Instant::now();
    options.validate()?;
    let files: Vec<PathBuf> = list_causality_files(dir)?;
    let scores = match &options.score_band {
        Some(band) => Some(MetricScores::load(&band.scores_path)?),
        None => None,
    };
    let clustered = document.clustered_services();
    let filter = RowFilter {
        options,
        clustered: &clustered,
        scores: scores.as_ref(),
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.bounded_workers())
        .build();
    let parsed: Vec<RcaResult<ParsedFile>> = match pool {
        Ok(pool) => pool.install(|| files.par_iter().map(|f| filter.parse_file(f)).collect()),
        Err(_) => files.iter().map(|f| filter.parse_file(f)).collect(),
    };
    let parsed: Vec<ParsedFile> = parsed.into_iter().collect::<RcaResult<_>>()?;

    let mut services: BTreeSet<&str> = BTreeSet::new();
    for file in &parsed {
        graph.stats.row_pairs += file.row_pairs;
        for pair in &file.pairs {
            graph.stats.edges += pair.buckets.significant_count();
            services.insert(&pair.service_a);
            services.insert(&pair.service_b);
            apply_pair(graph, pair, options.bidirectional);
        }
    }
    graph.stats.files += files.len();
    graph.stats.services = services.len();

    info!(
        dir = %dir.display(),
        files = files.len(),
        edges = graph.stats.edges,
        services = graph.stats.services,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "snapshot graph filled"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ScoreBand, ServiceSelection};
    use crate::graph::Direction;
    use crate::ingest::reader::tests::{write_gz, HEADER};
    use crate::models::Lag;

    const DOC: &str = r#"{"services": [
        {"name": "nova_api", "pref_cluster": 2},
        {"name": "keystone", "pref_cluster": 3},
        {"name": "glance_api", "pref_cluster": 0},
        {"name": "swift_proxy_server", "pref_cluster": 2}
    ]}"#;

    fn snapshot(rows: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut table = String::from(HEADER);
        for (i, row) in rows.iter().enumerate() {
            table.push_str(&format!("\n{i}\t{row}"));
        }
        table.push('\n');
        write_gz(&dir.path().join("run-causality.tsv.gz"), &table);
        dir
    }

    fn filled(dir: &Path, options: &FillOptions) -> RcaResult<Graph> {
        let document = MetadataDocument::from_json_str(DOC).unwrap();
        let mut graph = Graph::new();
        graph.fill(dir, &document, options)?;
        Ok(graph)
    }

    #[test]
    fn test_forward_and_back_edges() {
        let dir = snapshot(&[
            "nova_api|cpu\tkeystone|mem\t0.001\t0.5\t0.001\t0.5\t0.5",
            "keystone|mem\tnova_api|cpu\t0.5\t0.001\t0.5\t0.5\t0.5",
        ]);
        let graph = filled(dir.path(), &FillOptions::default()).unwrap();

        // lag 1 emits forward, lags 2 and 3 emit forward and back
        let forward = graph.node(Direction::Egress, "nova_api", "keystone").unwrap();
        assert_eq!(forward.total_edges(), 3);
        assert_eq!(forward.total_p_score(), 3.0);
        for edge in forward.edges() {
            assert_eq!(edge.key(), ("cpu", "mem"));
            assert_eq!(edge.lags, vec![Lag(1), Lag(3)]);
        }

        let back = graph.node(Direction::Egress, "keystone", "nova_api").unwrap();
        assert_eq!(back.total_edges(), 2);
        for edge in back.edges() {
            assert_eq!(edge.key(), ("mem", "cpu"));
            assert_eq!(edge.lags, vec![Lag(2)]);
        }
        let ingress = graph.node(Direction::Ingress, "keystone", "nova_api").unwrap();
        assert_eq!(ingress.total_edges(), 3);

        assert_eq!(graph.stats().edges, 3);
        assert_eq!(graph.stats().services, 2);
        assert_eq!(graph.stats().files, 1);
    }

    #[test]
    fn test_bidirectional_policies() {
        let rows = [
            "nova_api|cpu\tkeystone|mem\t0.001\t0.5\t0.5\t0.5\t0.5",
            "keystone|mem\tnova_api|cpu\t0.001\t0.5\t0.5\t0.5\t0.5",
        ];
        let dir = snapshot(&rows);

        let excluded = filled(dir.path(), &FillOptions::default()).unwrap();
        assert!(excluded.services().is_empty());
        assert_eq!(excluded.stats().edges, 1);

        let single = FillOptions {
            bidirectional: BidirectionalPolicy::SingleEdge,
            ..FillOptions::default()
        };
        let graph = filled(dir.path(), &single).unwrap();
        let node = graph.node(Direction::Egress, "nova_api", "keystone").unwrap();
        assert!(node.edges()[0].is_bidirectional);
        assert!(graph.node(Direction::Egress, "keystone", "nova_api").is_none());

        let both = FillOptions {
            bidirectional: BidirectionalPolicy::TwoEdges,
            ..FillOptions::default()
        };
        let graph = filled(dir.path(), &both).unwrap();
        assert!(graph.node(Direction::Egress, "keystone", "nova_api").is_some());
    }

    #[test]
    fn test_bidirectional_lag_re_emits_open_buckets() {
        let dir = snapshot(&[
            "nova_api|cpu\tkeystone|mem\t0.5\t0.001\t0.001\t0.5\t0.001",
            "keystone|mem\tnova_api|cpu\t0.001\t0.5\t0.001\t0.5\t0.5",
        ]);
        let graph = filled(dir.path(), &FillOptions::default()).unwrap();

        // back at 1, forward at 2 and 5, bidir at 3
        let forward = graph.node(Direction::Egress, "nova_api", "keystone").unwrap();
        assert_eq!(forward.total_edges(), 3);
        assert!(forward.edges().iter().all(|e| !e.is_bidirectional));
        assert_eq!(forward.edges()[0].lags, vec![Lag(2), Lag(5)]);
        let back = graph.node(Direction::Egress, "keystone", "nova_api").unwrap();
        assert_eq!(back.total_edges(), 4);
        assert_eq!(graph.stats().edges, 4);

        let single = FillOptions {
            bidirectional: BidirectionalPolicy::SingleEdge,
            ..FillOptions::default()
        };
        let graph = filled(dir.path(), &single).unwrap();
        let forward = graph.node(Direction::Egress, "nova_api", "keystone").unwrap();
        assert_eq!(forward.total_edges(), 5);
        assert_eq!(forward.edges().iter().filter(|e| e.is_bidirectional).count(), 2);
    }

    #[test]
    fn test_filters() {
        let dir = snapshot(&[
            // unclustered service
            "glance_api|cpu\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "keystone|mem\tglance_api|cpu\t1\t1\t1\t1\t1",
            // excluded service
            "swift_proxy_server|cpu\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "keystone|mem\tswift_proxy_server|cpu\t1\t1\t1\t1\t1",
            // excluded metric after suffix strip
            "nova_api|rx-diff\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "keystone|mem\tnova_api|rx-diff\t1\t1\t1\t1\t1",
            // kept
            "nova_api|cpu\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "keystone|mem\tnova_api|cpu\t1\t1\t1\t1\t1",
        ]);
        let options = FillOptions {
            excluded_metrics: ["rx".to_string()].into_iter().collect(),
            ..FillOptions::default()
        };
        let graph = filled(dir.path(), &options).unwrap();
        assert_eq!(graph.services(), vec!["nova_api", "keystone"]);
        assert_eq!(graph.stats().edges, 1);
        assert_eq!(graph.stats().row_pairs, 4);

        let include = FillOptions {
            selection: ServiceSelection::Include(vec!["glance".into()]),
            ..FillOptions::default()
        };
        let graph = filled(dir.path(), &include).unwrap();
        assert!(graph.services().is_empty());
    }

    #[test]
    fn test_duplicates_and_trailing_row() {
        let dir = snapshot(&[
            "nova_api|cpu\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "nova_api|cpu\tkeystone|mem\t0.5\t1\t1\t1\t1",
            "keystone|mem\tnova_api|cpu\t1\t1\t1\t1\t1",
            "nova_api|mem\tkeystone|cpu\t0.001\t1\t1\t1\t1",
        ]);
        let graph = filled(dir.path(), &FillOptions::default()).unwrap();
        let node = graph.node(Direction::Egress, "nova_api", "keystone").unwrap();
        assert_eq!(node.total_edges(), 1);
        assert_eq!(node.edges()[0].key(), ("cpu", "mem"));
        assert_eq!(graph.stats().row_pairs, 1);
    }

    #[test]
    fn test_score_band_weights() {
        let dir = snapshot(&[
            "nova_api|cpu\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "keystone|mem\tnova_api|cpu\t1\t1\t1\t1\t1",
            "nova_api|rx\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "keystone|mem\tnova_api|rx\t1\t1\t1\t1\t1",
            "nova_api|tx\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "keystone|mem\tnova_api|tx\t1\t1\t1\t1\t1",
        ]);
        let scores_path = dir.path().join("scores.tsv");
        std::fs::write(&scores_path, "metric\tscore\ncpu\t0.9\nrx\t0.5\nmem\t0.4\n").unwrap();
        let options = FillOptions {
            score_band: Some(ScoreBand {
                lower: 0.2,
                upper: 0.8,
                scores_path,
            }),
            ..FillOptions::default()
        };
        let graph = filled(dir.path(), &options).unwrap();
        let node = graph.node(Direction::Egress, "nova_api", "keystone").unwrap();
        // rx falls in the band, tx has no score
        assert_eq!(node.total_edges(), 1);
        assert_eq!(node.total_p_score(), 0.9);
    }

    #[test]
    fn test_identifier_without_delimiter_is_error() {
        let dir = snapshot(&[
            "nova_api-cpu\tkeystone|mem\t0.001\t1\t1\t1\t1",
            "keystone|mem\tnova_api-cpu\t1\t1\t1\t1\t1",
        ]);
        assert!(matches!(
            filled(dir.path(), &FillOptions::default()),
            Err(RcaError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let graph = filled(dir.path(), &FillOptions::default()).unwrap();
        assert!(graph.services().is_empty());
        assert_eq!(graph.stats().files, 0);
    }
}
