//! Hand-authored edge lists.
//!
//! Each line reads `svc.metric OP svc.metric|lag[,lag...]` where `OP` is
//! `>` (left causes right), `<` (right causes left) or `<>` (both, recorded
//! once with the left side as perpetrator and the bidirectional flag set).

use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{RcaError, RcaResult};
use crate::graph::Graph;
use crate::models::Lag;

pub const GRAPH_A: &[&str] = &[
    "a.m11 < b.m13|1.0",
    "a.m10 > b.m12|1.0",
    "a.m1 > b.m2|1.0",
    "a.m1 < b.m2|1.0",
    "a.m4 > c.m1|1.0",
    "a.m5 > c.m2|1.0",
    "a.m6 < d.m3|1.0,2.0",
    "a.m9 < d.m7|1.0",
    "a.m3 < d.m8|1.0,2.0",
    "a.m3 <> d.m10|1.0",
];

pub const GRAPH_B: &[&str] = &[
    "a.m15 < b.m16|1.0",
    "a.m13 > b.m14|1.0",
    "a.m1 > b.m2|2.0",
    "a.m1 < b.m2|1.0,2.0",
    "a.m1 < b.m5|1.0",
    "a.m4 > e.m1|1.0",
    "a.m5 > e.m2|1.0",
    "a.m6 < d.m3|1.0",
    "a.m9 < d.m7|1.0",
];

static EDGE_SPEC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^.\s]+)\.(\S+)\s+(<>|<|>)\s+([^.\s]+)\.([^|\s]+)\|\s*(\S+)\s*$").unwrap()
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecOp {
    Forward,
    Backward,
    Both,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EdgeSpec {
    pub left: (String, String),
    pub op: SpecOp,
    pub right: (String, String),
    pub lags: Vec<Lag>,
}

impl EdgeSpec {
    pub fn parse(line: &str) -> RcaResult<Self> {
        let caps = EDGE_SPEC_RE
            .captures(line)
            .ok_or_else(|| RcaError::Parse(format!("malformed edge spec: {line:?}")))?;
        let op = match &caps[3] {
            ">" => SpecOp::Forward,
            "<" => SpecOp::Backward,
            _ => SpecOp::Both,
        };
        let lags = caps[6]
            .split(',')
            .map(Lag::parse)
            .collect::<RcaResult<Vec<_>>>()?;
        Ok(Self {
            left: (caps[1].to_string(), caps[2].to_string()),
            op,
            right: (caps[4].to_string(), caps[5].to_string()),
            lags,
        })
    }

    /// Perpetrator and consequence endpoints.
    pub fn endpoints(&self) -> (&(String, String), &(String, String)) {
        match self.op {
            SpecOp::Forward | SpecOp::Both => (&self.left, &self.right),
            SpecOp::Backward => (&self.right, &self.left),
        }
    }
}

impl Graph {
    /// Build an unweighted graph from edge-spec lines.
    pub fn from_spec_lines<S: AsRef<str>>(lines: &[S]) -> RcaResult<Graph> {
        let mut graph = Graph::new();
        for line in lines {
            let spec = EdgeSpec::parse(line.as_ref())?;
            let ((p_service, p_metric), (c_service, c_metric)) = spec.endpoints();
            graph.add_edge(
                p_service,
                p_metric,
                1.0,
                c_service,
                c_metric,
                spec.lags.clone(),
                spec.op == SpecOp::Both,
            );
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Direction;

    #[test]
    fn test_parse_directions() {
        let spec = EdgeSpec::parse("a.m6 < d.m3|1.0,2.0").unwrap();
        assert_eq!(spec.op, SpecOp::Backward);
        assert_eq!(spec.lags, vec![Lag(1), Lag(2)]);
        let (p, c) = spec.endpoints();
        assert_eq!(p, &("d".to_string(), "m3".to_string()));
        assert_eq!(c, &("a".to_string(), "m6".to_string()));

        assert_eq!(EdgeSpec::parse("a.m3 <> d.m10|1.0").unwrap().op, SpecOp::Both);
        assert_eq!(EdgeSpec::parse("a.m1 > b.m2|2").unwrap().op, SpecOp::Forward);
    }

    #[test]
    fn test_malformed_lines_rejected() {
        for line in ["a.m1 >> b.m2|1.0", "a.m1 > b.m2", "am1 > b.m2|1.0", "a.m1 > b.m2|0.5"] {
            assert!(
                matches!(EdgeSpec::parse(line), Err(RcaError::Parse(_))),
                "{line} should be rejected"
            );
        }
    }

    #[test]
    fn test_fixture_graphs_build() {
        let a = Graph::from_spec_lines(GRAPH_A).unwrap();
        let node = a.node(Direction::Egress, "a", "b").unwrap();
        assert_eq!(node.total_edges(), 2);
        let back = a.node(Direction::Egress, "b", "a").unwrap();
        assert_eq!(back.total_edges(), 2);
        let bidir = a.node(Direction::Egress, "a", "d").unwrap();
        assert_eq!(bidir.total_edges(), 1);
        assert!(bidir.edges()[0].is_bidirectional);

        let b = Graph::from_spec_lines(GRAPH_B).unwrap();
        assert!(b.node(Direction::Egress, "a", "e").is_some());
        assert!(b.node(Direction::Egress, "a", "c").is_none());
    }
}
