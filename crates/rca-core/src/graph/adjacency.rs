//! Direction-indexed adjacency: base service -> adjacent service -> node.

use indexmap::IndexMap;
use serde::Serialize;

use crate::graph::edge::ServiceNode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Keyed by consequence service; nodes name perpetrators.
    Ingress,
    /// Keyed by perpetrator service; nodes name consequences.
    Egress,
}

/// At most one [`ServiceNode`] per adjacent service within a base service.
/// Both levels iterate in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Adjacency {
    nodes: IndexMap<String, IndexMap<String, ServiceNode>>,
}

impl Adjacency {
    pub(crate) fn node_entry(&mut self, service: &str, adjacent: &str) -> &mut ServiceNode {
        self.nodes
            .entry(service.to_string())
            .or_default()
            .entry(adjacent.to_string())
            .or_insert_with(|| ServiceNode::new(adjacent))
    }

    pub fn node(&self, service: &str, adjacent: &str) -> Option<&ServiceNode> {
        self.nodes.get(service)?.get(adjacent)
    }

    pub fn nodes(&self, service: &str) -> impl Iterator<Item = &ServiceNode> {
        self.nodes.get(service).into_iter().flat_map(|m| m.values())
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.nodes.contains_key(service)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
