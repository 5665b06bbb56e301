//! A graph of [`Node`]s plus the symmetric adjacency their `links` imply.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Error;
use crate::keys::validate_name;
use crate::node::Node;

/// Mapping from node name to [`Node`], iterated in lexicographic order so
/// replays are bit-identical.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    nodes: BTreeMap<String, Node>,
}

impl Topology {
    pub fn new() -> Topology {
        Topology { nodes: BTreeMap::new() }
    }

    /// Inserts a freshly declared node. Fails on a duplicate name.
    pub fn insert_node(&mut self, node: Node) -> Result<(), Error> {
        if self.nodes.contains_key(&node.name) {
            return Err(Error::DuplicateNode(node.name));
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// Declares a bidirectional link between two already-declared nodes.
    pub fn add_link(&mut self, a: &str, b: &str) -> Result<(), Error> {
        validate_name(a)?;
        validate_name(b)?;
        if a == b {
            return Err(Error::SelfLink(a.to_string()));
        }
        if !self.nodes.contains_key(a) {
            return Err(Error::UnknownNode(a.to_string()));
        }
        if !self.nodes.contains_key(b) {
            return Err(Error::UnknownNode(b.to_string()));
        }
        self.nodes.get_mut(a).unwrap().links.insert(b.to_string());
        self.nodes.get_mut(b).unwrap().links.insert(a.to_string());
        Ok(())
    }

    /// Validates that every declared link is mutual. Construction via
    /// [`Topology::add_link`] always keeps this true; this is for
    /// topologies assembled by hand (e.g. in tests).
    pub fn validate(&self) -> Result<(), Error> {
        for (name, node) in &self.nodes {
            for neighbor in &node.links {
                let back = self.nodes.get(neighbor).ok_or_else(|| Error::UnknownNode(neighbor.clone()))?;
                if !back.links.contains(name) {
                    return Err(Error::AsymmetricLink(name.clone(), neighbor.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    /// Deterministic, lexicographic iteration over node names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Node)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Neighbors of a given node, or an empty set if unknown.
    pub fn neighbors(&self, name: &str) -> BTreeSet<String> {
        self.nodes.get(name).map(|n| n.links.clone()).unwrap_or_default()
    }

    /// `true` if at least one node still has battery left.
    pub fn any_alive(&self) -> bool {
        self.nodes.values().any(Node::is_alive)
    }

    pub fn mean_battery(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        self.nodes.values().map(|n| n.battery).sum::<f64>() / self.nodes.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology_with_line() -> Topology {
        let mut t = Topology::new();
        t.insert_node(Node::new("A", (0, 0), 1.0).unwrap()).unwrap();
        t.insert_node(Node::new("B", (1, 0), 1.0).unwrap()).unwrap();
        t.insert_node(Node::new("C", (2, 0), 1.0).unwrap()).unwrap();
        t.add_link("A", "B").unwrap();
        t.add_link("B", "C").unwrap();
        t
    }

    #[test]
    fn links_are_symmetric() {
        let t = topology_with_line();
        assert!(t.neighbors("A").contains("B"));
        assert!(t.neighbors("B").contains("A"));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut t = Topology::new();
        t.insert_node(Node::new("A", (0, 0), 1.0).unwrap()).unwrap();
        let err = t.insert_node(Node::new("A", (1, 1), 0.5).unwrap());
        assert!(matches!(err, Err(Error::DuplicateNode(_))));
    }

    #[test]
    fn link_to_unknown_node_rejected() {
        let mut t = Topology::new();
        t.insert_node(Node::new("A", (0, 0), 1.0).unwrap()).unwrap();
        assert!(matches!(t.add_link("A", "Z"), Err(Error::UnknownNode(_))));
    }

    #[test]
    fn self_link_rejected() {
        let mut t = Topology::new();
        t.insert_node(Node::new("A", (0, 0), 1.0).unwrap()).unwrap();
        assert!(matches!(t.add_link("A", "A"), Err(Error::SelfLink(_))));
    }

    #[test]
    fn reserved_separator_rejected_in_name() {
        assert!(Node::new("a_b", (0, 0), 1.0).is_err());
    }

    #[test]
    fn mean_battery_averages_all_nodes() {
        let t = topology_with_line();
        assert_eq!(t.mean_battery(), 1.0);
    }
}
