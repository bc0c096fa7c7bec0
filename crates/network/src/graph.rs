//! Directed weighted graph of hardware nodes and shortest-path routing.
//!
//! Links are stored in both directions with the bandwidth (bytes/s) as the
//! edge weight. Routing is breadth-first by hop count; among equal-length
//! paths the neighbor with the lowest node id wins, which makes routes a
//! pure function of the topology.

use crate::error::{NetworkError, NetworkResult};
use indexmap::IndexMap;
use std::collections::VecDeque;
use strato_core::EntityId;
use tracing::debug;

/// Topology nodes are identified by their entity id.
pub type NodeId = EntityId;

/// The role a node plays in the topology; link admission and address
/// assignment depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Host,
    Switch,
    Router,
    Gateway,
}

/// Directed weighted graph over hardware nodes.
#[derive(Debug, Default, Clone)]
pub struct Topology {
    nodes: IndexMap<NodeId, NodeClass>,
    edges: IndexMap<NodeId, IndexMap<NodeId, f64>>,
}

impl Topology {
    pub fn new() -> Self {
        Topology::default()
    }

    /// Register a node. Re-adding an existing node is a no-op.
    pub fn add_node(&mut self, node: NodeId, class: NodeClass) {
        self.nodes.entry(node).or_insert(class);
        self.edges.entry(node).or_default();
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, node: NodeId) {
        self.nodes.shift_remove(&node);
        self.edges.shift_remove(&node);
        for neighbors in self.edges.values_mut() {
            neighbors.shift_remove(&node);
        }
    }

    /// The class a node was registered with.
    pub fn node_class(&self, node: NodeId) -> Option<NodeClass> {
        self.nodes.get(&node).copied()
    }

    /// True when the node is part of the topology.
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Registered nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, NodeClass)> + '_ {
        self.nodes.iter().map(|(&id, &class)| (id, class))
    }

    /// Insert a bidirectional link with the given weight (bandwidth in
    /// bytes/s). Host-to-host links are rejected at call time and leave the
    /// graph unchanged.
    pub fn add_link(&mut self, a: NodeId, b: NodeId, weight: f64) -> NetworkResult<()> {
        let class_a = self
            .node_class(a)
            .ok_or(NetworkError::UnknownNode { node: a })?;
        let class_b = self
            .node_class(b)
            .ok_or(NetworkError::UnknownNode { node: b })?;
        if class_a == NodeClass::Host && class_b == NodeClass::Host {
            return Err(NetworkError::HostToHostLink { a, b });
        }
        if self.has_link(a, b) {
            return Err(NetworkError::DuplicateLink { a, b });
        }
        self.edges.entry(a).or_default().insert(b, weight);
        self.edges.entry(b).or_default().insert(a, weight);
        debug!(%a, %b, weight, "link added");
        Ok(())
    }

    /// Remove both directions of a link.
    pub fn remove_link(&mut self, a: NodeId, b: NodeId) {
        if let Some(neighbors) = self.edges.get_mut(&a) {
            neighbors.shift_remove(&b);
        }
        if let Some(neighbors) = self.edges.get_mut(&b) {
            neighbors.shift_remove(&a);
        }
    }

    /// True when a direct edge from `a` to `b` exists.
    pub fn has_link(&self, a: NodeId, b: NodeId) -> bool {
        self.edges
            .get(&a)
            .map_or(false, |neighbors| neighbors.contains_key(&b))
    }

    /// Neighbors of a node in ascending id order.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .edges
            .get(&node)
            .map(|neighbors| neighbors.keys().copied().collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// Number of links (counting each direction once).
    pub fn link_count(&self) -> usize {
        self.edges.values().map(|n| n.len()).sum::<usize>() / 2
    }

    /// Shortest path by hop count from `src` to `dst`, both inclusive.
    /// Among equal-length paths the lowest-id predecessor wins. A route to
    /// self is the single-element path.
    pub fn route(&self, src: NodeId, dst: NodeId) -> NetworkResult<Vec<NodeId>> {
        if !self.contains(src) {
            return Err(NetworkError::UnknownNode { node: src });
        }
        if !self.contains(dst) {
            return Err(NetworkError::UnknownNode { node: dst });
        }
        if src == dst {
            return Ok(vec![src]);
        }
        let mut parents: IndexMap<NodeId, NodeId> = IndexMap::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(src);
        parents.insert(src, src);
        while let Some(current) = frontier.pop_front() {
            for neighbor in self.neighbors(current) {
                if parents.contains_key(&neighbor) {
                    continue;
                }
                parents.insert(neighbor, current);
                if neighbor == dst {
                    let mut path = vec![dst];
                    let mut cursor = dst;
                    while cursor != src {
                        cursor = parents[&cursor];
                        path.push(cursor);
                    }
                    path.reverse();
                    return Ok(path);
                }
                frontier.push_back(neighbor);
            }
        }
        Err(NetworkError::NoRoute { src, dst })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> NodeId {
        EntityId::from_raw(raw)
    }

    fn star() -> Topology {
        // Hosts 1..=3 around switch 10.
        let mut topology = Topology::new();
        topology.add_node(id(10), NodeClass::Switch);
        for raw in 1..=3 {
            topology.add_node(id(raw), NodeClass::Host);
            topology.add_link(id(raw), id(10), 1e6).unwrap();
        }
        topology
    }

    #[test]
    fn test_host_to_host_rejected() {
        let mut topology = star();
        let links_before = topology.link_count();
        let err = topology.add_link(id(1), id(2), 1e6).unwrap_err();
        assert!(matches!(err, NetworkError::HostToHostLink { .. }));
        assert_eq!(topology.link_count(), links_before);
        assert!(!topology.has_link(id(1), id(2)));
    }

    #[test]
    fn test_route_through_switch() {
        let topology = star();
        let path = topology.route(id(1), id(3)).unwrap();
        assert_eq!(path, vec![id(1), id(10), id(3)]);
    }

    #[test]
    fn test_route_to_self() {
        let topology = star();
        assert_eq!(topology.route(id(2), id(2)).unwrap(), vec![id(2)]);
    }

    #[test]
    fn test_no_route() {
        let mut topology = star();
        topology.add_node(id(99), NodeClass::Host);
        let err = topology.route(id(1), id(99)).unwrap_err();
        assert!(matches!(err, NetworkError::NoRoute { .. }));
    }

    #[test]
    fn test_unknown_node() {
        let mut topology = star();
        assert!(matches!(
            topology.add_link(id(1), id(77), 1.0),
            Err(NetworkError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_duplicate_link_rejected() {
        let mut topology = star();
        assert!(matches!(
            topology.add_link(id(1), id(10), 1e6),
            Err(NetworkError::DuplicateLink { .. })
        ));
    }

    #[test]
    fn test_tie_break_picks_lowest_id() {
        // Two switches between host 1 and host 2; the route must go through
        // the lower-id switch.
        let mut topology = Topology::new();
        topology.add_node(id(1), NodeClass::Host);
        topology.add_node(id(2), NodeClass::Host);
        topology.add_node(id(20), NodeClass::Switch);
        topology.add_node(id(30), NodeClass::Switch);
        for s in [id(30), id(20)] {
            topology.add_link(id(1), s, 1e6).unwrap();
            topology.add_link(s, id(2), 1e6).unwrap();
        }
        let path = topology.route(id(1), id(2)).unwrap();
        assert_eq!(path, vec![id(1), id(20), id(2)]);
    }

    #[test]
    fn test_remove_link() {
        let mut topology = star();
        topology.remove_link(id(1), id(10));
        assert!(!topology.has_link(id(1), id(10)));
        assert!(matches!(
            topology.route(id(1), id(3)),
            Err(NetworkError::NoRoute { .. })
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn routes_are_simple_paths(host_count in 2u64..12) {
                // A star of hosts around one switch: every host pair routes
                // through the switch with no repeated hops.
                let mut topology = Topology::new();
                let switch = id(1000);
                topology.add_node(switch, NodeClass::Switch);
                for raw in 0..host_count {
                    topology.add_node(id(raw), NodeClass::Host);
                    topology.add_link(id(raw), switch, 1e6).unwrap();
                }
                for a in 0..host_count {
                    for b in 0..host_count {
                        let path = topology.route(id(a), id(b)).unwrap();
                        prop_assert_eq!(path.first(), Some(&id(a)));
                        prop_assert_eq!(path.last(), Some(&id(b)));
                        let mut seen = std::collections::HashSet::new();
                        for hop in &path {
                            prop_assert!(seen.insert(*hop));
                        }
                    }
                }
            }
        }
    }
}
