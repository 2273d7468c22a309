//! Pose graph storage and connectivity.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::measurement::{Edge, FrameIndex};

/// Frame indices plus the edges between them, in append order.
///
/// Nodes are created implicitly by the first edge that references them, so
/// every edge always connects two known nodes.
#[derive(Debug, Clone, Default)]
pub struct PoseGraph {
    nodes: BTreeSet<FrameIndex>,
    edges: Vec<Edge>,
}

impl PoseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.nodes.insert(edge.from());
        self.nodes.insert(edge.to());
        self.edges.push(edge);
    }

    /// Node indices, ascending.
    pub fn nodes(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.nodes.iter().copied()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn contains(&self, node: FrameIndex) -> bool {
        self.nodes.contains(&node)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Connected components, each sorted ascending, ordered by their lowest
    /// node. The first node of each component is its anchor.
    pub fn connected_components(&self) -> Vec<Vec<FrameIndex>> {
        let mut adjacency: HashMap<FrameIndex, Vec<FrameIndex>> = HashMap::new();
        for edge in &self.edges {
            adjacency.entry(edge.from()).or_default().push(edge.to());
            adjacency.entry(edge.to()).or_default().push(edge.from());
        }

        let mut visited = BTreeSet::new();
        let mut components = Vec::new();

        // Ascending iteration makes every BFS start at its component's anchor
        for &start in &self.nodes {
            if !visited.insert(start) {
                continue;
            }
            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                for &next in adjacency.get(&node).into_iter().flatten() {
                    if visited.insert(next) {
                        component.push(next);
                        queue.push_back(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }

        components
    }
}
