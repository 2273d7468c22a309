//! Graph state and the solve pass shared by both strategies.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use super::graph::PoseGraph;
use super::solver::{initial_guess, solve_component, ComponentReport, SolveReport};
use super::{OptimizerConfig, OptimizerState};
use crate::error::AggregationError;
use crate::geometry::SE3;
use crate::measurement::{Edge, FrameIndex, WeightPolicy};
use crate::trajectory::Trajectory;

#[derive(Debug, Clone)]
pub(crate) struct SolverEngine {
    pub(crate) config: OptimizerConfig,
    pub(crate) policy: WeightPolicy,
    pub(crate) graph: PoseGraph,
    pub(crate) state: OptimizerState,
    pub(crate) last_report: Option<SolveReport>,
    /// Pose estimate of every node covered by the last solve.
    estimate: BTreeMap<FrameIndex, SE3>,
    /// Node -> position of its component in the last solve.
    solved_component: HashMap<FrameIndex, usize>,
}

impl SolverEngine {
    pub(crate) fn new(config: OptimizerConfig, policy: WeightPolicy) -> Self {
        Self {
            config,
            policy,
            graph: PoseGraph::new(),
            state: OptimizerState::Empty,
            last_report: None,
            estimate: BTreeMap::new(),
            solved_component: HashMap::new(),
        }
    }

    /// Add edges and mark the estimate stale. Returns whether anything was
    /// added.
    pub(crate) fn add_edges(&mut self, edges: Vec<Edge>) -> bool {
        if edges.is_empty() {
            return false;
        }
        for edge in edges {
            self.graph.add_edge(edge);
        }
        self.state = OptimizerState::Accumulating;
        true
    }

    /// Warm start is only valid when the anchor already has a pose and every
    /// previously solved node of the component shares one reference frame,
    /// i.e. came from the same previous component.
    fn warm_seed(&self, component: &[FrameIndex]) -> Option<HashMap<FrameIndex, SE3>> {
        let anchor = component.first()?;
        self.estimate.get(anchor)?;
        let previous = self.solved_component.get(anchor)?;

        let mut seed = HashMap::new();
        for node in component {
            if let Some(pose) = self.estimate.get(node) {
                if self.solved_component.get(node) != Some(previous) {
                    return None;
                }
                seed.insert(*node, *pose);
            }
        }
        Some(seed)
    }

    /// Solve every connected component with at most `max_iterations` LM
    /// iterations each.
    pub(crate) fn solve(&mut self, max_iterations: usize) -> Result<&SolveReport, AggregationError> {
        if self.graph.is_empty() {
            return Err(AggregationError::EmptyGraph);
        }

        let components = self.graph.connected_components();
        let mut edges_by_component: Vec<Vec<&Edge>> = vec![Vec::new(); components.len()];
        let component_of: HashMap<FrameIndex, usize> = components
            .iter()
            .enumerate()
            .flat_map(|(c, nodes)| nodes.iter().map(move |&n| (n, c)))
            .collect();
        for edge in self.graph.edges() {
            if let Some(&c) = component_of.get(&edge.from()) {
                edges_by_component[c].push(edge);
            }
        }

        let mut estimate = BTreeMap::new();
        let mut reports = Vec::with_capacity(components.len());

        for (nodes, edges) in components.iter().zip(&edges_by_component) {
            let anchor = nodes[0];
            let (seed, warm_start) = match self.warm_seed(nodes) {
                Some(seed) => (seed, true),
                None => (HashMap::from([(anchor, SE3::identity())]), false),
            };

            let mut poses = initial_guess(nodes, edges, seed);
            let outcome = solve_component(nodes, edges, &mut poses, max_iterations, &self.config);

            debug!(
                anchor,
                nodes = nodes.len(),
                edges = edges.len(),
                warm_start,
                iterations = outcome.iterations,
                initial_cost = outcome.initial_cost,
                final_cost = outcome.final_cost,
                "Solved pose graph component"
            );
            if !outcome.converged {
                warn!(
                    anchor,
                    iterations = outcome.iterations,
                    final_cost = outcome.final_cost,
                    "Pose graph component did not converge, returning best estimate"
                );
            }

            estimate.extend(nodes.iter().copied().zip(poses));
            reports.push(ComponentReport {
                anchor,
                nodes: nodes.len(),
                edges: edges.len(),
                iterations: outcome.iterations,
                initial_cost: outcome.initial_cost,
                final_cost: outcome.final_cost,
                converged: outcome.converged,
                warm_start,
            });
        }

        if reports.len() > 1 {
            let anchors: Vec<FrameIndex> = reports.iter().map(|r| r.anchor).collect();
            warn!(
                components = reports.len(),
                ?anchors,
                "Pose graph is disconnected, each component anchored independently"
            );
        }

        self.estimate = estimate;
        self.solved_component = component_of;
        self.state = OptimizerState::Optimized;
        Ok(&*self.last_report.insert(SolveReport {
            components: reports,
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
        }))
    }

    pub(crate) fn trajectory(&self) -> Trajectory {
        self.estimate.iter().map(|(&i, &p)| (i, p)).collect()
    }
}
