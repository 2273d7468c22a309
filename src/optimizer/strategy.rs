//! Incremental and batch resolution strategies.

use tracing::debug;

use super::engine::SolverEngine;
use super::{Aggregator, OptimizerConfig, OptimizerState, PoseGraph, SolveReport, SolverMode};
use crate::error::AggregationError;
use crate::measurement::{Edge, WeightPolicy};
use crate::trajectory::Trajectory;

/// Re-solves the graph after every append, warm-starting from the previous
/// estimate with a short iteration budget.
#[derive(Debug, Clone)]
pub struct IncrementalSolver {
    engine: SolverEngine,
}

impl IncrementalSolver {
    pub fn new(config: OptimizerConfig, policy: WeightPolicy) -> Self {
        Self {
            engine: SolverEngine::new(config, policy),
        }
    }
}

impl Aggregator for IncrementalSolver {
    fn policy(&self) -> &WeightPolicy {
        &self.engine.policy
    }

    fn append_edges(&mut self, edges: Vec<Edge>) {
        let count = edges.len();
        if !self.engine.add_edges(edges) {
            return;
        }
        let iterations = self.engine.config.incremental_iterations;
        // Graph is non-empty after a successful add
        if let Ok(report) = self.engine.solve(iterations) {
            debug!(
                added = count,
                nodes = report.nodes,
                iterations = report.iterations(),
                "Incremental re-solve"
            );
        }
    }

    fn get_trajectory(&mut self) -> Result<Trajectory, AggregationError> {
        match self.engine.state {
            OptimizerState::Empty => Err(AggregationError::EmptyGraph),
            _ => Ok(self.engine.trajectory()),
        }
    }

    fn state(&self) -> OptimizerState {
        self.engine.state
    }

    fn graph(&self) -> &PoseGraph {
        &self.engine.graph
    }

    fn last_report(&self) -> Option<&SolveReport> {
        self.engine.last_report.as_ref()
    }
}

/// Buffers appended edges and solves once, with the full iteration budget,
/// when the trajectory is requested.
#[derive(Debug, Clone)]
pub struct BatchSolver {
    engine: SolverEngine,
}

impl BatchSolver {
    pub fn new(config: OptimizerConfig, policy: WeightPolicy) -> Self {
        Self {
            engine: SolverEngine::new(config, policy),
        }
    }
}

impl Aggregator for BatchSolver {
    fn policy(&self) -> &WeightPolicy {
        &self.engine.policy
    }

    fn append_edges(&mut self, edges: Vec<Edge>) {
        self.engine.add_edges(edges);
    }

    fn get_trajectory(&mut self) -> Result<Trajectory, AggregationError> {
        match self.engine.state {
            OptimizerState::Empty => return Err(AggregationError::EmptyGraph),
            OptimizerState::Accumulating => {
                let iterations = self.engine.config.max_iterations;
                let report = self.engine.solve(iterations)?;
                debug!(
                    nodes = report.nodes,
                    edges = report.edges,
                    iterations = report.iterations(),
                    final_cost = report.final_cost(),
                    "Batch solve"
                );
            }
            OptimizerState::Optimized => {}
        }
        Ok(self.engine.trajectory())
    }

    fn state(&self) -> OptimizerState {
        self.engine.state
    }

    fn graph(&self) -> &PoseGraph {
        &self.engine.graph
    }

    fn last_report(&self) -> Option<&SolveReport> {
        self.engine.last_report.as_ref()
    }
}

/// Strategy chosen at construction from [`OptimizerConfig::mode`].
#[derive(Debug, Clone)]
pub enum GraphOptimizer {
    Incremental(IncrementalSolver),
    Batch(BatchSolver),
}

impl GraphOptimizer {
    pub fn new(config: OptimizerConfig, policy: WeightPolicy) -> Self {
        match config.mode {
            SolverMode::Incremental => Self::Incremental(IncrementalSolver::new(config, policy)),
            SolverMode::Batch => Self::Batch(BatchSolver::new(config, policy)),
        }
    }

    pub fn mode(&self) -> SolverMode {
        match self {
            Self::Incremental(_) => SolverMode::Incremental,
            Self::Batch(_) => SolverMode::Batch,
        }
    }

    fn inner(&self) -> &dyn Aggregator {
        match self {
            Self::Incremental(solver) => solver,
            Self::Batch(solver) => solver,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Aggregator {
        match self {
            Self::Incremental(solver) => solver,
            Self::Batch(solver) => solver,
        }
    }
}

impl Aggregator for GraphOptimizer {
    fn policy(&self) -> &WeightPolicy {
        self.inner().policy()
    }

    fn append_edges(&mut self, edges: Vec<Edge>) {
        self.inner_mut().append_edges(edges);
    }

    fn get_trajectory(&mut self) -> Result<Trajectory, AggregationError> {
        self.inner_mut().get_trajectory()
    }

    fn state(&self) -> OptimizerState {
        self.inner().state()
    }

    fn graph(&self) -> &PoseGraph {
        self.inner().graph()
    }

    fn last_report(&self) -> Option<&SolveReport> {
        self.inner().last_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::measurement::RelativeMeasurement;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn step() -> SE3 {
        SE3::from_euler(&Vector3::new(0.0, 0.0, 0.2), Vector3::new(1.0, 0.0, 0.0))
    }

    fn chain(range: std::ops::Range<usize>) -> Vec<RelativeMeasurement> {
        range
            .map(|i| RelativeMeasurement::unweighted(i, i + 1, step()))
            .collect()
    }

    fn config(mode: SolverMode) -> OptimizerConfig {
        OptimizerConfig {
            mode,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn test_mode_selects_strategy() {
        let policy = WeightPolicy::default();
        let incremental = GraphOptimizer::new(config(SolverMode::Incremental), policy.clone());
        let batch = GraphOptimizer::new(config(SolverMode::Batch), policy);
        assert_eq!(incremental.mode(), SolverMode::Incremental);
        assert_eq!(batch.mode(), SolverMode::Batch);
    }

    #[test]
    fn test_batch_state_machine() {
        let mut solver = BatchSolver::new(OptimizerConfig::default(), WeightPolicy::default());
        assert_eq!(solver.state(), OptimizerState::Empty);
        assert_eq!(solver.get_trajectory(), Err(AggregationError::EmptyGraph));

        solver.append(&chain(0..3)).unwrap();
        assert_eq!(solver.state(), OptimizerState::Accumulating);
        assert!(solver.last_report().is_none());

        let trajectory = solver.get_trajectory().unwrap();
        assert_eq!(solver.state(), OptimizerState::Optimized);
        assert_eq!(trajectory.len(), 4);

        solver.append(&chain(3..4)).unwrap();
        assert_eq!(solver.state(), OptimizerState::Accumulating);
    }

    #[test]
    fn test_incremental_solves_on_append() {
        let mut solver =
            IncrementalSolver::new(config(SolverMode::Incremental), WeightPolicy::default());
        solver.append(&chain(0..3)).unwrap();
        assert_eq!(solver.state(), OptimizerState::Optimized);
        assert!(solver.last_report().is_some());

        solver.append(&chain(3..5)).unwrap();
        let report = solver.last_report().unwrap();
        assert_eq!(report.nodes, 6);
        assert!(report.components[0].warm_start);

        let trajectory = solver.get_trajectory().unwrap();
        let expected = (0..5).fold(SE3::identity(), |pose, _| pose.compose(&step()));
        assert_relative_eq!(
            trajectory.get(5).unwrap().translation,
            expected.translation,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_rejected_append_is_atomic() {
        let mut solver = BatchSolver::new(OptimizerConfig::default(), WeightPolicy::default());
        let mut rows = chain(0..3);
        rows.push(RelativeMeasurement::unweighted(4, 4, step()));

        assert!(solver.append(&rows).is_err());
        assert_eq!(solver.state(), OptimizerState::Empty);
        assert!(solver.graph().is_empty());
    }

    #[test]
    fn test_empty_append_keeps_state() {
        let mut solver = BatchSolver::new(OptimizerConfig::default(), WeightPolicy::default());
        solver.append(&chain(0..2)).unwrap();
        solver.get_trajectory().unwrap();
        solver.append(&[]).unwrap();
        assert_eq!(solver.state(), OptimizerState::Optimized);
    }
}
