//! Pose-graph aggregation.
//!
//! Fuses weighted relative-pose edges into one globally consistent
//! trajectory. Two strategies share the same graph building and solver:
//! - [`IncrementalSolver`]: re-solves after every append with a short,
//!   warm-started run
//! - [`BatchSolver`]: buffers appends and solves once when the trajectory
//!   is requested
//!
//! Disconnected graphs are solved per connected component, each anchored at
//! its lowest frame index. Neither disconnection nor an exhausted iteration
//! budget is an error; both are flagged on [`SolveReport`].

mod engine;
mod graph;
mod solver;
mod strategy;

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, ConfigError};
use crate::measurement::{Edge, RelativeMeasurement, WeightPolicy};
use crate::trajectory::Trajectory;

pub use graph::PoseGraph;
pub use solver::{ComponentReport, SolveReport};
pub use strategy::{BatchSolver, GraphOptimizer, IncrementalSolver};

/// Which strategy resolves the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverMode {
    /// Solve after every append.
    #[serde(alias = "online")]
    Incremental,
    /// Solve when the trajectory is requested.
    #[default]
    Batch,
}

/// Optimizer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Iteration budget of a batch solve.
    pub max_iterations: usize,

    /// Iteration budget of each incremental re-solve.
    pub incremental_iterations: usize,

    /// Converged when an accepted step lowers the cost by less than this
    /// fraction.
    pub cost_tolerance: f64,

    /// Converged when the step norm falls below this, relative to the state.
    pub step_tolerance: f64,

    /// Converged when the largest gradient entry falls below this.
    pub gradient_tolerance: f64,

    pub mode: SolverMode,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            incremental_iterations: 10,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-10,
            gradient_tolerance: 1e-10,
            mode: SolverMode::Batch,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be > 0".into()));
        }
        if self.incremental_iterations == 0 {
            return Err(ConfigError::Invalid(
                "incremental_iterations must be > 0".into(),
            ));
        }
        for (name, value) in [
            ("cost_tolerance", self.cost_tolerance),
            ("step_tolerance", self.step_tolerance),
            ("gradient_tolerance", self.gradient_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Lifecycle of an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerState {
    /// No edges yet.
    Empty,
    /// Edges appended since the last solve.
    Accumulating,
    /// The estimate reflects every appended edge.
    Optimized,
}

/// Builds a pose graph from edges and produces the optimized trajectory.
///
/// A single instance is not meant to be shared between threads while
/// mutating; independent trajectories use independent instances.
pub trait Aggregator {
    /// Weighting applied by [`Aggregator::append`].
    fn policy(&self) -> &WeightPolicy;

    /// Add already-weighted edges.
    fn append_edges(&mut self, edges: Vec<Edge>);

    /// Weight and add raw measurements.
    ///
    /// Either every measurement is added or, if any is malformed, none is.
    fn append(&mut self, measurements: &[RelativeMeasurement]) -> Result<(), AggregationError> {
        let policy = self.policy();
        let edges = measurements
            .iter()
            .map(|m| Edge::new(m, policy))
            .collect::<Result<Vec<_>, _>>()?;
        self.append_edges(edges);
        Ok(())
    }

    /// Current best estimate, one pose per node, ordered by index.
    ///
    /// Solves first if edges were appended since the last solve.
    fn get_trajectory(&mut self) -> Result<Trajectory, AggregationError>;

    fn state(&self) -> OptimizerState;

    fn graph(&self) -> &PoseGraph;

    /// Report of the most recent solve, if any.
    fn last_report(&self) -> Option<&SolveReport>;
}
