//! Error types.
//!
//! Disconnected graphs and non-convergence are not errors; they are reported
//! through [`crate::optimizer::SolveReport`].

use thiserror::Error;

use crate::measurement::FrameIndex;

/// A measurement that cannot become a graph edge.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("measurement {from} -> {to} has a zero index gap")]
    ZeroIndexGap { from: FrameIndex, to: FrameIndex },

    #[error("measurement {from} -> {to} contains non-finite values")]
    NonFinite { from: FrameIndex, to: FrameIndex },
}

/// Errors raised by the graph optimizer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("invalid measurement: {0}")]
    InvalidMeasurement(#[from] MeasurementError),

    #[error("pose graph is empty, nothing to optimize")]
    EmptyGraph,
}

/// Errors raised while scoring one trajectory against its reference.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("trajectories share {shared} indices, at least {required} are required")]
    InsufficientOverlap { shared: usize, required: usize },

    #[error("alignment of the trajectories is degenerate")]
    DegenerateAlignment,

    #[error("no ground truth for trajectory '{0}'")]
    UnknownTrajectory(String),
}

/// Why a single trajectory in a batch produced no score.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
}

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
