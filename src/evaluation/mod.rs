//! Trajectory evaluation against ground truth.
//!
//! [`calculate_metrics`] scores one predicted trajectory. Batches of
//! trajectories go through [`evaluate_batch`], which isolates per-trajectory
//! failures and exposes both pooled and averaged aggregates.

mod batch;
mod ground_truth;
mod metrics;
mod sink;

pub use batch::{evaluate_batch, BatchEvaluation, BatchScore, ScoreMetric, TrajectoryOutcome};
pub use ground_truth::GroundTruthTable;
pub use metrics::{
    average_metrics, calculate_metrics, normalize_metrics, pool_metrics, AlignmentMode,
    EvaluationConfig, MetricsRecord, RpeIndices, MIN_SHARED_INDICES,
};
pub use sink::{MetricsSink, RecordingSink, TracingSink};

pub(crate) use batch::log_summary;
