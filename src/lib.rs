pub mod config;
pub mod error;
pub mod estimator;
pub mod evaluation;
pub mod geometry;
pub mod io;
pub mod keyframe;
pub mod loop_closure;
pub mod measurement;
pub mod optimizer;
pub mod slam;
pub mod trajectory;

pub use config::AggregationConfig;
pub use error::{AggregationError, ConfigError, EvaluationError, MeasurementError, ScoringError};
pub use measurement::{FrameIndex, RelativeMeasurement, WeightPolicy};
pub use optimizer::{Aggregator, GraphOptimizer, OptimizerConfig, SolverMode};
pub use trajectory::Trajectory;
