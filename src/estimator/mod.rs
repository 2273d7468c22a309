//! Estimator interface for parameter-search drivers.
//!
//! A search driver configures an estimator with candidate parameters, then
//! asks it to optimize and score a batch of measurement sets. Each set is
//! optimized by its own [`GraphOptimizer`] on a rayon worker.

use rayon::prelude::*;
use tracing::info;

use crate::config::AggregationConfig;
use crate::error::{AggregationError, ConfigError, ScoringError};
use crate::evaluation::{
    calculate_metrics, log_summary, BatchEvaluation, BatchScore, GroundTruthTable, MetricsSink,
    TrajectoryOutcome,
};
use crate::measurement::RelativeMeasurement;
use crate::optimizer::{Aggregator, GraphOptimizer};
use crate::trajectory::Trajectory;

pub use crate::evaluation::ScoreMetric;

/// Measurements of one trajectory, keyed by its ground-truth identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementSet {
    pub id: String,
    pub measurements: Vec<RelativeMeasurement>,
}

impl MeasurementSet {
    pub fn new(id: impl Into<String>, measurements: Vec<RelativeMeasurement>) -> Self {
        Self {
            id: id.into(),
            measurements,
        }
    }
}

/// Explicit contract between the aggregation core and a search driver.
pub trait TrajectoryEstimator {
    type Params;

    /// Replace the current parameters. Invalid parameters leave the
    /// estimator unchanged.
    fn configure(&mut self, params: Self::Params) -> Result<(), ConfigError>;

    /// One optimized trajectory (or error) per set, in input order.
    fn optimize_batch(
        &self,
        sets: &[MeasurementSet],
    ) -> Vec<(String, Result<Trajectory, AggregationError>)>;

    /// Optimize and evaluate every set against its reference.
    fn evaluate_batch(
        &self,
        sets: &[MeasurementSet],
        ground_truth: &GroundTruthTable,
        sink: Option<&mut dyn MetricsSink>,
    ) -> BatchEvaluation;

    /// Metric used by [`TrajectoryEstimator::score_batch`].
    fn score_metric(&self) -> ScoreMetric;

    /// Weighted mean score over the sets that could be evaluated.
    fn score_batch(
        &self,
        sets: &[MeasurementSet],
        ground_truth: &GroundTruthTable,
        sample_weight: Option<&[f64]>,
    ) -> BatchScore {
        self.evaluate_batch(sets, ground_truth, None)
            .score(self.score_metric(), sample_weight)
    }
}

/// Pose-graph estimator: one optimizer per measurement set.
#[derive(Debug, Clone, Default)]
pub struct GraphEstimator {
    config: AggregationConfig,
}

impl GraphEstimator {
    pub fn new(config: AggregationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    fn optimize(&self, set: &MeasurementSet) -> Result<Trajectory, AggregationError> {
        let mut optimizer =
            GraphOptimizer::new(self.config.optimizer.clone(), self.config.weights.clone());
        optimizer.append(&set.measurements)?;
        optimizer.get_trajectory()
    }
}

impl TrajectoryEstimator for GraphEstimator {
    type Params = AggregationConfig;

    fn configure(&mut self, params: AggregationConfig) -> Result<(), ConfigError> {
        params.validate()?;
        self.config = params;
        Ok(())
    }

    fn optimize_batch(
        &self,
        sets: &[MeasurementSet],
    ) -> Vec<(String, Result<Trajectory, AggregationError>)> {
        sets.par_iter()
            .map(|set| (set.id.clone(), self.optimize(set)))
            .collect()
    }

    fn evaluate_batch(
        &self,
        sets: &[MeasurementSet],
        ground_truth: &GroundTruthTable,
        sink: Option<&mut dyn MetricsSink>,
    ) -> BatchEvaluation {
        let evaluation_config = &self.config.evaluation;
        let outcomes: Vec<TrajectoryOutcome> = sets
            .par_iter()
            .map(|set| {
                let result = ground_truth
                    .get(&set.id)
                    .map_err(ScoringError::from)
                    .and_then(|reference| {
                        let predicted = self.optimize(set)?;
                        Ok(calculate_metrics(reference, &predicted, evaluation_config)?)
                    });
                TrajectoryOutcome {
                    id: set.id.clone(),
                    result,
                }
            })
            .collect();

        let evaluation = BatchEvaluation::new(outcomes);
        log_summary(&evaluation);

        if let Some(sink) = sink {
            evaluation.log_to(sink, "");
            let score = evaluation.score(self.score_metric(), None);
            if let Some(mean) = score.mean {
                info!(metric = self.score_metric().name(), mean, "Batch score");
            }
        }
        evaluation
    }

    fn score_metric(&self) -> ScoreMetric {
        self.config.score_metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;
    use crate::geometry::SE3;
    use crate::measurement::WeightPolicy;
    use nalgebra::Vector3;

    fn chain(n: usize) -> Vec<RelativeMeasurement> {
        let step = SE3::from_euler(&Vector3::new(0.0, 0.0, 0.1), Vector3::new(1.0, 0.0, 0.0));
        (0..n)
            .map(|i| RelativeMeasurement::unweighted(i, i + 1, step))
            .collect()
    }

    #[test]
    fn test_configure_rejects_invalid_params() {
        let mut estimator = GraphEstimator::default();
        let mut params = AggregationConfig::default();
        params.weights = WeightPolicy {
            coef_loop: f64::NAN,
            ..WeightPolicy::default()
        };

        assert!(estimator.configure(params).is_err());
        assert_eq!(estimator.config(), &AggregationConfig::default());
    }

    #[test]
    fn test_optimize_batch_preserves_order() {
        let estimator = GraphEstimator::default();
        let sets = vec![
            MeasurementSet::new("a", chain(3)),
            MeasurementSet::new("empty", Vec::new()),
            MeasurementSet::new("b", chain(5)),
        ];

        let results = estimator.optimize_batch(&sets);
        let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "empty", "b"]);
        assert_eq!(results[0].1.as_ref().map(|t| t.len()), Ok(4));
        assert_eq!(results[1].1, Err(AggregationError::EmptyGraph));
    }

    #[test]
    fn test_evaluate_batch_isolates_failures() {
        let estimator = GraphEstimator::default();
        let ground_truth = GroundTruthTable::from_measurements([("a", chain(6))]);
        let sets = vec![
            MeasurementSet::new("a", chain(6)),
            MeasurementSet::new("unknown", chain(6)),
        ];

        let evaluation = estimator.evaluate_batch(&sets, &ground_truth, None);
        assert_eq!(evaluation.success_count(), 1);
        assert_eq!(
            evaluation.outcomes[1].result,
            Err(ScoringError::Evaluation(EvaluationError::UnknownTrajectory(
                "unknown".into()
            )))
        );

        let score = estimator.score_batch(&sets, &ground_truth, None);
        assert_eq!(score.failures, 1);
        assert!(score.mean.unwrap() < 1e-9);
    }
}
