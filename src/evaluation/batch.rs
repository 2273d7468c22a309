//! Scoring many trajectories at once.
//!
//! Each trajectory is evaluated on its own rayon worker against the shared,
//! read-only ground-truth table. A failed trajectory is kept as a failure
//! entry and excluded from every aggregate; it never aborts the batch.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    average_metrics, calculate_metrics, normalize_metrics, pool_metrics, EvaluationConfig,
    GroundTruthTable, MetricsRecord, MetricsSink,
};
use crate::error::ScoringError;
use crate::trajectory::Trajectory;

/// Normalized metric a batch is scored by. Lower is better for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMetric {
    #[default]
    Ate,
    RmseT,
    RmseR,
    RpeT,
    RpeR,
}

impl ScoreMetric {
    /// Metric value of a raw record; RPE is normalized first.
    pub fn value(&self, record: &MetricsRecord) -> f64 {
        let record = normalize_metrics(record);
        match self {
            Self::Ate => record.ate,
            Self::RmseT => record.rmse_t,
            Self::RmseR => record.rmse_r,
            Self::RpeT => record.rpe_t,
            Self::RpeR => record.rpe_r,
        }
    }

    pub fn greater_is_better(&self) -> bool {
        false
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ate => "ATE",
            Self::RmseT => "RMSE_t",
            Self::RmseR => "RMSE_r",
            Self::RpeT => "RPE_t",
            Self::RpeR => "RPE_r",
        }
    }
}

/// Result for one trajectory of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryOutcome {
    pub id: String,
    /// Raw (unnormalized) metrics, or why none could be computed.
    pub result: Result<MetricsRecord, ScoringError>,
}

/// Aggregate score over the successful trajectories of a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchScore {
    /// Mean of the weighted per-trajectory scores, `None` if nothing
    /// succeeded.
    pub mean: Option<f64>,
    pub successes: usize,
    pub failures: usize,
}

/// Per-trajectory outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEvaluation {
    pub outcomes: Vec<TrajectoryOutcome>,
}

impl BatchEvaluation {
    pub fn new(outcomes: Vec<TrajectoryOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.records().count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    /// Raw records of the successful trajectories.
    pub fn records(&self) -> impl Iterator<Item = &MetricsRecord> + '_ {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &ScoringError)> + '_ {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.id.as_str(), e)))
    }

    /// Mean of `metric * weight` over the successes.
    ///
    /// `sample_weight` is indexed like `outcomes`; without it, or past its
    /// end, the weight is 1.
    pub fn score(&self, metric: ScoreMetric, sample_weight: Option<&[f64]>) -> BatchScore {
        let weighted: Vec<f64> = self
            .outcomes
            .iter()
            .enumerate()
            .filter_map(|(k, outcome)| {
                let record = outcome.result.as_ref().ok()?;
                let weight = sample_weight.and_then(|w| w.get(k)).copied().unwrap_or(1.0);
                Some(metric.value(record) * weight)
            })
            .collect();

        let successes = weighted.len();
        let mean = (successes > 0).then(|| weighted.iter().sum::<f64>() / successes as f64);
        BatchScore {
            mean,
            successes,
            failures: self.outcomes.len() - successes,
        }
    }

    /// Field-wise mean of the normalized records.
    pub fn averaged(&self) -> Option<MetricsRecord> {
        let normalized: Vec<_> = self.records().map(normalize_metrics).collect();
        average_metrics(&normalized)
    }

    /// Records pooled raw, then normalized once.
    pub fn pooled(&self) -> Option<MetricsRecord> {
        let raw: Vec<_> = self.records().copied().collect();
        pool_metrics(&raw).map(|r| normalize_metrics(&r))
    }

    /// Report the averaged metrics under `prefix`, the pooled RPE under
    /// `{prefix}pooled_`, and the failure count.
    pub fn log_to(&self, sink: &mut dyn MetricsSink, prefix: &str) {
        if let Some(averaged) = self.averaged() {
            sink.log_record(prefix, &averaged);
        }
        if let Some(pooled) = self.pooled() {
            sink.log_metric(&format!("{prefix}pooled_RPE_r"), pooled.rpe_r);
            sink.log_metric(&format!("{prefix}pooled_RPE_t"), pooled.rpe_t);
        }
        sink.log_metric(&format!("{prefix}failures"), self.failure_count() as f64);
    }
}

/// Evaluate every `(id, predicted)` pair against its reference in parallel.
pub fn evaluate_batch(
    predictions: &[(String, Trajectory)],
    ground_truth: &GroundTruthTable,
    config: &EvaluationConfig,
) -> BatchEvaluation {
    let outcomes: Vec<TrajectoryOutcome> = predictions
        .par_iter()
        .map(|(id, predicted)| {
            let result = ground_truth
                .get(id)
                .and_then(|reference| calculate_metrics(reference, predicted, config))
                .map_err(ScoringError::from);
            TrajectoryOutcome {
                id: id.clone(),
                result,
            }
        })
        .collect();

    let evaluation = BatchEvaluation::new(outcomes);
    log_summary(&evaluation);
    evaluation
}

pub(crate) fn log_summary(evaluation: &BatchEvaluation) {
    for (id, error) in evaluation.failures() {
        warn!(trajectory = id, %error, "Trajectory excluded from batch score");
    }
    info!(
        trajectories = evaluation.len(),
        successes = evaluation.success_count(),
        failures = evaluation.failure_count(),
        "Batch evaluation finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluationError;

    fn success(id: &str, ate: f64) -> TrajectoryOutcome {
        TrajectoryOutcome {
            id: id.into(),
            result: Ok(MetricsRecord {
                ate,
                ..MetricsRecord::default()
            }),
        }
    }

    fn failure(id: &str) -> TrajectoryOutcome {
        TrajectoryOutcome {
            id: id.into(),
            result: Err(EvaluationError::InsufficientOverlap {
                shared: 0,
                required: 2,
            }
            .into()),
        }
    }

    #[test]
    fn test_failures_excluded_not_zeroed() {
        let batch = BatchEvaluation::new(vec![success("a", 2.0), failure("b"), success("c", 4.0)]);
        let score = batch.score(ScoreMetric::Ate, None);

        assert_eq!(score.mean, Some(3.0));
        assert_eq!((score.successes, score.failures), (2, 1));
    }

    #[test]
    fn test_sample_weights_follow_outcome_order() {
        let batch = BatchEvaluation::new(vec![success("a", 2.0), failure("b"), success("c", 4.0)]);
        let score = batch.score(ScoreMetric::Ate, Some(&[0.5, 100.0, 2.0]));
        assert_eq!(score.mean, Some((2.0 * 0.5 + 4.0 * 2.0) / 2.0));
    }

    #[test]
    fn test_all_failed() {
        let batch = BatchEvaluation::new(vec![failure("a")]);
        let score = batch.score(ScoreMetric::RpeT, None);
        assert_eq!(score.mean, None);
        assert_eq!(score.failures, 1);
        assert!(batch.pooled().is_none());
    }

    #[test]
    fn test_rpe_score_is_normalized() {
        let outcome = TrajectoryOutcome {
            id: "a".into(),
            result: Ok(MetricsRecord {
                rpe_t: 6.0,
                rpe_divider: 3.0,
                ..MetricsRecord::default()
            }),
        };
        let batch = BatchEvaluation::new(vec![outcome]);
        assert_eq!(batch.score(ScoreMetric::RpeT, None).mean, Some(2.0));
    }
}
