//! Batch evaluation and scoring across several trajectories.
//!
//! Run with: `cargo test --test evaluation`

mod common;

use nalgebra::Vector3;
use pose_graph_eval::config::AggregationConfig;
use pose_graph_eval::error::{EvaluationError, ScoringError};
use pose_graph_eval::estimator::{GraphEstimator, MeasurementSet, TrajectoryEstimator};
use pose_graph_eval::evaluation::{
    calculate_metrics, evaluate_batch, EvaluationConfig, GroundTruthTable, RecordingSink,
    ScoreMetric,
};
use pose_graph_eval::geometry::SE3;
use pose_graph_eval::io;
use pose_graph_eval::trajectory::Trajectory;

/// Reference shifted by a world-frame offset growing `rate` per frame, so
/// every consecutive pair carries a translation error of exactly `rate`.
fn drifted(reference: &Trajectory, rate: f64) -> Trajectory {
    reference
        .iter()
        .map(|(i, pose)| {
            let offset = SE3::from_euler(&Vector3::zeros(), Vector3::new(0.0, rate * i as f64, 0.0));
            (i, offset.compose(pose))
        })
        .collect()
}

#[test]
fn test_pooled_rpe_weights_trajectories_by_pairs() {
    let short = common::ground_truth(5);
    let long = common::ground_truth(40);
    let mut gt = GroundTruthTable::new();
    gt.insert("short", short.clone());
    gt.insert("long", long.clone());

    let predictions = vec![
        ("short".to_string(), drifted(&short, 0.1)),
        ("long".to_string(), long.clone()),
    ];
    let evaluation = evaluate_batch(&predictions, &gt, &EvaluationConfig::default());
    assert_eq!(evaluation.success_count(), 2);

    let averaged = evaluation.averaged().unwrap();
    let pooled = evaluation.pooled().unwrap();
    // 4 erroneous pairs out of 4 + 39
    assert!((averaged.rpe_t - 0.01 / 2.0).abs() < 1e-9, "{}", averaged.rpe_t);
    assert!((pooled.rpe_t - 0.04 / 43.0).abs() < 1e-9, "{}", pooled.rpe_t);
    assert_eq!(pooled.rpe_divider, 1.0);
}

#[test]
fn test_insufficient_overlap_is_reported() {
    let reference = common::ground_truth(10);
    let predicted: Trajectory = [(9, SE3::identity()), (20, SE3::identity())]
        .into_iter()
        .collect();

    assert_eq!(
        calculate_metrics(&reference, &predicted, &EvaluationConfig::default()),
        Err(EvaluationError::InsufficientOverlap {
            shared: 1,
            required: 2
        })
    );
}

#[test]
fn test_failures_do_not_abort_the_batch() {
    let reference = common::ground_truth(12);
    let gt = GroundTruthTable::from_measurements([
        ("seq", common::stride(&reference, 1)),
        ("tiny", common::stride(&reference, 1)),
    ]);
    let predictions = vec![
        ("seq".to_string(), drifted(&reference, 0.01)),
        ("missing".to_string(), reference.clone()),
        ("tiny".to_string(), [(0, SE3::identity())].into_iter().collect()),
    ];

    let evaluation = evaluate_batch(&predictions, &gt, &EvaluationConfig::default());
    assert_eq!(evaluation.len(), 3);
    assert_eq!(evaluation.success_count(), 1);
    assert!(matches!(
        evaluation.outcomes[1].result,
        Err(ScoringError::Evaluation(EvaluationError::UnknownTrajectory(_)))
    ));
    assert!(matches!(
        evaluation.outcomes[2].result,
        Err(ScoringError::Evaluation(EvaluationError::InsufficientOverlap { .. }))
    ));

    let score = evaluation.score(ScoreMetric::RpeT, None);
    assert_eq!((score.successes, score.failures), (1, 2));
    assert!((score.mean.unwrap() - 1e-4).abs() < 1e-12);
}

#[test]
fn test_sample_weights_scale_scores() {
    let reference = common::ground_truth(12);
    let mut gt = GroundTruthTable::new();
    gt.insert("a", reference.clone());
    gt.insert("b", reference.clone());
    let predictions = vec![
        ("a".to_string(), drifted(&reference, 0.01)),
        ("b".to_string(), drifted(&reference, 0.02)),
    ];

    let evaluation = evaluate_batch(&predictions, &gt, &EvaluationConfig::default());
    let plain = evaluation.score(ScoreMetric::RpeT, None).mean.unwrap();
    let weighted = evaluation
        .score(ScoreMetric::RpeT, Some(&[2.0, 0.5]))
        .mean
        .unwrap();

    // per-pair RPE_t is rate^2
    assert!((plain - (1e-4 + 4e-4) / 2.0).abs() < 1e-12);
    assert!((weighted - (2e-4 + 2e-4) / 2.0).abs() < 1e-12);
}

#[test]
fn test_table_to_score_pipeline() {
    let reference = common::ground_truth(20);
    let mut table: Vec<u8> = Vec::new();
    for id in ["first", "second"] {
        io::write_measurements(&mut table, &common::stride(&reference, 1), Some(id)).unwrap();
    }
    // Second header line comes from the second writer
    let text = String::from_utf8(table).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap().to_string();
    let body: Vec<_> = lines.filter(|l| *l != header).collect();
    let csv = format!("{header}\n{}\n", body.join("\n"));

    let rows = io::rows_from_reader(csv.as_bytes()).unwrap();
    let sets: Vec<MeasurementSet> = io::group_rows(&rows);
    assert_eq!(sets.len(), 2);

    let gt = GroundTruthTable::from_measurements(
        sets.iter().map(|s| (s.id.clone(), s.measurements.clone())),
    );
    let estimator = GraphEstimator::new(AggregationConfig::default()).unwrap();
    let mut sink = RecordingSink::new();
    let evaluation = estimator.evaluate_batch(&sets, &gt, Some(&mut sink));

    assert_eq!(evaluation.success_count(), 2);
    assert!(sink.get("ATE").unwrap() < 1e-10);
    assert!(sink.get("pooled_RPE_t").unwrap() < 1e-10);
    assert_eq!(sink.get("failures"), Some(0.0));

    let score = estimator.score_batch(&sets, &gt, None);
    assert_eq!(score.successes, 2);
    assert!(score.mean.unwrap() < 1e-10);
}
