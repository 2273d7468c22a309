//! Graph SLAM pipeline.
//!
//! Wires the per-frame measurement stream through the keyframe selector and
//! the loop-closure source into an aggregator:
//!
//! ```text
//! frame ─► odometry rows ───────────────────────────────► aggregator
//!       └► keyframe? ─► loop candidates ─► loop measurer ─┘
//! ```
//!
//! Keyframe descriptors become searchable only once they are at least
//! `min_temporal_gap` frames old, so recent frames are never proposed as
//! loop closures.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::AggregationConfig;
use crate::error::{AggregationError, MeasurementError};
use crate::keyframe::{CounterKeyFrameSelector, KeyFrameSelector};
use crate::loop_closure::{LoopClosureConfig, LoopClosureSource, LoopMeasurer};
use crate::measurement::{FrameIndex, RelativeMeasurement};
use crate::optimizer::{Aggregator, GraphOptimizer};
use crate::trajectory::Trajectory;

/// Everything known about one incoming frame.
#[derive(Debug, Clone)]
pub struct FrameInput<D> {
    pub index: FrameIndex,
    /// Measurements produced for this frame, typically relative to earlier
    /// frames.
    pub measurements: Vec<RelativeMeasurement>,
    /// Place-recognition descriptor, if one was computed.
    pub descriptor: Option<D>,
}

/// What the pipeline did with a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    pub keyframe: bool,
    /// Candidates returned by the loop-closure source.
    pub candidates: usize,
    /// Loop-closure measurements added to the graph.
    pub loop_closures: Vec<RelativeMeasurement>,
    /// Measured loop closures that failed validation and were not added.
    pub rejected_loops: Vec<(RelativeMeasurement, MeasurementError)>,
}

pub struct GraphSlam<S, M, A = GraphOptimizer>
where
    S: LoopClosureSource,
{
    selector: Box<dyn KeyFrameSelector>,
    source: S,
    measurer: M,
    aggregator: A,
    loop_config: LoopClosureConfig,
    /// Keyframe descriptors not yet old enough to be searched.
    pending: VecDeque<(FrameIndex, S::Descriptor)>,
}

impl<S, M> GraphSlam<S, M, GraphOptimizer>
where
    S: LoopClosureSource,
    M: LoopMeasurer,
{
    /// Counter keyframe selector and optimizer built from `config`.
    pub fn new(config: &AggregationConfig, source: S, measurer: M) -> Self {
        Self::with_parts(
            Box::new(CounterKeyFrameSelector::from_config(&config.keyframe)),
            source,
            measurer,
            GraphOptimizer::new(config.optimizer.clone(), config.weights.clone()),
            config.loop_closure.clone(),
        )
    }
}

impl<S, M, A> GraphSlam<S, M, A>
where
    S: LoopClosureSource,
    M: LoopMeasurer,
    A: Aggregator,
{
    pub fn with_parts(
        selector: Box<dyn KeyFrameSelector>,
        source: S,
        measurer: M,
        aggregator: A,
        loop_config: LoopClosureConfig,
    ) -> Self {
        Self {
            selector,
            source,
            measurer,
            aggregator,
            loop_config,
            pending: VecDeque::new(),
        }
    }

    /// Feed one frame. Malformed measurements reject the whole frame before
    /// anything reaches the graph.
    pub fn process_frame(
        &mut self,
        frame: FrameInput<S::Descriptor>,
    ) -> Result<FrameOutcome, AggregationError> {
        for m in &frame.measurements {
            m.validate()?;
        }

        let keyframe = self.selector.is_keyframe(frame.index);
        let mut outcome = FrameOutcome {
            keyframe,
            ..FrameOutcome::default()
        };

        if keyframe {
            self.release_pending(frame.index);
            if let Some(descriptor) = frame.descriptor {
                let candidates = self.source.query(
                    &descriptor,
                    self.loop_config.knn,
                    self.loop_config.matches_threshold,
                );
                outcome.candidates = candidates.len();
                for candidate in &candidates {
                    let Some(m) = self.measurer.measure(frame.index, candidate) else {
                        continue;
                    };
                    match m.validate() {
                        Ok(()) => outcome.loop_closures.push(m),
                        Err(error) => {
                            warn!(
                                frame = frame.index,
                                candidate = candidate.frame_index,
                                %error,
                                "Rejected loop closure measurement"
                            );
                            outcome.rejected_loops.push((m, error));
                        }
                    }
                }
                self.pending.push_back((frame.index, descriptor));
            }
        }

        self.aggregator.append(&frame.measurements)?;
        if !outcome.loop_closures.is_empty() {
            debug!(
                frame = frame.index,
                candidates = outcome.candidates,
                accepted = outcome.loop_closures.len(),
                "Loop closures added"
            );
            self.aggregator.append(&outcome.loop_closures)?;
        }
        Ok(outcome)
    }

    /// Make keyframes at least `min_temporal_gap` older than `current`
    /// searchable.
    fn release_pending(&mut self, current: FrameIndex) {
        while let Some((frame, _)) = self.pending.front() {
            if frame + self.loop_config.min_temporal_gap > current {
                break;
            }
            if let Some((frame, descriptor)) = self.pending.pop_front() {
                self.source.add(frame, descriptor);
            }
        }
    }

    /// Optimized trajectory of everything fed so far.
    pub fn finish(&mut self) -> Result<Trajectory, AggregationError> {
        self.aggregator.get_trajectory()
    }

    pub fn aggregator(&self) -> &A {
        &self.aggregator
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::loop_closure::{BowVector, DescriptorDatabase, LoopCandidate};
    use nalgebra::{Vector3, Vector6};

    /// Measures loops from a known trajectory.
    struct Oracle {
        poses: Vec<SE3>,
    }

    impl LoopMeasurer for Oracle {
        fn measure(&mut self, query: FrameIndex, c: &LoopCandidate) -> Option<RelativeMeasurement> {
            let from = self.poses.get(c.frame_index)?;
            let to = self.poses.get(query)?;
            Some(RelativeMeasurement::new(
                c.frame_index,
                query,
                from.between(to),
                Vector6::repeat(1.0),
            ))
        }
    }

    fn circle(n: usize) -> Vec<SE3> {
        (0..n)
            .map(|i| {
                let a = i as f64 * std::f64::consts::TAU / n as f64;
                SE3::from_euler(&Vector3::new(0.0, 0.0, a), Vector3::new(a.cos(), a.sin(), 0.0))
            })
            .collect()
    }

    fn place(i: usize, n: usize) -> BowVector {
        // Word per position on the circle, shared by frames one lap apart
        BowVector::from([((i % n) as u32, 1.0)])
    }

    #[test]
    fn test_revisit_produces_loop_closure() {
        let n = 12;
        let poses = circle(n);
        let config = AggregationConfig {
            loop_closure: LoopClosureConfig {
                knn: 1,
                matches_threshold: 0.5,
                min_temporal_gap: 5,
            },
            ..AggregationConfig::default()
        };
        let mut slam = GraphSlam::new(&config, DescriptorDatabase::new(), Oracle {
            poses: poses.iter().chain(poses.iter()).copied().collect(),
        });

        let mut loops = 0;
        for i in 0..2 * n {
            let measurements = if i == 0 {
                Vec::new()
            } else {
                let delta = poses[(i - 1) % n].between(&poses[i % n]);
                vec![RelativeMeasurement::unweighted(i - 1, i, delta)]
            };
            let outcome = slam
                .process_frame(FrameInput {
                    index: i,
                    measurements,
                    descriptor: Some(place(i, n)),
                })
                .unwrap();
            assert!(outcome.keyframe);
            loops += outcome.loop_closures.len();
        }

        assert_eq!(loops, n);
        let trajectory = slam.finish().unwrap();
        assert_eq!(trajectory.len(), 2 * n);
        assert!(slam.aggregator().last_report().unwrap().converged());
    }

    #[test]
    fn test_recent_frames_not_searchable() {
        let config = AggregationConfig::default();
        let mut slam = GraphSlam::new(&config, DescriptorDatabase::new(), Oracle { poses: Vec::new() });
        for i in 0..3 {
            slam.process_frame(FrameInput {
                index: i,
                measurements: vec![RelativeMeasurement::unweighted(i, i + 1, SE3::identity())],
                descriptor: Some(place(0, 1)),
            })
            .unwrap();
        }
        assert!(slam.source().is_empty());
    }

    /// Returns a measurement with a non-finite translation for every
    /// candidate.
    struct BrokenMeasurer;

    impl LoopMeasurer for BrokenMeasurer {
        fn measure(&mut self, query: FrameIndex, c: &LoopCandidate) -> Option<RelativeMeasurement> {
            let pose = SE3::from_euler(&Vector3::zeros(), Vector3::new(f64::NAN, 0.0, 0.0));
            Some(RelativeMeasurement::unweighted(c.frame_index, query, pose))
        }
    }

    #[test]
    fn test_invalid_loop_closure_is_reported() {
        let config = AggregationConfig {
            loop_closure: LoopClosureConfig {
                knn: 1,
                matches_threshold: 0.5,
                min_temporal_gap: 2,
            },
            ..AggregationConfig::default()
        };
        let mut slam = GraphSlam::new(&config, DescriptorDatabase::new(), BrokenMeasurer);

        let mut rejected = 0;
        for i in 0..6 {
            let outcome = slam
                .process_frame(FrameInput {
                    index: i,
                    measurements: vec![RelativeMeasurement::unweighted(i, i + 1, SE3::identity())],
                    descriptor: Some(place(0, 1)),
                })
                .unwrap();
            assert!(outcome.loop_closures.is_empty());
            assert_eq!(outcome.rejected_loops.len(), outcome.candidates);
            for (m, error) in &outcome.rejected_loops {
                assert_eq!(
                    *error,
                    MeasurementError::NonFinite {
                        from: m.from_index,
                        to: i
                    }
                );
            }
            rejected += outcome.rejected_loops.len();
        }

        assert!(rejected > 0);
        assert_eq!(slam.aggregator().graph().edge_count(), 6);
    }

    #[test]
    fn test_malformed_frame_rejected_whole() {
        let config = AggregationConfig::default();
        let mut slam = GraphSlam::new(&config, DescriptorDatabase::new(), Oracle { poses: Vec::new() });
        let result = slam.process_frame(FrameInput {
            index: 1,
            measurements: vec![
                RelativeMeasurement::unweighted(0, 1, SE3::identity()),
                RelativeMeasurement::unweighted(1, 1, SE3::identity()),
            ],
            descriptor: None,
        });
        assert!(result.is_err());
        assert!(slam.aggregator().graph().is_empty());
    }
}
