//! Loop-closure interfaces.
//!
//! Place recognition and relative-pose estimation for loop closures are
//! supplied from outside the core. This module defines what the core
//! consumes from them:
//! - [`LoopClosureSource`]: ranked candidates of previously seen frames
//! - [`LoopMeasurer`]: a relative measurement for an accepted candidate
//!
//! [`DescriptorDatabase`] is a small bag-of-words source usable as a
//! reference implementation.

mod database;

use serde::{Deserialize, Serialize};

use crate::measurement::{FrameIndex, RelativeMeasurement};

pub use database::{BowVector, DescriptorDatabase};

/// Previously seen frame that looks similar to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopCandidate {
    pub frame_index: FrameIndex,
    /// Similarity to the query. Higher is closer.
    pub score: f64,
}

/// Loop-closure candidate search.
pub trait LoopClosureSource {
    /// Per-frame feature representation.
    type Descriptor;

    /// Register a frame so that later queries can return it.
    fn add(&mut self, frame: FrameIndex, descriptor: Self::Descriptor);

    /// Up to `k` registered frames scoring at least `matches_threshold`,
    /// closest first.
    fn query(
        &self,
        descriptor: &Self::Descriptor,
        k: usize,
        matches_threshold: f64,
    ) -> Vec<LoopCandidate>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Estimates the relative pose between a query frame and an accepted
/// candidate.
pub trait LoopMeasurer {
    /// Measurement from `candidate.frame_index` to `query`, or `None` when
    /// the pair cannot be registered.
    fn measure(
        &mut self,
        query: FrameIndex,
        candidate: &LoopCandidate,
    ) -> Option<RelativeMeasurement>;
}

/// Loop-closure search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopClosureConfig {
    /// Maximum number of candidates requested per keyframe.
    pub knn: usize,

    /// Minimum similarity score for a candidate to be accepted.
    pub matches_threshold: f64,

    /// Frames younger than this (in frame indices) relative to the query are
    /// never returned as candidates.
    pub min_temporal_gap: usize,
}

impl Default for LoopClosureConfig {
    fn default() -> Self {
        Self {
            knn: 5,
            matches_threshold: 0.5,
            min_temporal_gap: 30,
        }
    }
}
