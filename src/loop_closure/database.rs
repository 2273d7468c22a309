//! Bag-of-words descriptor database.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::{LoopCandidate, LoopClosureSource};
use crate::measurement::FrameIndex;

/// Bag-of-words vector: word_id -> weight.
pub type BowVector = HashMap<u32, f64>;

/// Frames and their BoW vectors, scored by sparse dot product.
#[derive(Debug, Clone, Default)]
pub struct DescriptorDatabase {
    entries: Vec<(FrameIndex, BowVector)>,
}

impl DescriptorDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn score(query: &BowVector, bow: &BowVector) -> f64 {
        // Iterate the smaller histogram
        let (small, large) = if query.len() <= bow.len() {
            (query, bow)
        } else {
            (bow, query)
        };
        small
            .iter()
            .filter_map(|(word, w)| large.get(word).map(|other| w * other))
            .sum()
    }
}

impl LoopClosureSource for DescriptorDatabase {
    type Descriptor = BowVector;

    /// Re-adding a frame replaces its descriptor.
    fn add(&mut self, frame: FrameIndex, descriptor: BowVector) {
        match self.entries.iter_mut().find(|(f, _)| *f == frame) {
            Some(entry) => entry.1 = descriptor,
            None => self.entries.push((frame, descriptor)),
        }
    }

    fn query(&self, descriptor: &BowVector, k: usize, matches_threshold: f64) -> Vec<LoopCandidate> {
        let mut candidates: Vec<LoopCandidate> = self
            .entries
            .iter()
            .filter_map(|(frame, bow)| {
                let score = Self::score(descriptor, bow);
                (score > 0.0 && score >= matches_threshold).then_some(LoopCandidate {
                    frame_index: *frame,
                    score,
                })
            })
            .collect();

        // Score descending, older frame first on ties.
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.frame_index.cmp(&b.frame_index))
        });
        candidates.truncate(k);
        candidates
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
