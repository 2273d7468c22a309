//! Keyframe selection.
//!
//! Decides which incoming frames become keyframes: graph nodes that are
//! eligible for loop-closure search and long-range edges.

use serde::{Deserialize, Serialize};

use crate::measurement::FrameIndex;

/// Strategy deciding, frame by frame, whether a frame is a keyframe.
pub trait KeyFrameSelector: Send {
    /// Decision for the next frame of the stream.
    fn is_keyframe(&mut self, frame: FrameIndex) -> bool;
}

/// Keyframe selection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyFrameConfig {
    /// Every `period`-th frame is a keyframe, starting with the first.
    pub period: usize,
}

impl Default for KeyFrameConfig {
    fn default() -> Self {
        Self { period: 1 }
    }
}

/// Selects every `period`-th evaluated frame, starting with the first.
///
/// The decision depends only on how many frames have been evaluated, never on
/// the frame index or pose. Restart by building a new selector.
#[derive(Debug, Clone)]
pub struct CounterKeyFrameSelector {
    period: usize,
    /// Frames evaluated since the last keyframe.
    frames_since_kf: usize,
}

impl CounterKeyFrameSelector {
    /// A period of zero is treated as one.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            frames_since_kf: 0,
        }
    }

    pub fn from_config(config: &KeyFrameConfig) -> Self {
        Self::new(config.period)
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl KeyFrameSelector for CounterKeyFrameSelector {
    fn is_keyframe(&mut self, _frame: FrameIndex) -> bool {
        let selected = self.frames_since_kf == 0;
        self.frames_since_kf = (self.frames_since_kf + 1) % self.period;
        selected
    }
}
