//! Relative-pose measurements and the weighted edges built from them.
//!
//! A measurement row says "frame `to_index` sits at `delta_pose` relative to
//! frame `from_index`", with one uncertainty value per axis. The
//! [`WeightPolicy`] turns those uncertainties into edge information; the
//! resulting [`Edge`] is what the optimizer consumes.

pub mod edge;
pub mod weight;

use nalgebra::Vector6;

use crate::error::MeasurementError;
use crate::geometry::SE3;

pub use edge::{Edge, MAX_INFORMATION, MIN_INFORMATION};
pub use weight::{GapClass, WeightPolicy, DISCARD_COEFFICIENT};

/// Frame index within a sequence.
pub type FrameIndex = usize;

/// Per-axis uncertainty used when a table has no confidence columns.
pub const UNIT_CONFIDENCE: f64 = 1.0;

/// A relative-pose constraint between two frames.
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeMeasurement {
    pub from_index: FrameIndex,
    pub to_index: FrameIndex,
    pub delta_pose: SE3,
    /// Uncertainty per axis, ordered (rot_x, rot_y, rot_z, t_x, t_y, t_z).
    /// Lower means more trusted.
    pub confidence: Vector6<f64>,
}

impl RelativeMeasurement {
    pub fn new(
        from_index: FrameIndex,
        to_index: FrameIndex,
        delta_pose: SE3,
        confidence: Vector6<f64>,
    ) -> Self {
        Self {
            from_index,
            to_index,
            delta_pose,
            confidence,
        }
    }

    /// Measurement with unit confidence on every axis.
    pub fn unweighted(from_index: FrameIndex, to_index: FrameIndex, delta_pose: SE3) -> Self {
        Self::new(
            from_index,
            to_index,
            delta_pose,
            Vector6::repeat(UNIT_CONFIDENCE),
        )
    }

    /// Signed index gap `to - from`.
    pub fn diff(&self) -> i64 {
        self.to_index as i64 - self.from_index as i64
    }

    /// Reject measurements that can never form a valid edge.
    pub fn validate(&self) -> Result<(), MeasurementError> {
        if self.from_index == self.to_index {
            return Err(MeasurementError::ZeroIndexGap {
                from: self.from_index,
                to: self.to_index,
            });
        }
        if !self.delta_pose.is_finite() || !self.confidence.iter().all(|c| c.is_finite()) {
            return Err(MeasurementError::NonFinite {
                from: self.from_index,
                to: self.to_index,
            });
        }
        Ok(())
    }
}
