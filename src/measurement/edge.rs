//! Weighted pose-graph edge.

use nalgebra::Vector6;

use super::{FrameIndex, GapClass, RelativeMeasurement, WeightPolicy};
use crate::error::MeasurementError;
use crate::geometry::SE3;

/// Lower clamp on per-axis information. Keeps discarded edges from making the
/// normal equations singular.
pub const MIN_INFORMATION: f64 = 1e-12;

/// Upper clamp on per-axis information. Zero uncertainty saturates here.
pub const MAX_INFORMATION: f64 = 1e12;

/// A relative-pose constraint with diagonal information, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    from: FrameIndex,
    to: FrameIndex,
    measurement: SE3,
    /// Policy-scaled uncertainty per axis.
    weights: Vector6<f64>,
    /// Diagonal of the information matrix, `1 / weights²` clamped.
    information: Vector6<f64>,
    class: GapClass,
}

impl Edge {
    /// Build an edge from a raw measurement through the weight policy.
    pub fn new(
        measurement: &RelativeMeasurement,
        policy: &WeightPolicy,
    ) -> Result<Self, MeasurementError> {
        measurement.validate()?;
        let diff = measurement.diff();
        let (class, _) = policy
            .classify(diff)
            .ok_or(MeasurementError::ZeroIndexGap {
                from: measurement.from_index,
                to: measurement.to_index,
            })?;
        let weights = policy
            .weights(diff, &measurement.confidence)
            .ok_or(MeasurementError::ZeroIndexGap {
                from: measurement.from_index,
                to: measurement.to_index,
            })?;

        Ok(Self {
            from: measurement.from_index,
            to: measurement.to_index,
            measurement: measurement.delta_pose,
            information: information_from_weights(&weights),
            weights,
            class,
        })
    }

    /// Build an edge from an already-weighted uncertainty vector, bypassing
    /// the gap policy.
    pub fn with_weights(
        from: FrameIndex,
        to: FrameIndex,
        measurement: SE3,
        weights: Vector6<f64>,
    ) -> Result<Self, MeasurementError> {
        RelativeMeasurement::new(from, to, measurement, weights).validate()?;
        Ok(Self {
            from,
            to,
            measurement,
            information: information_from_weights(&weights),
            weights,
            class: GapClass::Listed,
        })
    }

    pub fn from(&self) -> FrameIndex {
        self.from
    }

    pub fn to(&self) -> FrameIndex {
        self.to
    }

    pub fn measurement(&self) -> &SE3 {
        &self.measurement
    }

    pub fn weights(&self) -> &Vector6<f64> {
        &self.weights
    }

    pub fn information(&self) -> &Vector6<f64> {
        &self.information
    }

    pub fn class(&self) -> GapClass {
        self.class
    }

    /// Absolute index gap.
    pub fn gap(&self) -> usize {
        self.from.abs_diff(self.to)
    }

    /// The endpoint that is not `node`.
    pub fn other(&self, node: FrameIndex) -> FrameIndex {
        if self.from == node {
            self.to
        } else {
            self.from
        }
    }

    /// Residual `log(Z^{-1} * (T_from^{-1} * T_to))`, zero when the two
    /// global poses agree exactly with the measurement.
    pub fn residual(&self, pose_from: &SE3, pose_to: &SE3) -> Vector6<f64> {
        let predicted = pose_from.between(pose_to);
        self.measurement.between(&predicted).log()
    }

    /// Weighted squared residual `r^T Ω r`.
    pub fn cost(&self, pose_from: &SE3, pose_to: &SE3) -> f64 {
        let r = self.residual(pose_from, pose_to);
        r.component_mul(&r).dot(&self.information)
    }
}

fn information_from_weights(weights: &Vector6<f64>) -> Vector6<f64> {
    weights.map(|w| {
        let info = 1.0 / (w * w);
        if info.is_nan() {
            MAX_INFORMATION
        } else {
            info.clamp(MIN_INFORMATION, MAX_INFORMATION)
        }
    })
}
