//! Global trajectories and relative-pose chains.
//!
//! A [`Trajectory`] maps frame indices to global poses and always iterates in
//! index order. A [`RelativeTrajectory`] is the odometry view of the same
//! motion: a chain of pose deltas that integrates into a global trajectory.

mod relative;

use std::collections::BTreeMap;

use nalgebra::{Vector3, Vector6};

use crate::geometry::SE3;
use crate::measurement::{FrameIndex, RelativeMeasurement};

pub use relative::RelativeTrajectory;

/// Ordered sequence of global poses keyed by frame index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    poses: BTreeMap<FrameIndex, SE3>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn get(&self, index: FrameIndex) -> Option<&SE3> {
        self.poses.get(&index)
    }

    pub fn contains(&self, index: FrameIndex) -> bool {
        self.poses.contains_key(&index)
    }

    /// Poses in index order.
    pub fn iter(&self) -> impl Iterator<Item = (FrameIndex, &SE3)> + '_ {
        self.poses.iter().map(|(&i, p)| (i, p))
    }

    pub fn indices(&self) -> impl Iterator<Item = FrameIndex> + '_ {
        self.poses.keys().copied()
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.poses.values().map(|p| p.translation).collect()
    }

    /// Indices present in both trajectories, ascending.
    pub fn shared_indices(&self, other: &Trajectory) -> Vec<FrameIndex> {
        self.poses
            .keys()
            .filter(|i| other.poses.contains_key(i))
            .copied()
            .collect()
    }

    /// Exact relative measurements between every pair `(i, i + stride)`
    /// present in the trajectory.
    pub fn relative_measurements(
        &self,
        stride: usize,
        confidence: Vector6<f64>,
    ) -> Vec<RelativeMeasurement> {
        if stride == 0 {
            return Vec::new();
        }
        self.iter()
            .filter_map(|(i, pose_i)| {
                let pose_j = self.get(i + stride)?;
                Some(RelativeMeasurement::new(
                    i,
                    i + stride,
                    pose_i.between(pose_j),
                    confidence,
                ))
            })
            .collect()
    }

    pub(crate) fn insert(&mut self, index: FrameIndex, pose: SE3) {
        self.poses.insert(index, pose);
    }
}

impl FromIterator<(FrameIndex, SE3)> for Trajectory {
    fn from_iter<I: IntoIterator<Item = (FrameIndex, SE3)>>(iter: I) -> Self {
        Self {
            poses: iter.into_iter().collect(),
        }
    }
}
