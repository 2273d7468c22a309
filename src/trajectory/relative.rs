//! Chains of relative poses and their integration into global poses.

use tracing::warn;

use super::Trajectory;
use crate::geometry::SE3;
use crate::measurement::{FrameIndex, RelativeMeasurement};

/// Odometry chain: `steps[k]` moves from `indices[k]` to `indices[k + 1]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelativeTrajectory {
    indices: Vec<FrameIndex>,
    steps: Vec<SE3>,
}

impl RelativeTrajectory {
    /// Build from a table of measurements, keeping only adjacent
    /// (`to_index == from_index + 1`) rows.
    ///
    /// When several rows describe the same step the first one wins. A
    /// missing step `k -> k+1` breaks the chain: frame `k+1` gets no pose,
    /// the following segment is attached to the pose of `k`, and a warning
    /// is logged.
    pub fn from_measurements<'a, I>(measurements: I) -> Self
    where
        I: IntoIterator<Item = &'a RelativeMeasurement>,
    {
        let mut adjacent: Vec<&RelativeMeasurement> = measurements
            .into_iter()
            .filter(|m| m.diff() == 1)
            .collect();
        adjacent.sort_by_key(|m| m.from_index);
        adjacent.dedup_by_key(|m| m.from_index);

        let Some(first) = adjacent.first() else {
            return Self::default();
        };

        let mut indices = vec![first.from_index];
        let mut steps = Vec::with_capacity(adjacent.len());
        for m in adjacent {
            let last = indices[indices.len() - 1];
            if m.from_index != last {
                warn!(
                    from = last,
                    to = m.from_index,
                    "odometry chain has a gap, attaching next segment to last pose"
                );
            }
            indices.push(m.to_index);
            steps.push(m.delta_pose);
        }

        Self { indices, steps }
    }

    /// Relative chain between consecutive poses of a global trajectory.
    pub fn from_global(trajectory: &Trajectory) -> Self {
        let indices: Vec<FrameIndex> = trajectory.indices().collect();
        let poses: Vec<&SE3> = trajectory.iter().map(|(_, p)| p).collect();
        let steps = poses.windows(2).map(|w| w[0].between(w[1])).collect();
        Self { indices, steps }
    }

    /// Integrate the chain starting from the identity at the first index.
    pub fn to_global(&self) -> Trajectory {
        self.to_global_from(SE3::identity())
    }

    /// Integrate the chain starting from `origin` at the first index.
    pub fn to_global_from(&self, origin: SE3) -> Trajectory {
        let mut trajectory = Trajectory::new();
        let Some(&first) = self.indices.first() else {
            return trajectory;
        };

        let mut pose = origin;
        trajectory.insert(first, pose);
        for (step, &index) in self.steps.iter().zip(&self.indices[1..]) {
            pose = pose.compose(step);
            trajectory.insert(index, pose);
        }
        trajectory
    }

    /// Unit-confidence measurements `(indices[k], indices[k + 1])`.
    pub fn to_measurements(&self) -> Vec<RelativeMeasurement> {
        self.indices
            .windows(2)
            .zip(&self.steps)
            .map(|(w, step)| RelativeMeasurement::unweighted(w[0], w[1], *step))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn indices(&self) -> &[FrameIndex] {
        &self.indices
    }

    pub fn steps(&self) -> &[SE3] {
        &self.steps
    }
}
