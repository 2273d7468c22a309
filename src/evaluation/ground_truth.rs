//! Reference trajectories looked up by identifier.

use std::collections::BTreeMap;

use crate::error::EvaluationError;
use crate::measurement::RelativeMeasurement;
use crate::trajectory::{RelativeTrajectory, Trajectory};

/// Read-only table of reference trajectories, shared by every worker of a
/// batch evaluation.
#[derive(Debug, Clone, Default)]
pub struct GroundTruthTable {
    trajectories: BTreeMap<String, Trajectory>,
}

impl GroundTruthTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, trajectory: Trajectory) {
        self.trajectories.insert(id.into(), trajectory);
    }

    /// Reconstruct each reference by integrating its adjacent rows.
    ///
    /// A missing row `k -> k+1` leaves frame `k+1` out of the reference.
    /// Later frames are still placed, chained onto the pose of `k`, so
    /// metrics against that reference skip the dropped frame.
    pub fn from_measurements<I, S>(sets: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<RelativeMeasurement>)>,
        S: Into<String>,
    {
        let trajectories = sets
            .into_iter()
            .map(|(id, rows)| {
                let trajectory = RelativeTrajectory::from_measurements(&rows).to_global();
                (id.into(), trajectory)
            })
            .collect();
        Self { trajectories }
    }

    pub fn get(&self, id: &str) -> Result<&Trajectory, EvaluationError> {
        self.trajectories
            .get(id)
            .ok_or_else(|| EvaluationError::UnknownTrajectory(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.trajectories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }
}
