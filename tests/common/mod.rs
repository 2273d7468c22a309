//! Synthetic trajectories and measurement tables shared by the integration
//! tests.

#![allow(dead_code)]

use nalgebra::{Vector3, Vector6};
use pose_graph_eval::geometry::SE3;
use pose_graph_eval::measurement::RelativeMeasurement;
use pose_graph_eval::trajectory::Trajectory;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

/// Frames in the default fixture.
pub const FRAMES: usize = 50;

/// Standard deviation of the synthetic measurement noise.
pub const NOISE_STD: f64 = 0.001;

/// Gently winding 3D path starting at the identity.
pub fn ground_truth(frames: usize) -> Trajectory {
    let mut pose = SE3::identity();
    let mut poses = Vec::with_capacity(frames);
    for i in 0..frames {
        poses.push((i, pose));
        let t = i as f64;
        let step = SE3::from_euler(
            &Vector3::new(0.01 * (0.3 * t).sin(), 0.01 * (0.2 * t).cos(), 0.05),
            Vector3::new(1.0, 0.05 * (0.1 * t).sin(), 0.02),
        );
        pose = pose.compose(&step);
    }
    poses.into_iter().collect()
}

/// Exact measurements between every pair of frames `stride` apart.
pub fn stride(trajectory: &Trajectory, stride: usize) -> Vec<RelativeMeasurement> {
    trajectory.relative_measurements(stride, Vector6::repeat(1.0))
}

/// Stride-1 and stride-2 rows where some stride-1 rows are missing; the
/// stride-2 rows keep the graph connected.
pub fn mixed(trajectory: &Trajectory) -> Vec<RelativeMeasurement> {
    let mut rows: Vec<_> = stride(trajectory, 1)
        .into_iter()
        .filter(|m| m.from_index % 5 != 3)
        .collect();
    rows.extend(stride(trajectory, 2));
    rows
}

/// Adds Gaussian noise of [`NOISE_STD`] to every pose component and records
/// that deviation as the confidence.
pub fn with_noise(measurements: &[RelativeMeasurement], seed: u64) -> Vec<RelativeMeasurement> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, NOISE_STD).unwrap();
    measurements
        .iter()
        .map(|m| {
            let mut components = m.delta_pose.to_components();
            for c in components.iter_mut() {
                *c += normal.sample(&mut rng);
            }
            RelativeMeasurement::new(
                m.from_index,
                m.to_index,
                SE3::from_components(&components),
                Vector6::repeat(NOISE_STD),
            )
        })
        .collect()
}
