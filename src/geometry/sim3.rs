//! Sim3: 7-DOF similarity transformation (rotation + translation + scale).
//!
//! Used to express the alignment between an estimated trajectory and its
//! reference. With `scale == 1.0` it is an ordinary rigid transform.

use nalgebra::{UnitQuaternion, Vector3};

/// Transforms points as: p' = s * R * p + t.
#[derive(Debug, Clone, PartialEq)]
pub struct Sim3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
    pub scale: f64,
}

impl Sim3 {
    /// Identity transformation (no rotation, no translation, scale = 1).
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
            scale: 1.0,
        }
    }

    /// Transform a single point: p' = s * R * p + t.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.scale * (self.rotation * p) + self.translation
    }
}

impl Default for Sim3 {
    fn default() -> Self {
        Self::identity()
    }
}
