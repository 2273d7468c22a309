//! SE3: 6-DOF rigid transformation (rotation + translation).
//!
//! Rotations are stored as unit quaternions so that composition never
//! drifts into a degenerate representation. Euler angles only appear at the
//! measurement-table boundary, using the roll/pitch/yaw convention
//! `R = Rz(euler_z) * Ry(euler_y) * Rx(euler_x)`.

use nalgebra::{Quaternion, UnitQuaternion, Vector3, Vector6};

/// Rigid transformation: transforms points as p' = R * p + t.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    ///
    /// Returns `None` for a quaternion too close to zero to be normalized.
    pub fn from_quaternion(
        qw: f64,
        qx: f64,
        qy: f64,
        qz: f64,
        translation: Vector3<f64>,
    ) -> Option<Self> {
        let rotation = UnitQuaternion::try_new(Quaternion::new(qw, qx, qy, qz), 1e-12)?;
        Some(Self {
            rotation,
            translation,
        })
    }

    /// Construct from Euler angles (x, y, z) and translation.
    pub fn from_euler(euler: &Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_euler_angles(euler.x, euler.y, euler.z),
            translation,
        }
    }

    /// Construct from the row layout `[euler_x, euler_y, euler_z, t_x, t_y, t_z]`.
    pub fn from_components(c: &[f64; 6]) -> Self {
        Self::from_euler(
            &Vector3::new(c[0], c[1], c[2]),
            Vector3::new(c[3], c[4], c[5]),
        )
    }

    /// Euler angles (x, y, z) in the canonical range
    /// x, z in (-pi, pi], y in [-pi/2, pi/2].
    pub fn euler_angles(&self) -> Vector3<f64> {
        let (x, y, z) = self.rotation.euler_angles();
        Vector3::new(x, y, z)
    }

    /// Row layout `[euler_x, euler_y, euler_z, t_x, t_y, t_z]`.
    pub fn to_components(&self) -> [f64; 6] {
        let e = self.euler_angles();
        let t = self.translation;
        [e.x, e.y, e.z, t.x, t.y, t.z]
    }

    /// Inverse transformation: [R^T | -R^T t].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: self ∘ other.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Relative transform from `self` to `other`: self^{-1} ∘ other.
    pub fn between(&self, other: &SE3) -> Self {
        self.inverse().compose(other)
    }

    /// Transform a single point.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Rotation angle in radians, in [0, pi].
    pub fn rotation_angle(&self) -> f64 {
        self.rotation.angle()
    }

    pub fn is_finite(&self) -> bool {
        self.rotation.coords.iter().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
    }

    /// Log map: `[rotation_vec (3), translation (3)]`.
    ///
    /// Rotation and translation are kept decoupled, matching the ordering of
    /// measurement confidences (rotation axes first).
    pub fn log(&self) -> Vector6<f64> {
        let r = self.rotation.scaled_axis();
        let t = self.translation;
        Vector6::new(r.x, r.y, r.z, t.x, t.y, t.z)
    }

    /// Exponential map: inverse of [`SE3::log`].
    pub fn exp(tangent: &Vector6<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_scaled_axis(Vector3::new(
                tangent[0], tangent[1], tangent[2],
            )),
            translation: Vector3::new(tangent[3], tangent[4], tangent[5]),
        }
    }

    /// Apply a local update on the right: self ∘ exp(delta).
    pub fn retract(&self, delta: &Vector6<f64>) -> Self {
        self.compose(&Self::exp(delta))
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}
