//! Closed-form alignment of corresponding point sets.
//!
//! Finds the similarity (or rigid, when scale is fixed) transform `S`
//! minimizing `Σ ||S(p_i) - q_i||²`, following Horn / Umeyama:
//! 1. Compute centroids of both point sets
//! 2. Center the points
//! 3. Compute rotation via SVD of the cross-covariance matrix
//! 4. Compute scale (if not fixed) from the singular values
//! 5. Compute translation: t = c2 - s * R * c1

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use super::Sim3;

/// Minimum spread of the source points for a scale to be recoverable.
const MIN_SOURCE_SPREAD: f64 = 1e-12;

/// Align `source` onto `target` (same length, index-wise correspondence).
///
/// Returns `None` when fewer than two correspondences are given, when the
/// lengths differ, or when the SVD fails to produce a rotation. With
/// `with_scale`, also `None` if all source points coincide.
pub fn align_points(
    source: &[Vector3<f64>],
    target: &[Vector3<f64>],
    with_scale: bool,
) -> Option<Sim3> {
    let n = source.len();
    if n < 2 || n != target.len() {
        return None;
    }

    let centroid_src = compute_centroid(source);
    let centroid_dst = compute_centroid(target);

    // Cross-covariance matrix: H = sum(p_i * q_i^T)
    let mut h = Matrix3::zeros();
    let mut spread_src = 0.0;
    for (p, q) in source.iter().zip(target.iter()) {
        let pc = p - centroid_src;
        let qc = q - centroid_dst;
        h += pc * qc.transpose();
        spread_src += pc.norm_squared();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    // R = V * D * U^T, D flips the last axis if the result would be a reflection
    let v = v_t.transpose();
    let d = if (v * u.transpose()).determinant() < 0.0 {
        -1.0
    } else {
        1.0
    };
    let diag = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d));
    let rotation_mat = v * diag * u.transpose();

    let scale = if with_scale {
        if spread_src < MIN_SOURCE_SPREAD {
            return None;
        }
        let sv = svd.singular_values;
        (sv[0] + sv[1] + d * sv[2]) / spread_src
    } else {
        1.0
    };

    let rotation =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_mat));
    let translation = centroid_dst - scale * (rotation * centroid_src);

    Some(Sim3 {
        rotation,
        translation,
        scale,
    })
}

/// Compute centroid of a set of 3D points.
fn compute_centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = points.iter().sum();
    sum / points.len() as f64
}
