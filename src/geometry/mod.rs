//! Geometry utilities: SE3 poses, similarity transforms, point-set alignment.

pub mod align;
pub mod se3;
pub mod sim3;

pub use align::align_points;
pub use se3::SE3;
pub use sim3::Sim3;
