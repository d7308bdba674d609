//! Rigid-body transforms.
//!
//! A [`RigidTransform`] pairs a translation with a unit-quaternion rotation.
//! The quaternion is the canonical rotation; Euler angles are derived from it
//! only for reporting.
//!
//! # Example
//!
//! ```rust
//! use headpose_perception::transform::RigidTransform;
//! use nalgebra::{UnitQuaternion, Vector3};
//!
//! // 90° about Z, then 1 m along X.
//! let t = RigidTransform::new(
//!     Vector3::new(1.0, 0.0, 0.0),
//!     UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
//! );
//! let p = t.apply(&Vector3::new(1.0, 0.0, 0.0));
//! assert!((p - Vector3::new(1.0, 1.0, 0.0)).norm() < 1e-9);
//! ```

use chrono::{DateTime, Utc};
use headpose_types::PoseEstimate;
use nalgebra::{UnitQuaternion, Vector3};

/// Euler angles `(roll, pitch, yaw)` of `rotation` in the fixed-axis XYZ
/// convention, i.e. `R = Rz(yaw) · Ry(pitch) · Rx(roll)`.
pub fn euler_angles(rotation: &UnitQuaternion<f64>) -> (f64, f64, f64) {
    rotation.euler_angles()
}

/// A rigid-body 3-D transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidTransform {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl RigidTransform {
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The identity transform (no translation, no rotation).
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// Map `point` through this transform: `R·p + t`.
    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Compose two transforms: `other` is applied first, then `self`.
    ///
    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(&self, other: &Self) -> Self {
        Self::new(
            self.translation + self.rotation * other.translation,
            self.rotation * other.rotation,
        )
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self::new(-(rotation * self.translation), rotation)
    }

    pub fn euler_angles(&self) -> (f64, f64, f64) {
        euler_angles(&self.rotation)
    }

    /// Package the transform as the externally emitted pose of batch
    /// `sequence`.
    pub fn to_pose(&self, sequence: u64, captured_at: DateTime<Utc>) -> PoseEstimate {
        let (roll, pitch, yaw) = self.euler_angles();
        PoseEstimate {
            sequence,
            captured_at,
            translation: self.translation,
            rotation: self.rotation,
            roll,
            pitch,
            yaw,
        }
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}
