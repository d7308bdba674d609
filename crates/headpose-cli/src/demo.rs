//! Synthetic head motion for `headpose demo`.
//!
//! Four markers (fore, left, chin, right) on a rigid cluster sway and nod on
//! slow sinusoids.  Frame 0 is the rest pose, so the estimator's calibration
//! matches the generator's zero and every later pose can be compared with
//! [`HeadMotion::truth`].

use headpose_types::{MarkerPoint, RawFrame};
use nalgebra::{UnitQuaternion, Vector3};

/// Rest-pose markers in metres, roughly a head 1.5 m in front of the rig.
const REST: [[f64; 3]; 4] = [
    [0.00, 0.10, 1.60],  // fore
    [-0.08, 0.02, 1.52], // left
    [0.00, 0.06, 1.40],  // chin
    [0.08, 0.02, 1.52],  // right
];

/// Generator of rigidly moving marker frames.
#[derive(Debug, Clone)]
pub struct HeadMotion {
    rate_hz: f64,
    frame: u64,
}

impl HeadMotion {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz: rate_hz.max(1.0),
            frame: 0,
        }
    }

    /// Rotation and displacement applied to the rest pose at frame `n`.
    pub fn truth(&self, n: u64) -> (UnitQuaternion<f64>, Vector3<f64>) {
        let t = n as f64 / self.rate_hz;
        let roll = 0.10 * (1.3 * t).sin();
        let pitch = 0.30 * (0.7 * t).sin();
        let yaw = 0.60 * t.sin();
        let sway = Vector3::new(0.02 * (0.5 * t).sin(), 0.0, 0.01 * (0.9 * t).sin());
        (UnitQuaternion::from_euler_angles(roll, pitch, yaw), sway)
    }

    /// Markers at frame `n`.  The cluster rotates about its own centroid.
    pub fn frame_at(&self, n: u64) -> RawFrame {
        let (rotation, sway) = self.truth(n);
        let rest: Vec<Vector3<f64>> = REST.iter().map(|p| Vector3::new(p[0], p[1], p[2])).collect();
        let center = rest.iter().sum::<Vector3<f64>>() / rest.len() as f64;
        let markers = rest
            .iter()
            .map(|p| MarkerPoint::from(rotation * (p - center) + center + sway))
            .collect();
        RawFrame::new(markers)
    }
}

impl Iterator for HeadMotion {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        let frame = self.frame_at(self.frame);
        self.frame += 1;
        Some(frame)
    }
}
