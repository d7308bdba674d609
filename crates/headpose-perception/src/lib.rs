//! `headpose-perception` – rigid-body pose numerics.
//!
//! Turns two paired marker clusters into the rotation that aligns them, using
//! the closed-form quaternion solution of the absolute-orientation problem.
//! Everything here is a pure function of its inputs; threading and state live
//! in `headpose-runtime`.
//!
//! # Modules
//!
//! - [`centroid`] – [`remove_mean`][centroid::remove_mean]: splits a cluster
//!   into its centroid and its mean-centered shape.
//! - [`covariance`] – [`cross_covariance`][covariance::cross_covariance]:
//!   the 3×3 Σ between a reference and a current centered set, paired by
//!   marker index.
//! - [`quaternion_matrix`] – [`quaternion_matrix`][quaternion_matrix::quaternion_matrix]:
//!   the symmetric 4×4 Q built from Σ.
//! - [`rotation`] – [`RotationExtractor`][rotation::RotationExtractor]:
//!   eigen-decomposes Q and turns the dominant eigenvector into a unit
//!   quaternion, with a deterministic lowest-index tie-break.
//! - [`alignment`] – [`Aligner`][alignment::Aligner]: the full per-cycle chain
//!   including the degeneracy guard.
//! - [`transform`] – [`RigidTransform`][transform::RigidTransform]: rotation +
//!   translation with Euler-angle reporting.

pub mod alignment;
pub mod centroid;
pub mod covariance;
pub mod quaternion_matrix;
pub mod rotation;
pub mod transform;

pub use alignment::{Aligner, rms_residual};
pub use centroid::{CenteredCloud, remove_batch_mean, remove_mean};
pub use rotation::{RotationExtractor, dominant_index};
pub use transform::RigidTransform;
