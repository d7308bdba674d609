//! The symmetric 4×4 matrix of the absolute-orientation problem.
//!
//! For a cross-covariance Σ between a reference and a current point set,
//!
//! ```text
//!       ┌ tr(Σ)   Δᵀ                  ┐
//! Q  =  │                             │      A = Σ − Σᵀ
//!       └ Δ       Σ + Σᵀ − tr(Σ)·I₃   ┘      Δ = (A₁₂, A₂₀, A₀₁)
//! ```
//!
//! The unit eigenvector of Q with the largest eigenvalue is the quaternion
//! `(w, x, y, z)` of the rotation that best carries the reference set onto
//! the current one in the least-squares sense.

use nalgebra::{Matrix3, Matrix4, Vector3};

/// Cyclic components of the skew part of `sigma`.
pub fn cyclic_vector(sigma: &Matrix3<f64>) -> Vector3<f64> {
    let a = sigma - sigma.transpose();
    Vector3::new(a[(1, 2)], a[(2, 0)], a[(0, 1)])
}

/// Assemble Q from the cross-covariance `sigma`.
pub fn quaternion_matrix(sigma: &Matrix3<f64>) -> Matrix4<f64> {
    let trace = sigma.trace();
    let delta = cyclic_vector(sigma);
    let symmetric = sigma + sigma.transpose() - Matrix3::identity() * trace;

    let mut q = Matrix4::zeros();
    q[(0, 0)] = trace;
    for i in 0..3 {
        q[(0, i + 1)] = delta[i];
        q[(i + 1, 0)] = delta[i];
    }
    q.fixed_view_mut::<3, 3>(1, 1).copy_from(&symmetric);
    q
}
