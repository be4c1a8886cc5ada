//! Discrete-time linear quadratic regulator

use nalgebra::DMatrix;
use ndarray::Array2;
use tracing::debug;

use roa_rl_core::{Result, RoaError};

/// Iteration cap for the Riccati recursion
pub const MAX_ITERATIONS: usize = 10_000;

/// Convergence threshold on the largest entry change of `P`
pub const TOLERANCE: f64 = 1e-10;

fn to_matrix(array: &Array2<f64>) -> DMatrix<f64> {
    let (rows, cols) = array.dim();
    DMatrix::from_fn(rows, cols, |i, j| array[[i, j]])
}

fn to_array(matrix: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(matrix.shape(), |(i, j)| matrix[(i, j)])
}

/// Solve the discrete algebraic Riccati equation by fixed-point iteration
///
/// Returns the gain `K` of shape `(m, n)` for the control law `u = -K x`
/// and the cost-to-go matrix `P` of shape `(n, n)`.
pub fn dlqr(a: &Array2<f64>, b: &Array2<f64>, q: &Array2<f64>, r: &Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
    let n = a.nrows();
    let m = b.ncols();
    if a.dim() != (n, n) || b.nrows() != n || q.dim() != (n, n) || r.dim() != (m, m) || n == 0 || m == 0 {
        return Err(RoaError::ShapeMismatch {
            expected: format!("A {n}x{n}, B {n}x{m}, Q {n}x{n}, R {m}x{m}"),
            actual: format!(
                "A {:?}, B {:?}, Q {:?}, R {:?}",
                a.dim(),
                b.dim(),
                q.dim(),
                r.dim()
            ),
        });
    }

    let a = to_matrix(a);
    let b = to_matrix(b);
    let q = to_matrix(q);
    let r = to_matrix(r);
    let at = a.transpose();
    let bt = b.transpose();

    let mut p = q.clone();
    for iteration in 1..=MAX_ITERATIONS {
        let btp = &bt * &p;
        let gram = &r + &btp * &b;
        let gram_inv = gram
            .try_inverse()
            .ok_or_else(|| RoaError::NumericOverflow("R + BᵀPB is singular".into()))?;
        let gain = &gram_inv * &btp * &a;
        let next = &q + &at * &p * &a - &at * &p * &b * &gain;

        if next.iter().any(|v| !v.is_finite()) {
            return Err(RoaError::NumericOverflow(format!(
                "Riccati iteration diverged after {iteration} steps"
            )));
        }
        let change = (&next - &p).amax();
        p = next;
        if change < TOLERANCE * p.amax().max(1.0) {
            debug!(iteration, "Riccati iteration converged");
            let btp = &bt * &p;
            let gram_inv = (&r + &btp * &b)
                .try_inverse()
                .ok_or_else(|| RoaError::NumericOverflow("R + BᵀPB is singular".into()))?;
            let gain = gram_inv * btp * &a;
            return Ok((to_array(&gain), to_array(&p)));
        }
    }
    Err(RoaError::NumericOverflow(format!(
        "Riccati iteration did not converge in {MAX_ITERATIONS} steps"
    )))
}
