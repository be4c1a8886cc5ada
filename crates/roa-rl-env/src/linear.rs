//! Linear time-invariant systems

use ndarray::{Array2, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use roa_rl_core::error::ensure_columns;
use roa_rl_core::{Dynamics, Result, RoaError};

/// Discrete-time system `x' = A x + B u`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSystem {
    a: Array2<f64>,
    b: Array2<f64>,
}

impl LinearSystem {
    /// Build from `A` of shape `(n, n)` and `B` of shape `(n, m)`
    pub fn new(a: Array2<f64>, b: Array2<f64>) -> Result<Self> {
        let n = a.nrows();
        if n == 0 || a.ncols() != n {
            return Err(RoaError::shape_mismatch((n, n), a.dim()));
        }
        if b.nrows() != n || b.ncols() == 0 {
            return Err(RoaError::ShapeMismatch {
                expected: format!("({n}, m) with m >= 1"),
                actual: format!("{:?}", b.dim()),
            });
        }
        Ok(Self { a, b })
    }

    /// State matrix
    #[must_use]
    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    /// Input matrix
    #[must_use]
    pub fn b(&self) -> &Array2<f64> {
        &self.b
    }
}

impl Dynamics for LinearSystem {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn action_dim(&self) -> usize {
        self.b.ncols()
    }

    fn step(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        ensure_columns(&states, self.state_dim(), "state")?;
        ensure_columns(&actions, self.action_dim(), "action")?;
        if states.nrows() != actions.nrows() {
            return Err(RoaError::shape_mismatch(states.nrows(), actions.nrows()));
        }
        Ok(states.dot(&self.a.t()) + actions.dot(&self.b.t()))
    }

    fn action_jacobian(
        &self,
        states: ArrayView2<'_, f64>,
        _actions: ArrayView2<'_, f64>,
    ) -> Result<Array3<f64>> {
        let batch = states.nrows();
        let jacobian = self
            .b
            .view()
            .insert_axis(Axis(0))
            .broadcast((batch, self.b.nrows(), self.b.ncols()))
            .map(|view| view.to_owned())
            .ok_or_else(|| RoaError::shape_mismatch(self.b.dim(), batch))?;
        Ok(jacobian)
    }

    fn linearization(&self) -> Option<(Array2<f64>, Array2<f64>)> {
        Some((self.a.clone(), self.b.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    #[test]
    fn step_is_affine_in_state_and_action() {
        let system = LinearSystem::new(arr2(&[[1.0, 0.1], [0.0, 1.0]]), arr2(&[[0.0], [0.1]])).unwrap();
        let next = system.step(arr2(&[[1.0, 2.0]]).view(), arr2(&[[-1.0]]).view()).unwrap();
        assert_abs_diff_eq!(next[[0, 0]], 1.2, epsilon = 1e-12);
        assert_abs_diff_eq!(next[[0, 1]], 1.9, epsilon = 1e-12);
    }

    #[test]
    fn analytic_jacobian_matches_default() {
        struct Opaque(LinearSystem);
        impl Dynamics for Opaque {
            fn state_dim(&self) -> usize {
                self.0.state_dim()
            }
            fn action_dim(&self) -> usize {
                self.0.action_dim()
            }
            fn step(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
                self.0.step(states, actions)
            }
        }

        let system = LinearSystem::new(arr2(&[[0.9, 0.2], [-0.1, 1.0]]), arr2(&[[0.5, 0.0], [0.1, 1.0]])).unwrap();
        let states = arr2(&[[0.3, -0.2], [1.0, 0.5], [0.0, 0.0]]);
        let actions = arr2(&[[0.1, 0.2], [-0.4, 0.0], [0.7, -0.7]]);
        let analytic = system.action_jacobian(states.view(), actions.view()).unwrap();
        let numeric = Opaque(system).action_jacobian(states.view(), actions.view()).unwrap();
        assert_eq!(analytic.dim(), (3, 2, 2));
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(a, n, epsilon = 1e-8);
        }
    }

    #[test]
    fn rejects_inconsistent_matrices() {
        assert!(LinearSystem::new(arr2(&[[1.0, 0.0]]), arr2(&[[1.0]])).is_err());
        assert!(LinearSystem::new(arr2(&[[1.0]]), arr2(&[[1.0], [1.0]])).is_err());
        let system = LinearSystem::new(arr2(&[[1.0]]), arr2(&[[1.0]])).unwrap();
        assert!(system.step(arr2(&[[1.0, 2.0]]).view(), arr2(&[[1.0]]).view()).is_err());
    }
}
