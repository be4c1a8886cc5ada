//! Discrete-time transition models

use ndarray::{s, Array2, Array3, ArrayView2};

use crate::error::ensure_columns;
use crate::Result;

/// Perturbation used by central-difference derivatives
pub const FINITE_DIFFERENCE_STEP: f64 = 1e-6;

/// Batched transition map `x' = f(x, u)` over normalized states and actions
///
/// Only forward evaluation is required. The action Jacobian defaults to
/// central differences; models with a closed form should override it.
pub trait Dynamics {
    /// State dimension (n)
    fn state_dim(&self) -> usize;

    /// Action dimension (m)
    fn action_dim(&self) -> usize;

    /// Advance every row of `states` by one step under the matching row of `actions`
    fn step(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array2<f64>>;

    /// Per-sample Jacobian `∂f/∂u`, shape `(batch, n, m)`
    fn action_jacobian(
        &self,
        states: ArrayView2<'_, f64>,
        actions: ArrayView2<'_, f64>,
    ) -> Result<Array3<f64>> {
        ensure_columns(&actions, self.action_dim(), "action")?;
        let (batch, m) = actions.dim();
        let n = self.state_dim();
        let h = FINITE_DIFFERENCE_STEP;

        let mut jacobian = Array3::zeros((batch, n, m));
        for j in 0..m {
            let mut plus = actions.to_owned();
            plus.column_mut(j).mapv_inplace(|u| u + h);
            let mut minus = actions.to_owned();
            minus.column_mut(j).mapv_inplace(|u| u - h);

            let diff = (self.step(states, plus.view())? - self.step(states, minus.view())?) / (2.0 * h);
            jacobian.slice_mut(s![.., .., j]).assign(&diff);
        }
        Ok(jacobian)
    }

    /// Linearization `(A, B)` about the origin, if the model provides one
    fn linearization(&self) -> Option<(Array2<f64>, Array2<f64>)> {
        None
    }
}

impl<T: Dynamics + ?Sized> Dynamics for Box<T> {
    fn state_dim(&self) -> usize {
        (**self).state_dim()
    }

    fn action_dim(&self) -> usize {
        (**self).action_dim()
    }

    fn step(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        (**self).step(states, actions)
    }

    fn action_jacobian(
        &self,
        states: ArrayView2<'_, f64>,
        actions: ArrayView2<'_, f64>,
    ) -> Result<Array3<f64>> {
        (**self).action_jacobian(states, actions)
    }

    fn linearization(&self) -> Option<(Array2<f64>, Array2<f64>)> {
        (**self).linearization()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    /// x' = x + u², exercising the finite-difference Jacobian only
    struct Squared;

    impl Dynamics for Squared {
        fn state_dim(&self) -> usize {
            1
        }

        fn action_dim(&self) -> usize {
            1
        }

        fn step(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
            Ok(&states + &actions.mapv(|u| u * u))
        }
    }

    #[test]
    fn finite_difference_jacobian() {
        let states = arr2(&[[0.0], [1.0], [-1.0]]);
        let actions = arr2(&[[0.5], [-0.25], [0.0]]);
        let jac = Squared.action_jacobian(states.view(), actions.view()).unwrap();
        assert_eq!(jac.dim(), (3, 1, 1));
        assert_abs_diff_eq!(jac[[0, 0, 0]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(jac[[1, 0, 0]], -0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(jac[[2, 0, 0]], 0.0, epsilon = 1e-6);
        assert!(Squared.linearization().is_none());
    }
}
