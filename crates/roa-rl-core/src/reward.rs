//! Reward models

use ndarray::{Array1, Array2, ArrayView2};

use crate::dynamics::FINITE_DIFFERENCE_STEP;
use crate::Result;

/// Batched reward `r = g(x, u)`, larger is better
pub trait RewardFunction {
    /// Reward for every state/action row pair
    fn reward(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Per-sample gradient `∂r/∂u`, shape `(batch, m)`
    ///
    /// Central differences unless overridden.
    fn action_gradient(
        &self,
        states: ArrayView2<'_, f64>,
        actions: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>> {
        let (batch, m) = actions.dim();
        let h = FINITE_DIFFERENCE_STEP;

        let mut gradient = Array2::zeros((batch, m));
        for j in 0..m {
            let mut plus = actions.to_owned();
            plus.column_mut(j).mapv_inplace(|u| u + h);
            let mut minus = actions.to_owned();
            minus.column_mut(j).mapv_inplace(|u| u - h);

            let diff = (self.reward(states, plus.view())? - self.reward(states, minus.view())?) / (2.0 * h);
            gradient.column_mut(j).assign(&diff);
        }
        Ok(gradient)
    }
}

impl<T: RewardFunction + ?Sized> RewardFunction for Box<T> {
    fn reward(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        (**self).reward(states, actions)
    }

    fn action_gradient(
        &self,
        states: ArrayView2<'_, f64>,
        actions: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>> {
        (**self).action_gradient(states, actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, Axis};

    struct Cubic;

    impl RewardFunction for Cubic {
        fn reward(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
            Ok(states.sum_axis(Axis(1)) - actions.mapv(|u| u.powi(3)).sum_axis(Axis(1)))
        }
    }

    #[test]
    fn finite_difference_gradient() {
        let states = arr2(&[[1.0, 2.0], [0.0, 0.0]]);
        let actions = arr2(&[[1.0, -2.0], [0.5, 0.0]]);
        let grad = Cubic.action_gradient(states.view(), actions.view()).unwrap();
        assert_abs_diff_eq!(grad[[0, 0]], -3.0, epsilon = 1e-5);
        assert_abs_diff_eq!(grad[[0, 1]], -12.0, epsilon = 1e-5);
        assert_abs_diff_eq!(grad[[1, 0]], -0.75, epsilon = 1e-5);
        assert_abs_diff_eq!(grad[[1, 1]], 0.0, epsilon = 1e-5);
    }
}
