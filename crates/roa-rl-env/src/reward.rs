//! Quadratic cost rewards

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use roa_rl_core::error::ensure_columns;
use roa_rl_core::{Result, RewardFunction, RoaError};

/// Negative quadratic cost `r = -(xᵀQx + uᵀRu)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticReward {
    q: Array2<f64>,
    r: Array2<f64>,
}

fn ensure_square(matrix: &Array2<f64>, name: &str) -> Result<()> {
    if matrix.is_empty() || matrix.nrows() != matrix.ncols() {
        return Err(RoaError::ShapeMismatch {
            expected: format!("non-empty square {name}"),
            actual: format!("{:?}", matrix.dim()),
        });
    }
    Ok(())
}

/// Row-wise `x M xᵀ`
fn quadratic_form(x: &ArrayView2<'_, f64>, m: &Array2<f64>) -> Array1<f64> {
    (x.dot(m) * x).sum_axis(Axis(1))
}

impl QuadraticReward {
    /// Build from state cost `Q` and action cost `R`
    pub fn new(q: Array2<f64>, r: Array2<f64>) -> Result<Self> {
        ensure_square(&q, "Q")?;
        ensure_square(&r, "R")?;
        Ok(Self { q, r })
    }

    /// State cost matrix
    #[must_use]
    pub fn q(&self) -> &Array2<f64> {
        &self.q
    }

    /// Action cost matrix
    #[must_use]
    pub fn r(&self) -> &Array2<f64> {
        &self.r
    }
}

impl RewardFunction for QuadraticReward {
    fn reward(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        ensure_columns(&states, self.q.nrows(), "state")?;
        ensure_columns(&actions, self.r.nrows(), "action")?;
        if states.nrows() != actions.nrows() {
            return Err(RoaError::shape_mismatch(states.nrows(), actions.nrows()));
        }
        Ok(-(quadratic_form(&states, &self.q) + quadratic_form(&actions, &self.r)))
    }

    fn action_gradient(
        &self,
        _states: ArrayView2<'_, f64>,
        actions: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>> {
        ensure_columns(&actions, self.r.nrows(), "action")?;
        Ok(-actions.dot(&(&self.r + &self.r.t())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    #[test]
    fn reward_is_negative_cost() {
        let reward = QuadraticReward::new(Array2::eye(2), arr2(&[[0.5]])).unwrap();
        let r = reward
            .reward(arr2(&[[1.0, 2.0], [0.0, 0.0]]).view(), arr2(&[[2.0], [0.0]]).view())
            .unwrap();
        assert_abs_diff_eq!(r[0], -7.0);
        assert_eq!(r[1], 0.0);
    }

    #[test]
    fn analytic_gradient_matches_finite_difference() {
        struct Opaque(QuadraticReward);
        impl RewardFunction for Opaque {
            fn reward(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
                self.0.reward(states, actions)
            }
        }

        // asymmetric R exercises the symmetrized gradient
        let reward = QuadraticReward::new(Array2::eye(1), arr2(&[[1.0, 0.4], [0.0, 2.0]])).unwrap();
        let states = arr2(&[[0.3], [-0.8]]);
        let actions = arr2(&[[0.5, -0.2], [-1.0, 0.9]]);
        let analytic = reward.action_gradient(states.view(), actions.view()).unwrap();
        let numeric = Opaque(reward).action_gradient(states.view(), actions.view()).unwrap();
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert_abs_diff_eq!(a, n, epsilon = 1e-7);
        }
    }

    #[test]
    fn rejects_non_square_costs() {
        assert!(QuadraticReward::new(arr2(&[[1.0, 0.0]]), arr2(&[[1.0]])).is_err());
        assert!(QuadraticReward::new(Array2::eye(2), Array2::zeros((0, 0))).is_err());
    }
}
