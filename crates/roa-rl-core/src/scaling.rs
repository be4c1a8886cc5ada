//! Objective scaling derived from the reward's worst-case magnitude

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::{Result, RoaError};

/// Scale factors applied to the value and policy objectives
///
/// With `r_max = 1ᵀQ1 + 1ᵀR1` over the normalized domain, the value
/// objective is multiplied by `1 / r_max` and the policy objective by
/// `(1 - γ) / r_max`, so both gradients stay commensurate across reward
/// magnitudes and discount factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveScaling {
    /// Worst-case per-step cost magnitude
    pub r_max: f64,
    /// Multiplier for the value-regression objective
    pub value_scale: f64,
    /// Multiplier for the policy objective
    pub policy_scale: f64,
}

impl ObjectiveScaling {
    /// Derive the scaling from state and action cost matrices
    pub fn from_costs(q: ArrayView2<'_, f64>, r: ArrayView2<'_, f64>, gamma: f64) -> Result<Self> {
        Self::from_r_max(q.sum() + r.sum(), gamma)
    }

    /// Derive the scaling from a known worst-case cost magnitude
    pub fn from_r_max(r_max: f64, gamma: f64) -> Result<Self> {
        if !r_max.is_finite() || r_max <= 0.0 {
            return Err(RoaError::Configuration(format!(
                "worst-case reward magnitude must be finite and positive, got {r_max}"
            )));
        }
        if !(0.0..1.0).contains(&gamma) {
            return Err(RoaError::Configuration(format!(
                "discount factor must lie in [0, 1), got {gamma}"
            )));
        }
        Ok(Self {
            r_max,
            value_scale: 1.0 / r_max,
            policy_scale: (1.0 - gamma) / r_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, Array2};

    #[test]
    fn scaling_from_cost_matrices() {
        let q = Array2::<f64>::eye(4);
        let r = arr2(&[[0.1]]);
        let scaling = ObjectiveScaling::from_costs(q.view(), r.view(), 0.98).unwrap();
        assert_abs_diff_eq!(scaling.r_max, 4.1, epsilon = 1e-12);
        assert_abs_diff_eq!(scaling.value_scale, 1.0 / 4.1, epsilon = 1e-12);
        assert_abs_diff_eq!(scaling.policy_scale, 0.02 / 4.1, epsilon = 1e-12);
    }

    #[test]
    fn off_diagonal_terms_count() {
        let q = arr2(&[[1.0, 0.5], [0.5, 1.0]]);
        let r = arr2(&[[1.0]]);
        let scaling = ObjectiveScaling::from_costs(q.view(), r.view(), 0.0).unwrap();
        assert_abs_diff_eq!(scaling.r_max, 4.0);
        assert_abs_diff_eq!(scaling.policy_scale, scaling.value_scale);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        assert!(ObjectiveScaling::from_r_max(0.0, 0.9).is_err());
        assert!(ObjectiveScaling::from_r_max(f64::NAN, 0.9).is_err());
        assert!(ObjectiveScaling::from_r_max(1.0, 1.0).is_err());
        assert!(ObjectiveScaling::from_r_max(1.0, -0.1).is_err());
    }
}
