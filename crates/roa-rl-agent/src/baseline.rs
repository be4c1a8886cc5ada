//! Fixed linear state-feedback baselines

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use roa_rl_core::error::ensure_columns;
use roa_rl_core::{Policy, Result, RoaError};

/// State feedback `u = -K x`, optionally clipped to `[-1, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFeedback {
    gain: Array2<f64>,
    saturate: bool,
}

impl LinearFeedback {
    /// Wrap a gain of shape `(action_dim, state_dim)`
    pub fn new(gain: Array2<f64>, saturate: bool) -> Result<Self> {
        if gain.is_empty() {
            return Err(RoaError::InvalidDomain("feedback gain must be non-empty".into()));
        }
        if gain.iter().any(|k| !k.is_finite()) {
            return Err(RoaError::NumericOverflow("feedback gain has non-finite entries".into()));
        }
        Ok(Self { gain, saturate })
    }

    /// Gain matrix `K`
    #[must_use]
    pub fn gain(&self) -> &Array2<f64> {
        &self.gain
    }

    /// State dimension the gain expects
    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.gain.ncols()
    }

    /// Whether actions are clipped
    #[must_use]
    pub fn saturates(&self) -> bool {
        self.saturate
    }
}

impl Policy for LinearFeedback {
    fn action_dim(&self) -> usize {
        self.gain.nrows()
    }

    fn act(&self, states: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        ensure_columns(&states, self.state_dim(), "state")?;
        let actions = -states.dot(&self.gain.t());
        Ok(if self.saturate {
            actions.mapv(|u| u.clamp(-1.0, 1.0))
        } else {
            actions
        })
    }
}
