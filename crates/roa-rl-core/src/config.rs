//! Immutable configuration records for training and rollouts

use serde::{Deserialize, Serialize};

use crate::{Result, RoaError};

/// Gradient step rule used for one approximator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Plain gradient descent
    GradientDescent,
    /// Adam with bias-corrected moments
    Adam {
        /// First moment decay
        beta1: f64,
        /// Second moment decay
        beta2: f64,
        /// Denominator offset
        epsilon: f64,
    },
}

impl Default for OptimizerKind {
    fn default() -> Self {
        Self::GradientDescent
    }
}

impl OptimizerKind {
    /// Adam with the usual defaults
    #[must_use]
    pub fn adam() -> Self {
        Self::Adam {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }

    fn validate(&self) -> Result<()> {
        if let Self::Adam { beta1, beta2, epsilon } = *self {
            if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
                return Err(RoaError::Configuration(format!(
                    "Adam decay rates must lie in [0, 1), got beta1={beta1}, beta2={beta2}"
                )));
            }
            if !(epsilon > 0.0) {
                return Err(RoaError::Configuration(format!(
                    "Adam epsilon must be positive, got {epsilon}"
                )));
            }
        }
        Ok(())
    }
}

/// Hyperparameters of the approximate policy iteration loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrainingConfig {
    /// Outer iterations (K)
    pub outer_iterations: usize,
    /// Gradient steps per policy evaluation phase
    pub value_iters: usize,
    /// Gradient steps per policy improvement phase
    pub policy_iters: usize,
    /// Discount factor
    pub gamma: f64,
    /// Value function learning rate
    pub value_lr: f64,
    /// Policy learning rate
    pub policy_lr: f64,
    /// States per training batch
    pub batch_size: usize,
    /// States in the fixed held-out test set
    pub test_set_size: usize,
    /// Step rule shared by both approximators
    pub optimizer: OptimizerKind,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            outer_iterations: 100,
            value_iters: 200,
            policy_iters: 10,
            gamma: 0.98,
            value_lr: 1e-3,
            policy_lr: 1e-3,
            batch_size: 1000,
            test_set_size: 1000,
            optimizer: OptimizerKind::default(),
        }
    }
}

impl TrainingConfig {
    /// Fail with [`RoaError::Configuration`] on any out-of-range field
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("outer_iterations", self.outer_iterations),
            ("value_iters", self.value_iters),
            ("policy_iters", self.policy_iters),
            ("batch_size", self.batch_size),
            ("test_set_size", self.test_set_size),
        ] {
            if value == 0 {
                return Err(RoaError::Configuration(format!("{name} must be at least 1")));
            }
        }
        if !(0.0..1.0).contains(&self.gamma) {
            return Err(RoaError::Configuration(format!(
                "gamma must lie in [0, 1), got {}",
                self.gamma
            )));
        }
        for (name, lr) in [("value_lr", self.value_lr), ("policy_lr", self.policy_lr)] {
            if !lr.is_finite() || lr <= 0.0 {
                return Err(RoaError::Configuration(format!(
                    "{name} must be finite and positive, got {lr}"
                )));
            }
        }
        self.optimizer.validate()
    }
}

/// Horizon and tolerance shared by both rollout estimators
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolloutSettings {
    /// Maximum number of simulation steps (H)
    pub horizon: usize,
    /// Stopping tolerance (ε)
    pub tolerance: f64,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            horizon: 1000,
            tolerance: 1e-4,
        }
    }
}

impl RolloutSettings {
    /// Create validated settings
    pub fn new(horizon: usize, tolerance: f64) -> Result<Self> {
        let settings = Self { horizon, tolerance };
        settings.validate()?;
        Ok(settings)
    }

    /// Fail unless `horizon >= 1` and `tolerance > 0`
    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(RoaError::Configuration("rollout horizon must be at least 1".into()));
        }
        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return Err(RoaError::Configuration(format!(
                "rollout tolerance must be finite and positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Settings for region-of-attraction rollouts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoaSettings {
    /// Horizon and per-step displacement tolerance
    pub rollout: RolloutSettings,
    /// Radius around the origin a settled state must lie within
    pub target_radius: f64,
}

impl Default for RoaSettings {
    fn default() -> Self {
        Self {
            rollout: RolloutSettings::default(),
            target_radius: 1e-2,
        }
    }
}

impl RoaSettings {
    /// Create validated settings
    pub fn new(horizon: usize, tolerance: f64, target_radius: f64) -> Result<Self> {
        let settings = Self {
            rollout: RolloutSettings { horizon, tolerance },
            target_radius,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the rollout part and the target radius
    pub fn validate(&self) -> Result<()> {
        self.rollout.validate()?;
        if !(self.target_radius > 0.0) {
            return Err(RoaError::Configuration(format!(
                "ROA target radius must be positive, got {}",
                self.target_radius
            )));
        }
        Ok(())
    }
}
