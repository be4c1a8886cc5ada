// Run configuration shared by every roactl subcommand

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

use roa_rl_agent::Activation;
use roa_rl_core::{RoaSettings, RolloutSettings, TrainingConfig};
use roa_rl_env::{CartPoleLimits, CartPoleParams};

/// Which model the trainer runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    /// Nonlinear cart-pole
    #[default]
    Cartpole,
    /// Cart-pole linearized about upright
    Linear,
}

/// Function approximator family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Architecture {
    /// Single affine layer, tanh-saturated when `saturate` is set
    Linear { saturate: bool },
    /// Quadratic form `xᵀPx`, value functions only
    Quadratic,
    /// Fully connected network
    Mlp {
        hidden_dims: Vec<usize>,
        activation: Activation,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub seed: u64,
    pub system: SystemKind,
    pub cartpole: CartPoleParams,
    pub limits: CartPoleLimits,
    /// Diagonal of the state cost `Q`
    pub state_cost: Vec<f64>,
    /// Diagonal of the action cost `R`
    pub action_cost: Vec<f64>,
    pub training: TrainingConfig,
    pub policy: Architecture,
    pub value: Architecture,
    pub rollout: RolloutSettings,
    pub roa: RoaSettings,
    /// Grid vertices per axis for rollout evaluation
    pub grid_points: usize,
    /// Clip the LQR baseline to the unit action box
    pub saturate_lqr: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            system: SystemKind::default(),
            cartpole: CartPoleParams::default(),
            limits: CartPoleLimits::default(),
            state_cost: vec![1.0, 1.0, 0.1, 0.1],
            action_cost: vec![0.1],
            training: TrainingConfig::default(),
            policy: Architecture::Mlp {
                hidden_dims: vec![32, 32],
                activation: Activation::Tanh,
            },
            value: Architecture::Mlp {
                hidden_dims: vec![64, 64],
                activation: Activation::Tanh,
            },
            rollout: RolloutSettings::default(),
            roa: RoaSettings::default(),
            grid_points: 11,
            saturate_lqr: true,
        }
    }
}

impl RunConfig {
    /// Load from a JSON file, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.rollout.validate()?;
        self.roa.validate()?;
        if self.state_cost.len() != 4 || self.action_cost.len() != 1 {
            bail!(
                "cart-pole costs need 4 state and 1 action entries, got {} and {}",
                self.state_cost.len(),
                self.action_cost.len()
            );
        }
        if self.grid_points < 2 {
            bail!("grid_points must be at least 2, got {}", self.grid_points);
        }
        if matches!(self.policy, Architecture::Quadratic) {
            bail!("a quadratic form cannot be used as a policy");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_overrides_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "seed": 7,
                "system": "linear",
                "training": {"outer_iterations": 2},
                "value": {"kind": "quadratic"},
                "policy": {"kind": "linear", "saturate": true}
            }"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.system, SystemKind::Linear);
        assert_eq!(config.training.outer_iterations, 2);
        assert_eq!(config.value, Architecture::Quadratic);
        assert_eq!(config.grid_points, RunConfig::default().grid_points);
    }

    #[test]
    fn rejects_bad_costs_and_policies() {
        let config = RunConfig {
            state_cost: vec![1.0],
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            policy: Architecture::Quadratic,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
