//! Approximate policy iteration for region-of-attraction studies
//!
//! This crate provides:
//! - The actor-critic trainer [`ApproximatePolicyIteration`]
//! - Rollout estimators for values and regions of attraction
//! - Linear, quadratic and MLP function approximators
//! - Gradient descent and Adam step rules
//! - Linear state-feedback baselines

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod approximator;
pub mod baseline;
pub mod optim;
pub mod rollout;

// Re-export the trainer
pub use api::{ApproximatePolicyIteration, Diagnostics};

// Re-export approximators and baselines
pub use approximator::{Activation, Linear, Mlp, MlpConfig, Quadratic};
pub use baseline::LinearFeedback;

// Re-export optimizers
pub use optim::{build_optimizer, minimize, Adam, GradientDescent, Optimizer};

// Re-export rollout estimators
pub use rollout::{
    compute_roa, reward_rollout, ClosedLoop, ClosedLoopReward, ClosedLoopSystem, PolicyReward, ValueEstimate,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        compute_roa, reward_rollout, Activation, ApproximatePolicyIteration, ClosedLoopSystem, Diagnostics,
        Linear, LinearFeedback, Mlp, MlpConfig, Quadratic,
    };
    pub use roa_rl_core::prelude::*;
}
