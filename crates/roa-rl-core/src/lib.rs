//! Core traits and types for approximate policy iteration
//!
//! This crate provides the foundational pieces shared by the training loop
//! and the rollout estimators: error taxonomy, parameter collections, the
//! state-space grid, uniform sampling, objective scaling, configuration
//! records and the collaborator traits for dynamics, rewards, policies and
//! value functions.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod approximator;
pub mod config;
pub mod context;
pub mod dynamics;
pub mod error;
pub mod grid;
pub mod parameters;
pub mod policy;
pub mod reward;
pub mod sampling;
pub mod scaling;
pub mod value;

// Re-export core traits and types
pub use approximator::{FunctionApproximator, Gradients};
pub use config::{OptimizerKind, RoaSettings, RolloutSettings, TrainingConfig};
pub use context::ExecutionContext;
pub use dynamics::Dynamics;
pub use error::{Result, RoaError};
pub use grid::{find_nearest, AxisPoints, Grid};
pub use parameters::{param_change, Parameters};
pub use policy::Policy;
pub use reward::RewardFunction;
pub use sampling::sample_uniform;
pub use scaling::ObjectiveScaling;
pub use value::ValueFunction;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        Dynamics, ExecutionContext, FunctionApproximator, Grid, Parameters, Policy, Result,
        RewardFunction, RoaError, TrainingConfig, ValueFunction,
    };
}
