//! Dynamical systems and reward models for region-of-attraction studies
//!
//! This crate provides:
//! - The normalized cart-pole and general linear systems
//! - Quadratic cost rewards
//! - Discrete-time LQR synthesis for linear baselines

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classic;
pub mod linear;
pub mod lqr;
pub mod reward;

// Re-export systems
pub use classic::{CartPole, CartPoleLimits, CartPoleParams};
pub use linear::LinearSystem;

// Re-export rewards and synthesis
pub use lqr::dlqr;
pub use reward::QuadraticReward;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{dlqr, CartPole, LinearSystem, QuadraticReward};
    pub use roa_rl_core::prelude::*;
}
