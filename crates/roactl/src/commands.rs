// Subcommand handlers for roactl

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use ndarray::{Array1, Array2, ArrayView2};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use tracing::info;

use roa_rl_agent::{
    compute_roa, reward_rollout, Activation, ApproximatePolicyIteration, ClosedLoopSystem, Linear, LinearFeedback,
    Mlp, MlpConfig, Quadratic, ValueEstimate,
};
use roa_rl_core::{Dynamics, ExecutionContext, FunctionApproximator, Grid, ObjectiveScaling, RewardFunction};
use roa_rl_env::{dlqr, CartPole, LinearSystem, QuadraticReward};

use crate::config::{Architecture, RunConfig, SystemKind};

/// Rollout statistics over the evaluation grid
#[derive(Debug, Serialize)]
pub struct GridSummary {
    pub points: usize,
    pub roa_fraction: f64,
    pub settled_fraction: f64,
    pub mean_value: f64,
}

impl GridSummary {
    fn new(inside: &Array1<bool>, estimate: &ValueEstimate) -> Self {
        let points = inside.len();
        let fraction = |count: usize| if points == 0 { 0.0 } else { count as f64 / points as f64 };
        Self {
            points,
            roa_fraction: fraction(inside.iter().filter(|&&i| i).count()),
            settled_fraction: fraction(estimate.settled.iter().filter(|&&s| s).count()),
            mean_value: estimate.values.mean().unwrap_or(0.0),
        }
    }
}

fn cartpole(config: &RunConfig) -> Result<CartPole> {
    Ok(CartPole::new(config.cartpole, config.limits)?)
}

fn build_system(config: &RunConfig) -> Result<Box<dyn Dynamics>> {
    let cartpole = cartpole(config)?;
    Ok(match config.system {
        SystemKind::Cartpole => Box::new(cartpole),
        SystemKind::Linear => {
            let (a, b) = cartpole
                .linearization()
                .ok_or_else(|| anyhow!("cart-pole has no linearization"))?;
            Box::new(LinearSystem::new(a, b)?)
        }
    })
}

fn build_reward(config: &RunConfig) -> Result<QuadraticReward> {
    let q = Array2::from_diag(&Array1::from(config.state_cost.clone()));
    let r = Array2::from_diag(&Array1::from(config.action_cost.clone()));
    Ok(QuadraticReward::new(q, r)?)
}

fn build_approximator(
    architecture: &Architecture,
    input_dim: usize,
    output_dim: usize,
    output_activation: Activation,
    ctx: &mut ExecutionContext,
) -> Result<Box<dyn FunctionApproximator>> {
    Ok(match architecture {
        Architecture::Linear { saturate } => {
            let activation = if *saturate { Activation::Tanh } else { Activation::Identity };
            Box::new(Linear::zeros(input_dim, output_dim, false, activation))
        }
        Architecture::Quadratic => {
            if output_dim != 1 {
                bail!("a quadratic form has a single output, {output_dim} requested");
            }
            Box::new(Quadratic::zeros(input_dim))
        }
        Architecture::Mlp {
            hidden_dims,
            activation,
        } => {
            let config = MlpConfig {
                input_dim,
                hidden_dims: hidden_dims.clone(),
                output_dim,
                activation: *activation,
                output_activation,
            };
            Box::new(Mlp::new(config, ctx.rng())?)
        }
    })
}

/// LQR gain and cost-to-go for the cart-pole linearization
pub fn lqr_gain(config: &RunConfig) -> Result<(Array2<f64>, Array2<f64>)> {
    let (a, b) = cartpole(config)?
        .linearization()
        .ok_or_else(|| anyhow!("cart-pole has no linearization"))?;
    let reward = build_reward(config)?;
    dlqr(&a, &b, reward.q(), reward.r()).context("LQR synthesis failed")
}

/// Value and ROA rollouts of a closed loop over the configured grid
fn evaluate_on_grid<S, G>(config: &RunConfig, step: &S, reward: &G) -> Result<(Grid, Array1<bool>, ValueEstimate)>
where
    S: roa_rl_agent::ClosedLoop + ?Sized,
    G: roa_rl_agent::ClosedLoopReward + ?Sized,
{
    let grid = Grid::unit(4, config.grid_points)?;
    let states = grid.all_points().view();
    let estimate = reward_rollout(step, reward, states, config.training.gamma, &config.rollout)?;
    let inside = compute_roa(step, states, &config.roa)?;
    Ok((grid, inside, estimate))
}

fn write_report(path: &Path, report: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn train(config: &RunConfig, output: &Path) -> Result<()> {
    let mut ctx = ExecutionContext::seeded(config.seed);
    let dynamics = build_system(config)?;
    let reward = build_reward(config)?;
    let scaling = ObjectiveScaling::from_costs(reward.q().view(), reward.r().view(), config.training.gamma)?;

    let (n, m) = (dynamics.state_dim(), dynamics.action_dim());
    let policy = build_approximator(&config.policy, n, m, Activation::Tanh, &mut ctx)?;
    let value = build_approximator(&config.value, n, 1, Activation::Identity, &mut ctx)?;

    println!("🤖 Training policy iteration");
    println!("   System: {:?}", config.system);
    println!("   Iterations: {}", config.training.outer_iterations);
    println!("   Seed: {}", config.seed);

    let mut api = ApproximatePolicyIteration::new(
        dynamics,
        reward,
        policy,
        value,
        config.training.clone(),
        scaling,
        &mut ctx,
    )?;
    let diagnostics = api.train(&mut ctx)?.to_vec();
    let (dynamics, reward, policy, value) = api.into_parts();

    let step = |x: ArrayView2<'_, f64>| -> roa_rl_core::Result<Array2<f64>> {
        let u = policy.forward(x)?;
        dynamics.step(x, u.view())
    };
    let stage_reward = |x: ArrayView2<'_, f64>| -> roa_rl_core::Result<Array1<f64>> {
        let u = policy.forward(x)?;
        reward.reward(x, u.view())
    };
    let (_, inside, estimate) = evaluate_on_grid(config, &step, &stage_reward)?;
    let summary = GridSummary::new(&inside, &estimate);
    info!(roa_fraction = summary.roa_fraction, "trained policy evaluated");

    let report = json!({
        "timestamp": Utc::now().to_rfc3339(),
        "config": config,
        "diagnostics": diagnostics,
        "policy_parameters": policy.parameters(),
        "value_parameters": value.parameters(),
        "grid": summary,
    });
    write_report(output, &report)?;

    if let Some(last) = diagnostics.last() {
        println!("\n✅ Training finished");
        println!("   Policy objective: {:.6}", last.policy_objective);
        println!("   Value objective: {:.6}", last.value_objective);
    }
    println!("   ROA fraction: {:.3}", summary.roa_fraction);
    println!("   Report: {}", output.display());
    Ok(())
}

pub fn roa(config: &RunConfig, output: Option<&Path>) -> Result<()> {
    let dynamics = build_system(config)?;
    let reward = build_reward(config)?;
    let (gain, _) = lqr_gain(config)?;
    let baseline = LinearFeedback::new(gain, config.saturate_lqr)?;

    let closed_loop = ClosedLoopSystem::new(&*dynamics, &baseline);
    let stage_reward = closed_loop.with_reward(&reward);
    let (grid, inside, estimate) = evaluate_on_grid(config, &closed_loop, &stage_reward)?;
    let summary = GridSummary::new(&inside, &estimate);

    println!("📊 LQR baseline on a {}^{} grid", config.grid_points, grid.ndim());
    println!("   Inside ROA: {:.3}", summary.roa_fraction);
    println!("   Settled values: {:.3}", summary.settled_fraction);
    println!("   Mean value: {:.6}", summary.mean_value);

    if let Some(path) = output {
        let inside_grid = grid.reshape(inside)?;
        let report = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "system": config.system,
            "saturated": config.saturate_lqr,
            "grid": summary,
            "num_points": grid.num_points(),
            "roa": inside_grid,
            "values": grid.reshape(estimate.values)?,
        });
        write_report(path, &report)?;
        println!("   Report: {}", path.display());
    }
    Ok(())
}

pub fn lqr(config: &RunConfig) -> Result<()> {
    let (gain, cost) = lqr_gain(config)?;
    println!("🎯 LQR gain (u = -Kx, normalized coordinates)");
    println!("{}", serde_json::to_string_pretty(&json!({ "K": gain, "P": cost }))?);
    Ok(())
}
