//! Approximate policy iteration
//!
//! Alternates between fitting the value function to the bootstrapped target
//! `r(x, π(x)) + γ V(f(x, π(x)))` and improving the policy against the fitted
//! value function. Both phases draw fresh uniform batches over the normalized
//! state domain and take explicit gradient steps on one approximator at a time.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use roa_rl_core::error::ensure_columns;
use roa_rl_core::value::single_column;
use roa_rl_core::{
    param_change, Dynamics, ExecutionContext, FunctionApproximator, ObjectiveScaling, Parameters, Result,
    RewardFunction, RoaError, TrainingConfig,
};

use crate::optim::{build_optimizer, minimize, Optimizer};

/// Per-iteration training record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Zero-based outer iteration
    pub iteration: usize,
    /// Value objective on the fixed test set after the iteration
    pub value_objective: f64,
    /// Policy objective on the fixed test set after the iteration
    pub policy_objective: f64,
    /// Infinity-norm change of the value parameters during evaluation
    pub value_drift: f64,
    /// Infinity-norm change of the policy parameters during improvement
    pub policy_drift: f64,
}

/// One closed-loop step over a batch
struct Transition {
    actions: Array2<f64>,
    rewards: Array1<f64>,
    next_states: Array2<f64>,
}

fn sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn ensure_finite(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RoaError::NumericOverflow(format!("{what} evaluated to {value}")))
    }
}

/// Actor-critic trainer over a known model
///
/// Owns its collaborators, one optimizer per approximator and a held-out test
/// set drawn once at construction. Randomness comes only from the
/// [`ExecutionContext`] passed to each call.
pub struct ApproximatePolicyIteration<D, R, P, V> {
    dynamics: D,
    reward: R,
    policy: P,
    value: V,
    config: TrainingConfig,
    scaling: ObjectiveScaling,
    value_optimizer: Box<dyn Optimizer>,
    policy_optimizer: Box<dyn Optimizer>,
    test_set: Array2<f64>,
    diagnostics: Vec<Diagnostics>,
}

impl<D, R, P, V> std::fmt::Debug for ApproximatePolicyIteration<D, R, P, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApproximatePolicyIteration")
            .field("config", &self.config)
            .field("scaling", &self.scaling)
            .field("test_set", &self.test_set.dim())
            .field("iterations", &self.diagnostics.len())
            .finish_non_exhaustive()
    }
}

impl<D, R, P, V> ApproximatePolicyIteration<D, R, P, V>
where
    D: Dynamics,
    R: RewardFunction,
    P: FunctionApproximator,
    V: FunctionApproximator,
{
    /// Validate the configuration and collaborator dimensions, then draw the test set
    pub fn new(
        dynamics: D,
        reward: R,
        policy: P,
        value: V,
        config: TrainingConfig,
        scaling: ObjectiveScaling,
        ctx: &mut ExecutionContext,
    ) -> Result<Self> {
        config.validate()?;

        let n = dynamics.state_dim();
        let m = dynamics.action_dim();
        let expected = format!("policy {n}->{m}, value {n}->1");
        let actual = format!(
            "policy {}->{}, value {}->{}",
            policy.input_dim(),
            policy.output_dim(),
            value.input_dim(),
            value.output_dim()
        );
        if policy.input_dim() != n || policy.output_dim() != m || value.input_dim() != n || value.output_dim() != 1 {
            return Err(RoaError::ShapeMismatch { expected, actual });
        }

        let consistent = scaling.value_scale * (1.0 - config.gamma);
        if (consistent - scaling.policy_scale).abs() > 1e-12 * consistent.abs().max(1.0) {
            warn!(
                gamma = config.gamma,
                policy_scale = scaling.policy_scale,
                "objective scaling was derived with a different discount factor"
            );
        }

        let test_set = ctx.sample_uniform(config.test_set_size, n);
        let value_optimizer = build_optimizer(config.optimizer, config.value_lr);
        let policy_optimizer = build_optimizer(config.optimizer, config.policy_lr);
        debug!(state_dim = n, action_dim = m, seed = ctx.seed(), "policy iteration initialized");

        Ok(Self {
            dynamics,
            reward,
            policy,
            value,
            config,
            scaling,
            value_optimizer,
            policy_optimizer,
            test_set,
            diagnostics: Vec::new(),
        })
    }

    fn ensure_batch(&self, states: ArrayView2<'_, f64>) -> Result<()> {
        ensure_columns(&states, self.dynamics.state_dim(), "state")?;
        if states.nrows() == 0 {
            return Err(RoaError::InvalidDomain("objective needs a non-empty batch".into()));
        }
        Ok(())
    }

    fn values(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        single_column(self.value.forward(states)?)
    }

    fn transition(&self, states: ArrayView2<'_, f64>) -> Result<Transition> {
        let actions = self.policy.forward(states)?;
        let rewards = self.reward.reward(states, actions.view())?;
        let next_states = self.dynamics.step(states, actions.view())?;
        Ok(Transition {
            actions,
            rewards,
            next_states,
        })
    }

    /// Objective value and value-parameter gradient on one batch
    fn value_gradient(&self, states: ArrayView2<'_, f64>) -> Result<(f64, Parameters)> {
        self.ensure_batch(states)?;
        let step = self.transition(states)?;
        // the target is treated as a constant
        let targets = &step.rewards + &(self.values(step.next_states.view())? * self.config.gamma);
        let residuals = self.values(states)? - &targets;

        let batch = states.nrows() as f64;
        let scale = self.scaling.value_scale;
        let objective = ensure_finite(
            scale * residuals.mapv(f64::abs).sum() / batch,
            "value objective",
        )?;
        let upstream = residuals.mapv(|d| scale * sign(d) / batch).insert_axis(Axis(1));
        let grads = self.value.backward(states, upstream.view())?.parameters;
        Ok((objective, grads))
    }

    /// Objective value and policy-parameter gradient on one batch
    fn policy_gradient(&self, states: ArrayView2<'_, f64>) -> Result<(f64, Parameters)> {
        self.ensure_batch(states)?;
        let step = self.transition(states)?;
        let gamma = self.config.gamma;
        let returns = &step.rewards + &(self.values(step.next_states.view())? * gamma);

        let batch = states.nrows() as f64;
        let scale = self.scaling.policy_scale;
        let objective = ensure_finite(-scale * returns.sum() / batch, "policy objective")?;

        let ones = Array2::ones((states.nrows(), 1));
        let value_grad = self.value.backward(step.next_states.view(), ones.view())?.inputs;
        let jacobian = self.dynamics.action_jacobian(states, step.actions.view())?;
        let mut action_grad = self.reward.action_gradient(states, step.actions.view())?;

        for ((mut row, jac), dv) in action_grad
            .outer_iter_mut()
            .zip(jacobian.outer_iter())
            .zip(value_grad.outer_iter())
        {
            row.scaled_add(gamma, &jac.t().dot(&dv));
        }
        action_grad *= -scale / batch;

        let grads = self.policy.backward(states, action_grad.view())?.parameters;
        Ok((objective, grads))
    }

    /// `value_scale * mean |V(x) - (r + γ V(x'))|` over `states`
    pub fn value_objective(&self, states: ArrayView2<'_, f64>) -> Result<f64> {
        self.ensure_batch(states)?;
        let step = self.transition(states)?;
        let targets = &step.rewards + &(self.values(step.next_states.view())? * self.config.gamma);
        let residuals = self.values(states)? - &targets;
        let mean = residuals.mapv(f64::abs).sum() / states.nrows() as f64;
        ensure_finite(self.scaling.value_scale * mean, "value objective")
    }

    /// `-policy_scale * mean (r + γ V(x'))` over `states`
    pub fn policy_objective(&self, states: ArrayView2<'_, f64>) -> Result<f64> {
        self.ensure_batch(states)?;
        let step = self.transition(states)?;
        let returns = &step.rewards + &(self.values(step.next_states.view())? * self.config.gamma);
        let mean = returns.sum() / states.nrows() as f64;
        ensure_finite(-self.scaling.policy_scale * mean, "policy objective")
    }

    /// Fit the value function to the current policy, returning the parameter drift
    pub fn evaluate_policy(&mut self, ctx: &mut ExecutionContext) -> Result<f64> {
        let before = self.value.parameters();
        let mut objective = f64::NAN;
        for _ in 0..self.config.value_iters {
            let batch = ctx.sample_uniform(self.config.batch_size, self.dynamics.state_dim());
            let (loss, grads) = self.value_gradient(batch.view())?;
            minimize(&mut self.value, self.value_optimizer.as_mut(), &grads)?;
            objective = loss;
        }
        let drift = param_change(&before, &self.value.parameters())?;
        debug!(objective, drift, "policy evaluation finished");
        Ok(drift)
    }

    /// Improve the policy against the fixed value function, returning the parameter drift
    pub fn improve_policy(&mut self, ctx: &mut ExecutionContext) -> Result<f64> {
        let before = self.policy.parameters();
        let mut objective = f64::NAN;
        for _ in 0..self.config.policy_iters {
            let batch = ctx.sample_uniform(self.config.batch_size, self.dynamics.state_dim());
            let (loss, grads) = self.policy_gradient(batch.view())?;
            minimize(&mut self.policy, self.policy_optimizer.as_mut(), &grads)?;
            objective = loss;
        }
        let drift = param_change(&before, &self.policy.parameters())?;
        debug!(objective, drift, "policy improvement finished");
        Ok(drift)
    }

    /// One evaluation and improvement round, scored on the test set
    pub fn iterate(&mut self, ctx: &mut ExecutionContext) -> Result<Diagnostics> {
        let value_drift = self.evaluate_policy(ctx)?;
        let policy_drift = self.improve_policy(ctx)?;
        let record = Diagnostics {
            iteration: self.diagnostics.len(),
            value_objective: self.value_objective(self.test_set.view())?,
            policy_objective: self.policy_objective(self.test_set.view())?,
            value_drift,
            policy_drift,
        };
        info!(
            iteration = record.iteration,
            value_objective = record.value_objective,
            policy_objective = record.policy_objective,
            value_drift,
            policy_drift,
            "iteration complete"
        );
        self.diagnostics.push(record);
        Ok(record)
    }

    /// Run the configured number of outer iterations
    #[instrument(skip_all, fields(iterations = self.config.outer_iterations, seed = ctx.seed()))]
    pub fn train(&mut self, ctx: &mut ExecutionContext) -> Result<&[Diagnostics]> {
        for _ in 0..self.config.outer_iterations {
            self.iterate(ctx)?;
        }
        if let Some(last) = self.diagnostics.last() {
            info!(policy_objective = last.policy_objective, "training finished");
        }
        Ok(&self.diagnostics)
    }
}

impl<D, R, P, V> ApproximatePolicyIteration<D, R, P, V> {
    /// Current policy
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Current value function
    pub fn value_function(&self) -> &V {
        &self.value
    }

    /// Model dynamics
    pub fn dynamics(&self) -> &D {
        &self.dynamics
    }

    /// Reward model
    pub fn reward(&self) -> &R {
        &self.reward
    }

    /// Training hyperparameters
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Objective scale factors
    pub fn scaling(&self) -> ObjectiveScaling {
        self.scaling
    }

    /// One record per completed iteration
    pub fn diagnostics(&self) -> &[Diagnostics] {
        &self.diagnostics
    }

    /// Held-out states used for scoring
    pub fn test_set(&self) -> &Array2<f64> {
        &self.test_set
    }

    /// Give back the collaborators
    pub fn into_parts(self) -> (D, R, P, V) {
        (self.dynamics, self.reward, self.policy, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approximator::{Activation, Linear, Quadratic};
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;
    use roa_rl_env::{LinearSystem, QuadraticReward};

    type Scalar = ApproximatePolicyIteration<LinearSystem, QuadraticReward, Linear, Quadratic>;

    fn scalar_problem(gain: f64, p: f64, config: TrainingConfig, seed: u64) -> Scalar {
        let system = LinearSystem::new(arr2(&[[0.9]]), arr2(&[[1.0]])).unwrap();
        let reward = QuadraticReward::new(arr2(&[[1.0]]), arr2(&[[1.0]])).unwrap();
        let scaling = ObjectiveScaling::from_costs(reward.q().view(), reward.r().view(), config.gamma).unwrap();
        let policy = Linear::from_weights(arr2(&[[gain]]), None, Activation::Identity).unwrap();
        let value = Quadratic::new(arr2(&[[p]])).unwrap();
        let mut ctx = ExecutionContext::seeded(seed);
        ApproximatePolicyIteration::new(system, reward, policy, value, config, scaling, &mut ctx).unwrap()
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            outer_iterations: 3,
            value_iters: 10,
            policy_iters: 3,
            gamma: 0.9,
            value_lr: 0.5,
            policy_lr: 1.0,
            batch_size: 32,
            test_set_size: 64,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn objectives_at_zero_parameters() {
        let api = scalar_problem(0.0, 0.0, small_config(), 0);
        let states = arr2(&[[0.5], [1.0]]);
        // r_max = 2, so value_scale = 0.5 and policy_scale = 0.05
        assert_abs_diff_eq!(api.value_objective(states.view()).unwrap(), 0.3125, epsilon = 1e-12);
        assert_abs_diff_eq!(api.policy_objective(states.view()).unwrap(), 0.03125, epsilon = 1e-12);
    }

    #[test]
    fn policy_gradient_matches_finite_difference() {
        let w = -0.3;
        let states = arr2(&[[0.2], [-0.7], [0.9]]);
        let api = scalar_problem(w, -2.0, small_config(), 0);
        let (_, grads) = api.policy_gradient(states.view()).unwrap();

        let h = 1e-6;
        let plus = scalar_problem(w + h, -2.0, small_config(), 0).policy_objective(states.view()).unwrap();
        let minus = scalar_problem(w - h, -2.0, small_config(), 0).policy_objective(states.view()).unwrap();
        assert_abs_diff_eq!(grads.0[0][[0, 0]], (plus - minus) / (2.0 * h), epsilon = 1e-8);
    }

    #[test]
    fn value_gradient_matches_finite_difference() {
        let states = arr2(&[[0.2], [-0.7], [0.9]]);
        let p = -0.4;
        let api = scalar_problem(-0.2, p, small_config(), 0);
        let (objective, grads) = api.value_gradient(states.view()).unwrap();
        assert_abs_diff_eq!(objective, api.value_objective(states.view()).unwrap(), epsilon = 1e-12);

        // only the V(x) term depends on P once the target is held fixed
        let targets = {
            let step = api.transition(states.view()).unwrap();
            &step.rewards + &(api.values(step.next_states.view()).unwrap() * 0.9)
        };
        let detached = |p: f64| {
            let v = states.column(0).mapv(|x| p * x * x);
            0.5 * (&v - &targets).mapv(f64::abs).mean().unwrap()
        };
        let h = 1e-7;
        assert_abs_diff_eq!(
            grads.0[0][[0, 0]],
            (detached(p + h) - detached(p - h)) / (2.0 * h),
            epsilon = 1e-6
        );
    }

    #[test]
    fn exact_fit_has_zero_value_gradient() {
        // with u = 0 and r = -x^2, V = p x^2 solves p = -1 + 0.81 γ p
        let p = -1.0 / (1.0 - 0.81 * 0.9);
        let api = scalar_problem(0.0, p, small_config(), 0);
        assert!(api.value_objective(arr2(&[[0.5], [-1.0]]).view()).unwrap() < 1e-12);

        // a zero residual contributes a zero subgradient
        let (objective, grads) = api.value_gradient(arr2(&[[0.0]]).view()).unwrap();
        assert_eq!(objective, 0.0);
        assert_eq!(grads.max_abs(), 0.0);
    }

    #[test]
    fn rejects_mismatched_collaborators() {
        let system = LinearSystem::new(arr2(&[[0.9]]), arr2(&[[1.0]])).unwrap();
        let reward = QuadraticReward::new(arr2(&[[1.0]]), arr2(&[[1.0]])).unwrap();
        let scaling = ObjectiveScaling::from_r_max(2.0, 0.9).unwrap();
        let policy = Linear::zeros(2, 1, false, Activation::Identity);
        let value = Quadratic::zeros(1);
        let mut ctx = ExecutionContext::seeded(0);
        let result = ApproximatePolicyIteration::new(
            system,
            reward,
            policy,
            value,
            small_config(),
            scaling,
            &mut ctx,
        );
        assert!(matches!(result, Err(RoaError::ShapeMismatch { .. })));
    }

    #[test]
    fn rejects_invalid_config() {
        let system = LinearSystem::new(arr2(&[[0.9]]), arr2(&[[1.0]])).unwrap();
        let reward = QuadraticReward::new(arr2(&[[1.0]]), arr2(&[[1.0]])).unwrap();
        let scaling = ObjectiveScaling::from_r_max(2.0, 0.9).unwrap();
        let config = TrainingConfig {
            batch_size: 0,
            ..small_config()
        };
        let mut ctx = ExecutionContext::seeded(0);
        let result = ApproximatePolicyIteration::new(
            system,
            reward,
            Linear::zeros(1, 1, false, Activation::Identity),
            Quadratic::zeros(1),
            config,
            scaling,
            &mut ctx,
        );
        assert!(matches!(result, Err(RoaError::Configuration(_))));
    }

    #[test]
    fn training_records_every_iteration() {
        let mut api = scalar_problem(0.0, 0.0, small_config(), 3);
        let mut ctx = ExecutionContext::seeded(4);
        let diagnostics = api.train(&mut ctx).unwrap();
        assert_eq!(diagnostics.len(), 3);
        for (i, record) in diagnostics.iter().enumerate() {
            assert_eq!(record.iteration, i);
            assert!(record.value_drift >= 0.0);
            assert!(record.policy_drift >= 0.0);
            assert!(record.value_objective.is_finite());
        }
        assert_eq!(api.test_set().dim(), (64, 1));
    }

    #[test]
    fn training_is_reproducible() {
        let run = || {
            let mut api = scalar_problem(0.0, 0.0, small_config(), 11);
            let mut ctx = ExecutionContext::seeded(12);
            api.train(&mut ctx).unwrap().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn diverging_objective_is_reported() {
        // an unstable closed loop evaluated far outside the domain overflows
        let api = scalar_problem(1e200, -1.0, small_config(), 0);
        let states = arr2(&[[1e200]]);
        assert!(matches!(
            api.policy_objective(states.view()),
            Err(RoaError::NumericOverflow(_))
        ));
    }

    #[test]
    fn empty_batch_is_rejected() {
        let api = scalar_problem(0.0, 0.0, small_config(), 0);
        let empty = Array2::<f64>::zeros((0, 1));
        assert!(matches!(
            api.value_objective(empty.view()),
            Err(RoaError::InvalidDomain(_))
        ));
    }
}
