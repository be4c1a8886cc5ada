//! Rollout-based estimators for the value function and the region of attraction
//!
//! Both estimators advance a whole batch in lock-step, one vectorized call of
//! the closed-loop map per time step. Termination is decided per trajectory:
//! once a row settles (or diverges) it is frozen and dropped from the batch
//! handed to the map, so later steps only simulate active rows. Outputs are
//! always aligned with the input batch order.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use roa_rl_core::{Dynamics, Policy, Result, RewardFunction, RoaError, RoaSettings, RolloutSettings};

/// Closed-loop transition map `x_{t+1} = step(x_t)`
pub trait ClosedLoop {
    /// Advance every row by one step
    fn step(&self, states: ArrayView2<'_, f64>) -> Result<Array2<f64>>;
}

impl<F> ClosedLoop for F
where
    F: Fn(ArrayView2<'_, f64>) -> Result<Array2<f64>>,
{
    fn step(&self, states: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self(states)
    }
}

/// Closed-loop reward map `r_t = reward(x_t)`
pub trait ClosedLoopReward {
    /// Reward for every row
    fn reward(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>>;
}

impl<F> ClosedLoopReward for F
where
    F: Fn(ArrayView2<'_, f64>) -> Result<Array1<f64>>,
{
    fn reward(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self(states)
    }
}

/// Dynamics closed with a state-feedback policy
#[derive(Debug, Clone, Copy)]
pub struct ClosedLoopSystem<'a, D: ?Sized, P: ?Sized> {
    /// Open-loop dynamics
    pub dynamics: &'a D,
    /// Feedback policy
    pub policy: &'a P,
}

impl<'a, D: Dynamics + ?Sized, P: Policy + ?Sized> ClosedLoopSystem<'a, D, P> {
    /// Close `dynamics` with `policy`
    pub fn new(dynamics: &'a D, policy: &'a P) -> Self {
        Self { dynamics, policy }
    }

    /// Reward map along this closed loop
    pub fn with_reward<R: RewardFunction + ?Sized>(&self, reward: &'a R) -> PolicyReward<'a, R, P> {
        PolicyReward {
            reward,
            policy: self.policy,
        }
    }
}

impl<D: Dynamics + ?Sized, P: Policy + ?Sized> ClosedLoop for ClosedLoopSystem<'_, D, P> {
    fn step(&self, states: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let actions = self.policy.act(states)?;
        self.dynamics.step(states, actions.view())
    }
}

/// Reward evaluated at the policy's action, `r(x, π(x))`
#[derive(Debug, Clone, Copy)]
pub struct PolicyReward<'a, R: ?Sized, P: ?Sized> {
    /// Reward model
    pub reward: &'a R,
    /// Feedback policy
    pub policy: &'a P,
}

impl<R: RewardFunction + ?Sized, P: Policy + ?Sized> ClosedLoopReward for PolicyReward<'_, R, P> {
    fn reward(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        let actions = self.policy.act(states)?;
        self.reward.reward(states, actions.view())
    }
}

/// Per-trajectory result of [`reward_rollout`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEstimate {
    /// Accumulated discounted reward, one per initial state
    pub values: Array1<f64>,
    /// Whether the trajectory's tail fell below tolerance before the horizon
    pub settled: Array1<bool>,
}

impl ValueEstimate {
    fn empty(batch: usize) -> Self {
        Self {
            values: Array1::zeros(batch),
            settled: Array1::from_elem(batch, false),
        }
    }
}

fn ensure_rows(output_rows: usize, expected: usize, what: &str) -> Result<()> {
    if output_rows != expected {
        return Err(RoaError::ShapeMismatch {
            expected: format!("{expected} {what} rows"),
            actual: format!("{output_rows}"),
        });
    }
    Ok(())
}

fn is_finite_row(row: ArrayView1<'_, f64>) -> bool {
    row.iter().all(|v| v.is_finite())
}

fn norm(row: ArrayView1<'_, f64>) -> f64 {
    row.dot(&row).sqrt()
}

/// Estimate the discounted value of each initial state by simulation
///
/// Accumulates `γ^t reward(x_t)` per trajectory. A trajectory settles once its
/// contribution at the current step is smaller than `settings.tolerance` in
/// magnitude; its sum is frozen from then on. The simulation stops after
/// `settings.horizon` reward evaluations or when every trajectory has settled.
/// A trajectory whose reward or state becomes non-finite keeps its last
/// finite sum and is reported as not settled.
pub fn reward_rollout<C, G>(
    closed_loop: &C,
    reward: &G,
    states: ArrayView2<'_, f64>,
    gamma: f64,
    settings: &RolloutSettings,
) -> Result<ValueEstimate>
where
    C: ClosedLoop + ?Sized,
    G: ClosedLoopReward + ?Sized,
{
    settings.validate()?;
    if !(0.0..=1.0).contains(&gamma) {
        return Err(RoaError::Configuration(format!(
            "rollout discount must lie in [0, 1], got {gamma}"
        )));
    }

    let batch = states.nrows();
    let mut estimate = ValueEstimate::empty(batch);
    if batch == 0 {
        return Ok(estimate);
    }

    let mut active: Vec<usize> = (0..batch).collect();
    let mut current = states.to_owned();
    let mut discount = 1.0;
    let mut diverged = 0_usize;
    let mut steps = 0_usize;

    for t in 0..settings.horizon {
        let rewards = reward.reward(current.view())?;
        ensure_rows(rewards.len(), active.len(), "reward")?;
        steps = t + 1;

        let mut keep = Vec::with_capacity(active.len());
        for (row, (&index, &r)) in active.iter().zip(rewards.iter()).enumerate() {
            let contribution = discount * r;
            if !contribution.is_finite() {
                diverged += 1;
                continue;
            }
            estimate.values[index] += contribution;
            if contribution.abs() < settings.tolerance {
                estimate.settled[index] = true;
            } else {
                keep.push(row);
            }
        }

        if keep.is_empty() || t + 1 == settings.horizon {
            break;
        }

        let next = closed_loop.step(current.select(Axis(0), &keep).view())?;
        ensure_rows(next.nrows(), keep.len(), "state")?;

        let finite: Vec<usize> = (0..next.nrows()).filter(|&r| is_finite_row(next.row(r))).collect();
        diverged += next.nrows() - finite.len();
        active = finite.iter().map(|&r| active[keep[r]]).collect();
        current = if finite.len() == next.nrows() {
            next
        } else {
            next.select(Axis(0), &finite)
        };
        if active.is_empty() {
            break;
        }
        discount *= gamma;
    }

    if diverged > 0 {
        warn!(diverged, batch, "reward rollout hit non-finite values");
    }
    let settled = estimate.settled.iter().filter(|&&s| s).count();
    debug!(batch, settled, steps, "reward rollout finished");
    Ok(estimate)
}

/// Flag each initial state whose trajectory converges to the origin
///
/// A trajectory is inside the region of attraction if, within the horizon,
/// its per-step displacement `‖x_{t+1} - x_t‖` drops below the tolerance and
/// the settled state lies within `target_radius` of the origin. Trajectories
/// that never settle, or that produce non-finite states, are outside.
pub fn compute_roa<C>(closed_loop: &C, states: ArrayView2<'_, f64>, settings: &RoaSettings) -> Result<Array1<bool>>
where
    C: ClosedLoop + ?Sized,
{
    settings.validate()?;
    let RoaSettings {
        rollout: RolloutSettings { horizon, tolerance },
        target_radius,
    } = *settings;

    let batch = states.nrows();
    let mut inside = Array1::from_elem(batch, false);
    if batch == 0 {
        return Ok(inside);
    }

    let mut active: Vec<usize> = (0..batch).filter(|&r| is_finite_row(states.row(r))).collect();
    let mut diverged = batch - active.len();
    let mut current = states.select(Axis(0), &active);
    let mut settled = 0_usize;

    for _ in 0..horizon {
        if active.is_empty() {
            break;
        }
        let next = closed_loop.step(current.view())?;
        ensure_rows(next.nrows(), active.len(), "state")?;

        let mut keep = Vec::with_capacity(active.len());
        for (row, (x, x_next)) in current.outer_iter().zip(next.outer_iter()).enumerate() {
            if !is_finite_row(x_next) {
                diverged += 1;
                continue;
            }
            let displacement = norm((&x_next - &x).view());
            if displacement < tolerance {
                settled += 1;
                inside[active[row]] = norm(x_next) <= target_radius;
            } else {
                keep.push(row);
            }
        }

        active = keep.iter().map(|&r| active[r]).collect();
        current = next.select(Axis(0), &keep);
    }

    if diverged > 0 {
        warn!(diverged, batch, "ROA rollout hit non-finite states");
    }
    let count = inside.iter().filter(|&&i| i).count();
    debug!(batch, settled, inside = count, unsettled = active.len(), "ROA rollout finished");
    Ok(inside)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, Array2};
    use proptest::prelude::*;
    use roa_rl_core::Grid;
    use std::cell::Cell;

    fn contracting(x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        Ok(x.mapv(|v| 0.5 * v))
    }

    fn neg_square(x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        Ok(-x.map_axis(Axis(1), |row| row.dot(&row)))
    }

    #[test]
    fn zero_reward_at_fixed_point_sums_to_zero() {
        let identity = |x: ArrayView2<'_, f64>| -> Result<Array2<f64>> { Ok(x.to_owned()) };
        let zero = |x: ArrayView2<'_, f64>| -> Result<Array1<f64>> { Ok(Array1::zeros(x.nrows())) };
        let grid = Grid::unit(2, 5).unwrap();
        let settings = RolloutSettings::new(100, 1e-6).unwrap();
        let estimate = reward_rollout(&identity, &zero, grid.all_points().view(), 0.99, &settings).unwrap();
        assert!(estimate.values.iter().all(|&v| v == 0.0));
        assert!(estimate.settled.iter().all(|&s| s));
    }

    #[test]
    fn reward_rollout_matches_geometric_sum() {
        // x_t = 0.5^t x0, r = -x^2, so the sum is -x0^2 / (1 - γ/4)
        let states = arr2(&[[1.0], [-0.5], [0.0]]);
        let settings = RolloutSettings::new(500, 1e-12).unwrap();
        let estimate = reward_rollout(&contracting, &neg_square, states.view(), 0.9, &settings).unwrap();
        for (i, x0) in [1.0_f64, -0.5, 0.0].iter().enumerate() {
            assert_abs_diff_eq!(estimate.values[i], -x0 * x0 / (1.0 - 0.9 / 4.0), epsilon = 1e-10);
            assert!(estimate.settled[i]);
        }
    }

    #[test]
    fn reward_rollout_stops_at_horizon() {
        let identity = |x: ArrayView2<'_, f64>| -> Result<Array2<f64>> { Ok(x.to_owned()) };
        let states = arr2(&[[1.0]]);
        let settings = RolloutSettings::new(3, 1e-6).unwrap();
        let estimate = reward_rollout(&identity, &neg_square, states.view(), 1.0, &settings).unwrap();
        assert_abs_diff_eq!(estimate.values[0], -3.0);
        assert!(!estimate.settled[0]);
    }

    #[test]
    fn settled_trajectories_are_not_simulated() {
        let calls = Cell::new(0_usize);
        let rows_seen = Cell::new(0_usize);
        let step = |x: ArrayView2<'_, f64>| -> Result<Array2<f64>> {
            calls.set(calls.get() + 1);
            rows_seen.set(rows_seen.get() + x.nrows());
            Ok(x.mapv(|v| 0.5 * v))
        };
        // the zero state settles at t = 0 and must not be stepped
        let states = arr2(&[[0.0], [1.0]]);
        let settings = RolloutSettings::new(5, 1e-12).unwrap();
        reward_rollout(&step, &neg_square, states.view(), 1.0, &settings).unwrap();
        assert_eq!(calls.get(), 4);
        assert_eq!(rows_seen.get(), 4);
    }

    #[test]
    fn empty_batch_performs_no_steps() {
        let called = Cell::new(false);
        let step = |x: ArrayView2<'_, f64>| -> Result<Array2<f64>> {
            called.set(true);
            Ok(x.to_owned())
        };
        let reward = |x: ArrayView2<'_, f64>| -> Result<Array1<f64>> {
            called.set(true);
            Ok(Array1::zeros(x.nrows()))
        };
        let empty = Array2::<f64>::zeros((0, 3));
        let estimate = reward_rollout(&step, &reward, empty.view(), 0.9, &RolloutSettings::default()).unwrap();
        assert!(estimate.values.is_empty());
        let roa = compute_roa(&step, empty.view(), &RoaSettings::default()).unwrap();
        assert!(roa.is_empty());
        assert!(!called.get());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let states = arr2(&[[1.0]]);
        let bad_horizon = RolloutSettings {
            horizon: 0,
            tolerance: 1e-3,
        };
        assert!(matches!(
            reward_rollout(&contracting, &neg_square, states.view(), 0.9, &bad_horizon),
            Err(RoaError::Configuration(_))
        ));
        let bad_tolerance = RoaSettings {
            rollout: RolloutSettings {
                horizon: 10,
                tolerance: 0.0,
            },
            target_radius: 0.1,
        };
        assert!(matches!(
            compute_roa(&contracting, states.view(), &bad_tolerance),
            Err(RoaError::Configuration(_))
        ));
    }

    #[test]
    fn contracting_map_is_inside_for_sufficient_horizon() {
        let tolerance = 1e-3_f64;
        let min_horizon = (tolerance.ln() / 0.5_f64.ln()).ceil() as usize;
        let grid = Grid::unit(1, 21).unwrap();
        for horizon in [min_horizon, min_horizon + 1, 5 * min_horizon] {
            let settings = RoaSettings::new(horizon, tolerance, 1e-2).unwrap();
            let roa = compute_roa(&contracting, grid.all_points().view(), &settings).unwrap();
            assert!(roa.iter().all(|&inside| inside), "horizon {horizon}");
        }
    }

    #[test]
    fn unsettled_and_far_fixed_points_are_outside() {
        let expanding = |x: ArrayView2<'_, f64>| -> Result<Array2<f64>> { Ok(x.mapv(|v| 1.1 * v)) };
        let states = arr2(&[[0.5], [0.0]]);
        let settings = RoaSettings::new(50, 1e-3, 1e-2).unwrap();
        let roa = compute_roa(&expanding, states.view(), &settings).unwrap();
        assert_eq!(roa.to_vec(), vec![false, true]);

        // converges, but to 0.5 rather than the origin
        let shifted = |x: ArrayView2<'_, f64>| -> Result<Array2<f64>> { Ok(x.mapv(|v| 0.5 * v + 0.25)) };
        let roa = compute_roa(&shifted, states.view(), &settings).unwrap();
        assert_eq!(roa.to_vec(), vec![false, false]);
    }

    #[test]
    fn non_finite_trajectories_are_isolated() {
        // rows with |x| > 1 blow up to infinity, the rest contract
        let blow_up = |x: ArrayView2<'_, f64>| -> Result<Array2<f64>> {
            Ok(x.mapv(|v| if v.abs() > 1.0 { v * f64::MAX } else { 0.5 * v }))
        };
        let states = arr2(&[[0.5], [2.0], [f64::NAN], [-0.25]]);
        let settings = RoaSettings::new(50, 1e-6, 1e-3).unwrap();
        let roa = compute_roa(&blow_up, states.view(), &settings).unwrap();
        assert_eq!(roa.to_vec(), vec![true, false, false, true]);

        let rollout = RolloutSettings::new(200, 1e-12).unwrap();
        let estimate = reward_rollout(&blow_up, &neg_square, states.view(), 0.9, &rollout).unwrap();
        assert!(estimate.values.iter().all(|v| v.is_finite()));
        assert_eq!(estimate.settled.to_vec(), vec![true, false, false, true]);
        // the exploding row keeps its first, finite contribution
        assert_abs_diff_eq!(estimate.values[1], -4.0);
    }

    #[test]
    fn closed_loop_system_uses_policy() {
        use crate::approximator::{Activation, Linear};
        use roa_rl_env::{LinearSystem, QuadraticReward};

        let system = LinearSystem::new(arr2(&[[1.0]]), arr2(&[[1.0]])).unwrap();
        let policy = Linear::from_weights(arr2(&[[-0.5]]), None, Activation::Identity).unwrap();
        let reward = QuadraticReward::new(arr2(&[[1.0]]), arr2(&[[1.0]])).unwrap();
        let closed = ClosedLoopSystem::new(&system, &policy);

        let next = closed.step(arr2(&[[1.0]]).view()).unwrap();
        assert_abs_diff_eq!(next[[0, 0]], 0.5);

        // x_t = 0.5^t, u_t = -0.5^{t+1}, r_t = -(1.25) 0.25^t
        let states = arr2(&[[1.0]]);
        let settings = RolloutSettings::new(1000, 1e-14).unwrap();
        let estimate =
            reward_rollout(&closed, &closed.with_reward(&reward), states.view(), 1.0, &settings).unwrap();
        assert_abs_diff_eq!(estimate.values[0], -1.25 / 0.75, epsilon = 1e-10);
    }

    proptest! {
        #[test]
        fn outputs_follow_input_order(values in proptest::collection::vec(-3.0..3.0_f64, 1..24),
                                      shift in 0usize..24) {
            let step = |x: ArrayView2<'_, f64>| -> Result<Array2<f64>> {
                Ok(x.mapv(|v| if v.abs() < 1.5 { 0.6 * v } else { 1.2 * v }))
            };
            let n = values.len();
            let states = Array2::from_shape_vec((n, 1), values.clone()).unwrap();
            let order: Vec<usize> = (0..n).map(|i| (i + shift) % n).collect();
            let permuted = states.select(Axis(0), &order);

            let roa_settings = RoaSettings::new(60, 1e-4, 1e-3).unwrap();
            let roa = compute_roa(&step, states.view(), &roa_settings).unwrap();
            let roa_permuted = compute_roa(&step, permuted.view(), &roa_settings).unwrap();

            let rollout = RolloutSettings::new(60, 1e-8).unwrap();
            let value = reward_rollout(&step, &neg_square, states.view(), 0.95, &rollout).unwrap();
            let value_permuted = reward_rollout(&step, &neg_square, permuted.view(), 0.95, &rollout).unwrap();

            for (k, &i) in order.iter().enumerate() {
                prop_assert_eq!(roa_permuted[k], roa[i]);
                prop_assert_eq!(value_permuted.values[k], value.values[i]);
                prop_assert_eq!(value_permuted.settled[k], value.settled[i]);
            }
        }
    }
}
