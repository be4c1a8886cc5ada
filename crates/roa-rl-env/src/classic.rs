//! Classic control systems

use ndarray::{arr2, Array1, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};

use roa_rl_core::error::ensure_columns;
use roa_rl_core::{Dynamics, Result, RoaError};

/// Physical constants of the cart-pole
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CartPoleParams {
    /// Gravitational acceleration (m/s²)
    pub gravity: f64,
    /// Cart mass (kg)
    pub mass_cart: f64,
    /// Pole mass (kg)
    pub mass_pole: f64,
    /// Distance from pivot to the pole's center of mass (m)
    pub half_length: f64,
    /// Euler integration step (s)
    pub dt: f64,
}

impl Default for CartPoleParams {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            mass_cart: 1.0,
            mass_pole: 0.1,
            half_length: 0.5,
            dt: 0.01,
        }
    }
}

/// Physical magnitudes that map to ±1 in normalized coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CartPoleLimits {
    /// Cart position (m)
    pub position: f64,
    /// Pole angle (rad)
    pub angle: f64,
    /// Cart velocity (m/s)
    pub velocity: f64,
    /// Pole angular velocity (rad/s)
    pub angular_velocity: f64,
    /// Horizontal force on the cart (N)
    pub force: f64,
}

impl Default for CartPoleLimits {
    fn default() -> Self {
        Self {
            position: 2.4,
            angle: std::f64::consts::FRAC_PI_3,
            velocity: 3.0,
            angular_velocity: 3.0,
            force: 10.0,
        }
    }
}

impl CartPoleLimits {
    fn state_scale(&self) -> [f64; 4] {
        [self.position, self.angle, self.velocity, self.angular_velocity]
    }
}

/// Cart-pole in normalized coordinates
///
/// The state is `[x, θ, v, ω]` with `θ = 0` upright, the action is the
/// horizontal force. Both are divided by [`CartPoleLimits`] so the domain of
/// interest is the unit box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CartPole {
    params: CartPoleParams,
    limits: CartPoleLimits,
}

impl CartPole {
    /// Validate and build
    pub fn new(params: CartPoleParams, limits: CartPoleLimits) -> Result<Self> {
        let positive = [
            ("mass_cart", params.mass_cart),
            ("mass_pole", params.mass_pole),
            ("half_length", params.half_length),
            ("dt", params.dt),
            ("position limit", limits.position),
            ("angle limit", limits.angle),
            ("velocity limit", limits.velocity),
            ("angular velocity limit", limits.angular_velocity),
            ("force limit", limits.force),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(RoaError::Configuration(format!(
                    "cart-pole {name} must be finite and positive, got {value}"
                )));
            }
        }
        if !params.gravity.is_finite() {
            return Err(RoaError::Configuration("cart-pole gravity must be finite".into()));
        }
        Ok(Self { params, limits })
    }

    /// Physical constants
    #[must_use]
    pub fn params(&self) -> &CartPoleParams {
        &self.params
    }

    /// Normalization limits
    #[must_use]
    pub fn limits(&self) -> &CartPoleLimits {
        &self.limits
    }

    /// Physical accelerations `(ẍ, θ̈)` for a physical state and force
    fn accelerations(&self, theta: f64, omega: f64, force: f64) -> (f64, f64) {
        let CartPoleParams {
            gravity,
            mass_cart,
            mass_pole,
            half_length,
            ..
        } = self.params;
        let (sin_theta, cos_theta) = theta.sin_cos();
        let total_mass = mass_cart + mass_pole;
        let pole_mass_length = mass_pole * half_length;

        let temp = (force + pole_mass_length * omega.powi(2) * sin_theta) / total_mass;
        let theta_acc = (gravity * sin_theta - cos_theta * temp)
            / (half_length * (4.0 / 3.0 - mass_pole * cos_theta.powi(2) / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;
        (x_acc, theta_acc)
    }

    /// Continuous-time physical linearization `(A_c, B_c)` about upright
    fn physical_linearization(&self) -> (Array2<f64>, Array1<f64>) {
        let CartPoleParams {
            gravity,
            mass_cart,
            mass_pole,
            half_length,
            ..
        } = self.params;
        let total_mass = mass_cart + mass_pole;
        let pole_mass_length = mass_pole * half_length;
        let effective_length = half_length * (4.0 / 3.0 - mass_pole / total_mass);

        let omega_theta = gravity / effective_length;
        let omega_force = -1.0 / (total_mass * effective_length);
        let v_theta = -pole_mass_length * omega_theta / total_mass;
        let v_force = 1.0 / total_mass - pole_mass_length * omega_force / total_mass;

        let a = arr2(&[
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, v_theta, 0.0, 0.0],
            [0.0, omega_theta, 0.0, 0.0],
        ]);
        (a, Array1::from(vec![0.0, 0.0, v_force, omega_force]))
    }
}

impl Dynamics for CartPole {
    fn state_dim(&self) -> usize {
        4
    }

    fn action_dim(&self) -> usize {
        1
    }

    fn step(&self, states: ArrayView2<'_, f64>, actions: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        ensure_columns(&states, 4, "state")?;
        ensure_columns(&actions, 1, "action")?;
        if states.nrows() != actions.nrows() {
            return Err(RoaError::shape_mismatch(states.nrows(), actions.nrows()));
        }

        let [sx, st, sv, sw] = self.limits.state_scale();
        let dt = self.params.dt;
        let mut next = Array2::zeros(states.raw_dim());
        Zip::from(next.rows_mut())
            .and(states.rows())
            .and(actions.rows())
            .for_each(|mut out, state, action| {
                let (x, theta, v, omega) = (state[0] * sx, state[1] * st, state[2] * sv, state[3] * sw);
                let force = action[0] * self.limits.force;
                let (x_acc, theta_acc) = self.accelerations(theta, omega, force);

                out[0] = (x + dt * v) / sx;
                out[1] = (theta + dt * omega) / st;
                out[2] = (v + dt * x_acc) / sv;
                out[3] = (omega + dt * theta_acc) / sw;
            });
        Ok(next)
    }

    fn linearization(&self) -> Option<(Array2<f64>, Array2<f64>)> {
        let (a_c, b_c) = self.physical_linearization();
        let scale = self.limits.state_scale();
        let dt = self.params.dt;

        // x_n' = D⁻¹ (I + dt A_c) D x_n + D⁻¹ dt B_c F u
        let a = Array2::from_shape_fn((4, 4), |(i, j)| {
            let identity = if i == j { 1.0 } else { 0.0 };
            identity + dt * a_c[[i, j]] * scale[j] / scale[i]
        });
        let b = Array2::from_shape_fn((4, 1), |(i, _)| dt * b_c[i] * self.limits.force / scale[i]);
        Some((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn upright_is_an_equilibrium() {
        let system = CartPole::default();
        let next = system.step(Array2::zeros((1, 4)).view(), Array2::zeros((1, 1)).view()).unwrap();
        assert!(next.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn pole_falls_toward_its_lean() {
        let system = CartPole::default();
        let next = system
            .step(arr2(&[[0.0, 0.1, 0.0, 0.0]]).view(), arr2(&[[0.0]]).view())
            .unwrap();
        assert!(next[[0, 3]] > 0.0);
        // the cart is pushed back under the pole the other way
        assert!(next[[0, 2]] < 0.0);
    }

    #[test]
    fn linearization_matches_finite_differences() {
        let system = CartPole::default();
        let (a, b) = system.linearization().unwrap();
        let h = 1e-6;
        let zero_u = Array2::zeros((1, 1));

        for j in 0..4 {
            let mut plus = Array2::zeros((1, 4));
            plus[[0, j]] = h;
            let mut minus = Array2::zeros((1, 4));
            minus[[0, j]] = -h;
            let diff = (system.step(plus.view(), zero_u.view()).unwrap()
                - system.step(minus.view(), zero_u.view()).unwrap())
                / (2.0 * h);
            for i in 0..4 {
                assert_abs_diff_eq!(a[[i, j]], diff[[0, i]], epsilon = 1e-6);
            }
        }

        let jacobian = system
            .action_jacobian(Array2::zeros((1, 4)).view(), zero_u.view())
            .unwrap();
        for i in 0..4 {
            assert_abs_diff_eq!(b[[i, 0]], jacobian[[0, i, 0]], epsilon = 1e-6);
        }
    }

    #[test]
    fn rejects_bad_parameters_and_shapes() {
        let params = CartPoleParams {
            dt: 0.0,
            ..CartPoleParams::default()
        };
        assert!(CartPole::new(params, CartPoleLimits::default()).is_err());

        let system = CartPole::default();
        assert!(system
            .step(Array2::zeros((2, 4)).view(), Array2::zeros((1, 1)).view())
            .is_err());
        assert!(system
            .step(Array2::zeros((1, 3)).view(), Array2::zeros((1, 1)).view())
            .is_err());
    }
}
