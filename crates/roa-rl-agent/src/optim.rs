//! Gradient step rules

use ndarray::{ArrayD, ArrayViewMutD, Zip};

use roa_rl_core::parameters::ensure_views_match;
use roa_rl_core::{FunctionApproximator, OptimizerKind, Parameters, Result, RoaError};

/// Applies one gradient-descent step to a parameter collection in place
pub trait Optimizer {
    /// Step size
    fn learning_rate(&self) -> f64;

    /// Descend along `grads`, writing through `params`
    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: &Parameters) -> Result<()>;
}

/// Minimize an objective by stepping `approximator` along its gradient
pub fn minimize<A>(approximator: &mut A, optimizer: &mut dyn Optimizer, grads: &Parameters) -> Result<()>
where
    A: FunctionApproximator + ?Sized,
{
    if !grads.is_finite() {
        return Err(RoaError::NumericOverflow("non-finite gradient".into()));
    }
    optimizer.step(approximator.parameters_mut(), grads)
}

/// Build the optimizer named by `kind`
#[must_use]
pub fn build_optimizer(kind: OptimizerKind, learning_rate: f64) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::GradientDescent => Box::new(GradientDescent::new(learning_rate)),
        OptimizerKind::Adam { beta1, beta2, epsilon } => {
            Box::new(Adam::new(learning_rate, beta1, beta2, epsilon))
        }
    }
}

/// Plain gradient descent `θ ← θ - η g`
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f64,
}

impl GradientDescent {
    /// Create with step size `learning_rate`
    #[must_use]
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn step(&mut self, mut params: Vec<ArrayViewMutD<'_, f64>>, grads: &Parameters) -> Result<()> {
        ensure_views_match(&params, grads)?;
        for (param, grad) in params.iter_mut().zip(grads.iter()) {
            param.scaled_add(-self.learning_rate, grad);
        }
        Ok(())
    }
}

/// Adam optimizer state
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    momentum: Vec<ArrayD<f64>>,
    velocity: Vec<ArrayD<f64>>,
    t: i32,
}

impl Adam {
    /// Create with explicit decay rates
    #[must_use]
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            momentum: Vec::new(),
            velocity: Vec::new(),
            t: 0,
        }
    }

    /// Steps taken so far
    #[must_use]
    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optimizer for Adam {
    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn step(&mut self, params: Vec<ArrayViewMutD<'_, f64>>, grads: &Parameters) -> Result<()> {
        ensure_views_match(&params, grads)?;
        if self.momentum.is_empty() {
            self.momentum = grads.zeros_like().0;
            self.velocity = grads.zeros_like().0;
        } else {
            Parameters::new(self.momentum.clone()).ensure_same_structure(grads)?;
        }

        self.t = self.t.saturating_add(1);
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.epsilon, self.learning_rate);
        let bias1 = 1.0 - beta1.powi(self.t);
        let bias2 = 1.0 - beta2.powi(self.t);

        for (((param, grad), m), v) in params
            .into_iter()
            .zip(grads.iter())
            .zip(self.momentum.iter_mut())
            .zip(self.velocity.iter_mut())
        {
            Zip::from(param)
                .and(grad)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / bias1;
                    let v_hat = *v / bias2;
                    *p -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
        Ok(())
    }
}
