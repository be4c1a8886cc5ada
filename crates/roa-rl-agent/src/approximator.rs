//! Function approximators with analytic gradients
//!
//! Every approximator here implements [`FunctionApproximator`] with an exact
//! backward pass, so both the value regression and the policy objective can
//! be differentiated without an automatic differentiation framework.

use ndarray::{Array1, Array2, ArrayView2, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use roa_rl_core::error::ensure_columns;
use roa_rl_core::value::single_column;
use roa_rl_core::{
    FunctionApproximator, Gradients, Parameters, Policy, Result, RoaError, ValueFunction,
};

/// Elementwise activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// No activation
    #[default]
    Identity,
    /// Hyperbolic tangent, saturating to `[-1, 1]`
    Tanh,
    /// Rectified linear unit
    Relu,
    /// Logistic sigmoid
    Sigmoid,
}

impl Activation {
    /// Apply to a pre-activation batch
    #[must_use]
    pub fn apply(self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Identity => z.clone(),
            Self::Tanh => z.mapv(f64::tanh),
            Self::Relu => z.mapv(|v| v.max(0.0)),
            Self::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }

    /// Derivative given the pre-activation `z` and the output `a`
    #[must_use]
    pub fn derivative(self, z: &Array2<f64>, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Self::Identity => Array2::ones(z.raw_dim()),
            Self::Tanh => a.mapv(|v| 1.0 - v * v),
            Self::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Self::Sigmoid => a.mapv(|v| v * (1.0 - v)),
        }
    }
}

fn ensure_upstream(upstream: &ArrayView2<'_, f64>, batch: usize, output_dim: usize) -> Result<()> {
    if upstream.dim() != (batch, output_dim) {
        return Err(RoaError::shape_mismatch((batch, output_dim), upstream.dim()));
    }
    Ok(())
}

/// Single affine layer `y = act(x W + b)`
///
/// With [`Activation::Tanh`] the output is saturated to `[-1, 1]`, which is
/// how a bounded linear policy is expressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    weights: Array2<f64>,
    bias: Option<Array1<f64>>,
    activation: Activation,
}

impl Linear {
    /// Zero-initialized layer
    #[must_use]
    pub fn zeros(input_dim: usize, output_dim: usize, with_bias: bool, activation: Activation) -> Self {
        Self {
            weights: Array2::zeros((input_dim, output_dim)),
            bias: with_bias.then(|| Array1::zeros(output_dim)),
            activation,
        }
    }

    /// Layer with given weights of shape `(input_dim, output_dim)`
    pub fn from_weights(
        weights: Array2<f64>,
        bias: Option<Array1<f64>>,
        activation: Activation,
    ) -> Result<Self> {
        if let Some(b) = &bias {
            if b.len() != weights.ncols() {
                return Err(RoaError::shape_mismatch(weights.ncols(), b.len()));
            }
        }
        Ok(Self {
            weights,
            bias,
            activation,
        })
    }

    /// Weight matrix
    #[must_use]
    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    /// Bias vector, if any
    #[must_use]
    pub fn bias(&self) -> Option<&Array1<f64>> {
        self.bias.as_ref()
    }

    fn pre_activation(&self, inputs: ArrayView2<'_, f64>) -> Array2<f64> {
        let z = inputs.dot(&self.weights);
        match &self.bias {
            Some(b) => z + b,
            None => z,
        }
    }
}

impl FunctionApproximator for Linear {
    fn input_dim(&self) -> usize {
        self.weights.nrows()
    }

    fn output_dim(&self) -> usize {
        self.weights.ncols()
    }

    fn forward(&self, inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        ensure_columns(&inputs, self.input_dim(), "input")?;
        Ok(self.activation.apply(&self.pre_activation(inputs)))
    }

    fn backward(&self, inputs: ArrayView2<'_, f64>, upstream: ArrayView2<'_, f64>) -> Result<Gradients> {
        ensure_columns(&inputs, self.input_dim(), "input")?;
        ensure_upstream(&upstream, inputs.nrows(), self.output_dim())?;

        let z = self.pre_activation(inputs);
        let a = self.activation.apply(&z);
        let dz = &upstream * &self.activation.derivative(&z, &a);

        let mut tensors = vec![inputs.t().dot(&dz).into_dyn()];
        if self.bias.is_some() {
            tensors.push(dz.sum_axis(Axis(0)).into_dyn());
        }
        Ok(Gradients {
            parameters: Parameters::new(tensors),
            inputs: dz.dot(&self.weights.t()),
        })
    }

    fn parameters(&self) -> Parameters {
        let mut tensors = vec![self.weights.clone().into_dyn()];
        if let Some(b) = &self.bias {
            tensors.push(b.clone().into_dyn());
        }
        Parameters::new(tensors)
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        let mut views = vec![self.weights.view_mut().into_dyn()];
        if let Some(b) = self.bias.as_mut() {
            views.push(b.view_mut().into_dyn());
        }
        views
    }
}

impl Policy for Linear {
    fn action_dim(&self) -> usize {
        self.output_dim()
    }

    fn act(&self, states: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.forward(states)
    }
}

impl ValueFunction for Linear {
    fn value(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        single_column(self.forward(states)?)
    }
}

/// Quadratic form `V(x) = xᵀ P x`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadratic {
    matrix: Array2<f64>,
}

impl Quadratic {
    /// Quadratic form with a square matrix
    pub fn new(matrix: Array2<f64>) -> Result<Self> {
        if !matrix.is_square() {
            return Err(RoaError::shape_mismatch("square matrix", matrix.dim()));
        }
        Ok(Self { matrix })
    }

    /// All-zero form over `dim` states
    #[must_use]
    pub fn zeros(dim: usize) -> Self {
        Self {
            matrix: Array2::zeros((dim, dim)),
        }
    }

    /// The matrix P
    #[must_use]
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }
}

impl FunctionApproximator for Quadratic {
    fn input_dim(&self) -> usize {
        self.matrix.nrows()
    }

    fn output_dim(&self) -> usize {
        1
    }

    fn forward(&self, inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        ensure_columns(&inputs, self.input_dim(), "input")?;
        let values = (inputs.dot(&self.matrix) * &inputs).sum_axis(Axis(1));
        Ok(values.insert_axis(Axis(1)))
    }

    fn backward(&self, inputs: ArrayView2<'_, f64>, upstream: ArrayView2<'_, f64>) -> Result<Gradients> {
        ensure_columns(&inputs, self.input_dim(), "input")?;
        ensure_upstream(&upstream, inputs.nrows(), 1)?;

        let weighted = &inputs * &upstream;
        let grad_matrix = weighted.t().dot(&inputs);
        let symmetric = &self.matrix + &self.matrix.t();
        let grad_inputs = inputs.dot(&symmetric) * &upstream;

        Ok(Gradients {
            parameters: Parameters::new(vec![grad_matrix.into_dyn()]),
            inputs: grad_inputs,
        })
    }

    fn parameters(&self) -> Parameters {
        Parameters::new(vec![self.matrix.clone().into_dyn()])
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        vec![self.matrix.view_mut().into_dyn()]
    }
}

impl ValueFunction for Quadratic {
    fn value(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        single_column(self.forward(states)?)
    }
}

/// MLP configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpConfig {
    /// Input dimension
    pub input_dim: usize,
    /// Hidden layer sizes
    pub hidden_dims: Vec<usize>,
    /// Output dimension
    pub output_dim: usize,
    /// Hidden layer activation
    pub activation: Activation,
    /// Output layer activation
    pub output_activation: Activation,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            input_dim: 4,
            hidden_dims: vec![64, 64],
            output_dim: 1,
            activation: Activation::Tanh,
            output_activation: Activation::Identity,
        }
    }
}

/// Fully connected network with back-propagation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    config: MlpConfig,
    /// Weights for each layer, `(fan_in, fan_out)`
    weights: Vec<Array2<f64>>,
    /// Biases for each layer
    biases: Vec<Array1<f64>>,
}

impl Mlp {
    /// Create a network with Xavier-uniform weights and zero biases
    pub fn new<R: Rng + ?Sized>(config: MlpConfig, rng: &mut R) -> Result<Self> {
        if config.input_dim == 0 || config.output_dim == 0 || config.hidden_dims.contains(&0) {
            return Err(RoaError::Configuration(format!(
                "MLP layer sizes must be positive, got {config:?}"
            )));
        }

        let mut weights = Vec::with_capacity(config.hidden_dims.len() + 1);
        let mut biases = Vec::with_capacity(config.hidden_dims.len() + 1);

        let mut prev_dim = config.input_dim;
        for &dim in config.hidden_dims.iter().chain(std::iter::once(&config.output_dim)) {
            weights.push(Self::xavier_init(prev_dim, dim, rng));
            biases.push(Array1::zeros(dim));
            prev_dim = dim;
        }

        Ok(Self {
            config,
            weights,
            biases,
        })
    }

    /// Xavier initialization for weights
    fn xavier_init<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Array2<f64> {
        let limit = (6.0 / (in_dim + out_dim) as f64).sqrt();
        Array2::from_shape_simple_fn((in_dim, out_dim), || rng.gen_range(-limit..limit))
    }

    /// Network configuration
    #[must_use]
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    fn activation_for(&self, layer: usize) -> Activation {
        if layer + 1 == self.weights.len() {
            self.config.output_activation
        } else {
            self.config.activation
        }
    }

    /// Forward pass keeping every layer's pre-activation and output
    fn forward_cached(&self, inputs: ArrayView2<'_, f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let mut outputs = Vec::with_capacity(self.weights.len() + 1);
        let mut pre_activations = Vec::with_capacity(self.weights.len());
        outputs.push(inputs.to_owned());

        for (layer, (w, b)) in self.weights.iter().zip(&self.biases).enumerate() {
            let z = outputs[layer].dot(w) + b;
            outputs.push(self.activation_for(layer).apply(&z));
            pre_activations.push(z);
        }
        (outputs, pre_activations)
    }
}

impl FunctionApproximator for Mlp {
    fn input_dim(&self) -> usize {
        self.config.input_dim
    }

    fn output_dim(&self) -> usize {
        self.config.output_dim
    }

    fn forward(&self, inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        ensure_columns(&inputs, self.input_dim(), "input")?;
        let (mut outputs, _) = self.forward_cached(inputs);
        outputs
            .pop()
            .ok_or_else(|| RoaError::Configuration("MLP has no layers".into()))
    }

    fn backward(&self, inputs: ArrayView2<'_, f64>, upstream: ArrayView2<'_, f64>) -> Result<Gradients> {
        ensure_columns(&inputs, self.input_dim(), "input")?;
        ensure_upstream(&upstream, inputs.nrows(), self.output_dim())?;

        let (outputs, pre_activations) = self.forward_cached(inputs);
        let layers = self.weights.len();
        let mut grad_weights = Vec::with_capacity(layers);
        let mut grad_biases = Vec::with_capacity(layers);

        let mut delta = upstream.to_owned();
        for layer in (0..layers).rev() {
            let activation = self.activation_for(layer);
            let dz = delta * activation.derivative(&pre_activations[layer], &outputs[layer + 1]);
            grad_weights.push(outputs[layer].t().dot(&dz));
            grad_biases.push(dz.sum_axis(Axis(0)));
            delta = dz.dot(&self.weights[layer].t());
        }
        grad_weights.reverse();
        grad_biases.reverse();

        let tensors = grad_weights
            .into_iter()
            .zip(grad_biases)
            .flat_map(|(w, b)| [w.into_dyn(), b.into_dyn()])
            .collect();

        Ok(Gradients {
            parameters: Parameters::new(tensors),
            inputs: delta,
        })
    }

    fn parameters(&self) -> Parameters {
        let tensors = self
            .weights
            .iter()
            .zip(&self.biases)
            .flat_map(|(w, b)| [w.clone().into_dyn(), b.clone().into_dyn()])
            .collect();
        Parameters::new(tensors)
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        self.weights
            .iter_mut()
            .zip(self.biases.iter_mut())
            .flat_map(|(w, b)| [w.view_mut().into_dyn(), b.view_mut().into_dyn()])
            .collect()
    }
}

impl Policy for Mlp {
    fn action_dim(&self) -> usize {
        self.output_dim()
    }

    fn act(&self, states: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.forward(states)
    }
}

impl ValueFunction for Mlp {
    fn value(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        single_column(self.forward(states)?)
    }
}
