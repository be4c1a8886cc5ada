//! Differentiable parametric function approximators

use ndarray::{Array2, ArrayView2, ArrayViewMutD};

use crate::parameters::{ensure_views_match, Parameters};
use crate::Result;

/// Vector-Jacobian products returned by [`FunctionApproximator::backward`]
#[derive(Debug, Clone)]
pub struct Gradients {
    /// Gradient with respect to each parameter tensor, same structure as the parameters
    pub parameters: Parameters,
    /// Gradient with respect to the inputs, shape `(batch, input_dim)`
    pub inputs: Array2<f64>,
}

/// Batched differentiable mapping with a mutable ordered parameter collection
///
/// `backward` takes the upstream gradient of a scalar objective with respect
/// to the outputs and returns the gradient with respect to the parameters and
/// the inputs. It never mutates the approximator.
pub trait FunctionApproximator {
    /// Input dimension
    fn input_dim(&self) -> usize;

    /// Output dimension
    fn output_dim(&self) -> usize;

    /// Evaluate on a batch, shape `(batch, output_dim)`
    fn forward(&self, inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>>;

    /// Back-propagate `upstream` of shape `(batch, output_dim)`
    fn backward(&self, inputs: ArrayView2<'_, f64>, upstream: ArrayView2<'_, f64>) -> Result<Gradients>;

    /// Snapshot of the parameter collection
    fn parameters(&self) -> Parameters;

    /// Mutable views over the parameter tensors, in the order of [`Self::parameters`]
    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>>;

    /// Overwrite every parameter tensor
    fn set_parameters(&mut self, params: &Parameters) -> Result<()> {
        let mut views = self.parameters_mut();
        ensure_views_match(&views, params)?;
        for (view, tensor) in views.iter_mut().zip(params.iter()) {
            view.assign(tensor);
        }
        Ok(())
    }
}

impl<T: FunctionApproximator + ?Sized> FunctionApproximator for Box<T> {
    fn input_dim(&self) -> usize {
        (**self).input_dim()
    }

    fn output_dim(&self) -> usize {
        (**self).output_dim()
    }

    fn forward(&self, inputs: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        (**self).forward(inputs)
    }

    fn backward(&self, inputs: ArrayView2<'_, f64>, upstream: ArrayView2<'_, f64>) -> Result<Gradients> {
        (**self).backward(inputs, upstream)
    }

    fn parameters(&self) -> Parameters {
        (**self).parameters()
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f64>> {
        (**self).parameters_mut()
    }

    fn set_parameters(&mut self, params: &Parameters) -> Result<()> {
        (**self).set_parameters(params)
    }
}
