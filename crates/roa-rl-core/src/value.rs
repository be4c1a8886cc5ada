//! State value functions

use ndarray::{Array1, Array2, ArrayView2};

use crate::{Result, RoaError};

/// State value function `V(x)`, batched
pub trait ValueFunction {
    /// One value per state row
    fn value(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>>;
}

impl<V: ValueFunction + ?Sized> ValueFunction for &V {
    fn value(&self, states: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        (**self).value(states)
    }
}

/// Collapse a `(batch, 1)` output into one value per row
pub fn single_column(output: Array2<f64>) -> Result<Array1<f64>> {
    if output.ncols() != 1 {
        return Err(RoaError::shape_mismatch((output.nrows(), 1), output.dim()));
    }
    Ok(output.column(0).to_owned())
}
