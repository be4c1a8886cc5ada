//! Policy abstractions for state feedback

use ndarray::{Array2, ArrayView2};

/// Deterministic state-feedback policy `u = π(x)`, batched
pub trait Policy {
    /// Action dimension (m)
    fn action_dim(&self) -> usize;

    /// Actions for every state row
    fn act(&self, states: ArrayView2<'_, f64>) -> crate::Result<Array2<f64>>;
}

impl<P: Policy + ?Sized> Policy for &P {
    fn action_dim(&self) -> usize {
        (**self).action_dim()
    }

    fn act(&self, states: ArrayView2<'_, f64>) -> crate::Result<Array2<f64>> {
        (**self).act(states)
    }
}

impl<P: Policy + ?Sized> Policy for Box<P> {
    fn action_dim(&self) -> usize {
        (**self).action_dim()
    }

    fn act(&self, states: ArrayView2<'_, f64>) -> crate::Result<Array2<f64>> {
        (**self).act(states)
    }
}
