//! Parameter collections owned by function approximators

use ndarray::{ArrayD, ArrayViewMutD, Zip};
use serde::{Deserialize, Serialize};

use crate::{Result, RoaError};

/// Ordered sequence of numeric tensors belonging to one function approximator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameters(pub Vec<ArrayD<f64>>);

impl Parameters {
    /// Create a collection from tensors
    #[must_use]
    pub fn new(tensors: Vec<ArrayD<f64>>) -> Self {
        Self(tensors)
    }

    /// Zero-filled collection with the same structure as `self`
    #[must_use]
    pub fn zeros_like(&self) -> Self {
        Self(self.0.iter().map(|t| ArrayD::zeros(t.raw_dim())).collect())
    }

    /// Number of tensors
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the collection holds no tensors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of scalar entries
    #[must_use]
    pub fn numel(&self) -> usize {
        self.0.iter().map(ArrayD::len).sum()
    }

    /// Iterate over tensors in order
    pub fn iter(&self) -> std::slice::Iter<'_, ArrayD<f64>> {
        self.0.iter()
    }

    /// Shapes of every tensor, in order
    #[must_use]
    pub fn shapes(&self) -> Vec<Vec<usize>> {
        self.0.iter().map(|t| t.shape().to_vec()).collect()
    }

    /// Whether every entry is finite
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|t| t.iter().all(|v| v.is_finite()))
    }

    /// Largest absolute entry across all tensors, zero when empty
    #[must_use]
    pub fn max_abs(&self) -> f64 {
        self.0
            .iter()
            .flat_map(|t| t.iter())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    /// Fail unless `other` has the same tensor count and shapes
    pub fn ensure_same_structure(&self, other: &Self) -> Result<()> {
        if self.len() != other.len() {
            return Err(RoaError::ShapeMismatch {
                expected: format!("{} tensors", self.len()),
                actual: format!("{} tensors", other.len()),
            });
        }
        for (i, (a, b)) in self.0.iter().zip(&other.0).enumerate() {
            if a.shape() != b.shape() {
                return Err(RoaError::ShapeMismatch {
                    expected: format!("tensor {i} with shape {:?}", a.shape()),
                    actual: format!("{:?}", b.shape()),
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<ArrayD<f64>>> for Parameters {
    fn from(tensors: Vec<ArrayD<f64>>) -> Self {
        Self(tensors)
    }
}

/// Infinity-norm distance between two snapshots of a parameter collection
///
/// Returns the largest elementwise absolute difference over every pair of
/// corresponding tensors. Identical collections give exactly zero.
pub fn param_change(old: &Parameters, new: &Parameters) -> Result<f64> {
    old.ensure_same_structure(new)?;
    let mut change = 0.0_f64;
    for (a, b) in old.iter().zip(new.iter()) {
        Zip::from(a).and(b).for_each(|&x, &y| {
            change = change.max((x - y).abs());
        });
    }
    Ok(change)
}

/// Check that mutable parameter views line up with a gradient collection
pub fn ensure_views_match(views: &[ArrayViewMutD<'_, f64>], grads: &Parameters) -> Result<()> {
    if views.len() != grads.len() {
        return Err(RoaError::ShapeMismatch {
            expected: format!("{} parameter tensors", views.len()),
            actual: format!("{} gradient tensors", grads.len()),
        });
    }
    for (i, (v, g)) in views.iter().zip(grads.iter()).enumerate() {
        if v.shape() != g.shape() {
            return Err(RoaError::ShapeMismatch {
                expected: format!("gradient {i} with shape {:?}", v.shape()),
                actual: format!("{:?}", g.shape()),
            });
        }
    }
    Ok(())
}
