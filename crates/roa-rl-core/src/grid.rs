//! Regular state-space discretization and nearest-point lookup

use ndarray::{Array1, Array2, ArrayD, ArrayView1, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Result, RoaError};

/// Number of points along each grid axis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisPoints {
    /// Same count on every axis
    Uniform(usize),
    /// One count per axis
    PerAxis(Vec<usize>),
}

impl From<usize> for AxisPoints {
    fn from(n: usize) -> Self {
        Self::Uniform(n)
    }
}

impl From<Vec<usize>> for AxisPoints {
    fn from(counts: Vec<usize>) -> Self {
        Self::PerAxis(counts)
    }
}

impl From<&[usize]> for AxisPoints {
    fn from(counts: &[usize]) -> Self {
        Self::PerAxis(counts.to_vec())
    }
}

impl AxisPoints {
    fn resolve(&self, ndim: usize) -> Result<Vec<usize>> {
        match self {
            Self::Uniform(n) => Ok(vec![*n; ndim]),
            Self::PerAxis(counts) if counts.len() == ndim => Ok(counts.clone()),
            Self::PerAxis(counts) => Err(RoaError::InvalidDomain(format!(
                "{} point counts given for {ndim} axes",
                counts.len()
            ))),
        }
    }
}

/// Regular lattice over a hyper-rectangle
///
/// Vertices are enumerated row-major: the last axis varies fastest, so a
/// flat vector of per-vertex values reshapes into `num_points` directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    limits: Vec<[f64; 2]>,
    num_points: Vec<usize>,
    discrete_points: Vec<Array1<f64>>,
    all_points: Array2<f64>,
}

impl Grid {
    /// Build a grid over `limits` with the given points per axis
    pub fn new(limits: Vec<[f64; 2]>, num_points: impl Into<AxisPoints>) -> Result<Self> {
        let ndim = limits.len();
        if ndim == 0 {
            return Err(RoaError::InvalidDomain("grid needs at least one axis".into()));
        }
        let num_points = num_points.into().resolve(ndim)?;

        for (axis, ([low, high], &n)) in limits.iter().zip(&num_points).enumerate() {
            if !low.is_finite() || !high.is_finite() {
                return Err(RoaError::InvalidDomain(format!(
                    "axis {axis} has non-finite bounds [{low}, {high}]"
                )));
            }
            if low >= high {
                return Err(RoaError::InvalidDomain(format!(
                    "axis {axis} has low >= high ({low} >= {high})"
                )));
            }
            if n < 2 {
                return Err(RoaError::InvalidDomain(format!(
                    "axis {axis} needs at least 2 points, got {n}"
                )));
            }
        }

        let total = num_points
            .iter()
            .try_fold(1_usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| RoaError::InvalidDomain("grid point count overflows usize".into()))?;

        let discrete_points: Vec<Array1<f64>> = limits
            .iter()
            .zip(&num_points)
            .map(|(&[low, high], &n)| linspace(low, high, n))
            .collect();

        let mut all_points = Array2::zeros((total, ndim));
        for (flat, mut row) in all_points.outer_iter_mut().enumerate() {
            let mut rem = flat;
            for d in (0..ndim).rev() {
                row[d] = discrete_points[d][rem % num_points[d]];
                rem /= num_points[d];
            }
        }
        debug!(ndim, points = total, "grid constructed");

        Ok(Self {
            limits,
            num_points,
            discrete_points,
            all_points,
        })
    }

    /// Grid over the normalized domain `[-1, 1]^ndim`
    pub fn unit(ndim: usize, num_points: impl Into<AxisPoints>) -> Result<Self> {
        Self::new(vec![[-1.0, 1.0]; ndim], num_points)
    }

    /// Number of axes
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.limits.len()
    }

    /// Total number of vertices
    #[must_use]
    pub fn len(&self) -> usize {
        self.all_points.nrows()
    }

    /// Always false: a valid grid has at least two points per axis
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.all_points.nrows() == 0
    }

    /// Axis bounds
    #[must_use]
    pub fn limits(&self) -> &[[f64; 2]] {
        &self.limits
    }

    /// Per-axis point counts
    #[must_use]
    pub fn num_points(&self) -> &[usize] {
        &self.num_points
    }

    /// Coordinates along each axis, ascending
    #[must_use]
    pub fn discrete_points(&self) -> &[Array1<f64>] {
        &self.discrete_points
    }

    /// Every vertex, one per row, last axis varying fastest
    #[must_use]
    pub fn all_points(&self) -> &Array2<f64> {
        &self.all_points
    }

    /// Reshape one value per vertex into the `num_points` tensor shape
    pub fn reshape<T: Clone>(&self, values: Array1<T>) -> Result<ArrayD<T>> {
        if values.len() != self.len() {
            return Err(RoaError::ShapeMismatch {
                expected: format!("{} grid values", self.len()),
                actual: format!("{}", values.len()),
            });
        }
        Ok(values.into_shape(IxDyn(&self.num_points))?)
    }

    /// Flat vertex index of a per-axis index
    pub fn flat_index(&self, index: &[usize]) -> Result<usize> {
        if index.len() != self.ndim() {
            return Err(RoaError::shape_mismatch(self.ndim(), index.len()));
        }
        let mut flat = 0;
        for (d, (&i, &n)) in index.iter().zip(&self.num_points).enumerate() {
            if i >= n {
                return Err(RoaError::InvalidDomain(format!(
                    "index {i} out of range for axis {d} with {n} points"
                )));
            }
            flat = flat * n + i;
        }
        Ok(flat)
    }

    /// Per-axis index of the vertex nearest to `point`
    pub fn nearest_index(&self, point: &[f64]) -> Result<Vec<usize>> {
        if point.len() != self.ndim() {
            return Err(RoaError::shape_mismatch(self.ndim(), point.len()));
        }
        point
            .iter()
            .zip(&self.discrete_points)
            .map(|(&q, axis)| find_nearest(axis, q).map(|(i, _)| i))
            .collect()
    }

    /// Flat index and coordinates of the vertex nearest to `point`
    pub fn nearest_point(&self, point: &[f64]) -> Result<(usize, Array1<f64>)> {
        let index = self.nearest_index(point)?;
        let flat = self.flat_index(&index)?;
        Ok((flat, self.all_points.row(flat).to_owned()))
    }
}

fn linspace(low: f64, high: f64, n: usize) -> Array1<f64> {
    let step = (high - low) / (n - 1) as f64;
    let mut points = Array1::from_shape_fn(n, |i| low + step * i as f64);
    points[n - 1] = high;
    points
}

/// Index and value of the element of an ascending array closest to `query`
///
/// Ties go to the smaller index.
pub fn find_nearest<'a>(sorted: impl Into<ArrayView1<'a, f64>>, query: f64) -> Result<(usize, f64)> {
    let sorted = sorted.into();
    let n = sorted.len();
    if n == 0 {
        return Err(RoaError::InvalidDomain("nearest lookup on an empty array".into()));
    }
    if query.is_nan() {
        return Err(RoaError::InvalidDomain("nearest lookup with a NaN query".into()));
    }
    debug_assert!(
        sorted.windows(2).into_iter().all(|w| w[0] <= w[1]),
        "find_nearest requires an ascending array"
    );

    // first index whose element is >= query
    let (mut lo, mut hi) = (0, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if sorted[mid] < query {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    let mut index = if lo == 0 {
        0
    } else if lo == n || query - sorted[lo - 1] <= sorted[lo] - query {
        lo - 1
    } else {
        lo
    };
    // duplicates of the winner below it are equally close
    while index > 0 && sorted[index - 1] == sorted[index] {
        index -= 1;
    }
    Ok((index, sorted[index]))
}
