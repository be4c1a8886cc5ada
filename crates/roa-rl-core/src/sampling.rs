//! Uniform sampling over the normalized state domain

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Draw `batch_size` independent vectors of dimension `dim`, each coordinate uniform on `[-1, 1]`
pub fn sample_uniform<R: Rng + ?Sized>(rng: &mut R, batch_size: usize, dim: usize) -> Array2<f64> {
    let unit = Uniform::new_inclusive(-1.0, 1.0);
    Array2::from_shape_simple_fn((batch_size, dim), || unit.sample(rng))
}
