//! Explicit numeric execution context owned by the caller

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::sampling::sample_uniform;

/// Caller-owned source of randomness for sampling and initialization
///
/// Nothing in the core creates its own random source; every draw goes
/// through a context so a fixed seed reproduces a whole training run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    seed: u64,
    rng: StdRng,
}

impl ExecutionContext {
    /// Create a context seeded with `seed`
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The seed this context was created with
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Mutable access to the random source
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Uniform batch over `[-1, 1]^dim`
    pub fn sample_uniform(&mut self, batch_size: usize, dim: usize) -> Array2<f64> {
        sample_uniform(&mut self.rng, batch_size, dim)
    }
}
