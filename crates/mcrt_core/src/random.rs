//! Random number source adapter.
//!
//! Wraps the RNG behind the narrow surface the transport core needs: uniform
//! deviates, uniform points in a box, and inverse-CDF index sampling over a
//! tabulated cumulative distribution.

use glam::DVec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::grid::Aabb3;

pub struct Random {
  rng: SmallRng,
}

impl Random {
  /// Deterministic generator for a given seed.
  pub fn with_seed(seed: u64) -> Self {
    Self {
      rng: SmallRng::seed_from_u64(seed),
    }
  }

  /// Uniform deviate in `[0, 1)`.
  #[inline]
  pub fn uniform(&mut self) -> f64 {
    self.rng.random::<f64>()
  }

  /// Uniform point inside an axis-aligned box.
  pub fn position_in_box(&mut self, bounds: &Aabb3) -> DVec3 {
    let size = bounds.size();
    bounds.min
      + DVec3::new(
        self.uniform() * size.x,
        self.uniform() * size.y,
        self.uniform() * size.z,
      )
  }

  /// Draw an index from a tabulated cumulative distribution.
  ///
  /// `cumulative[i]` is the normalized cumulative weight through entry `i`,
  /// so the final entry is 1. Returns the smallest index whose cumulative
  /// value exceeds the deviate.
  pub fn cdf_index(&mut self, cumulative: &[f64]) -> usize {
    debug_assert!(!cumulative.is_empty());
    let x = self.uniform();
    cumulative
      .partition_point(|&c| c <= x)
      .min(cumulative.len() - 1)
  }
}
