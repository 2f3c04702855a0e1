//! Lock-free floating-point accumulation.
//!
//! Detector arrays are updated concurrently by every worker thread; each cell
//! is a `f64` accumulator built on a compare-and-swap loop over the 64-bit
//! representation, so no per-array lock is needed.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomically updatable `f64` cell.
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
  pub const fn new(value: f64) -> Self {
    Self(AtomicU64::new(value.to_bits()))
  }

  #[inline]
  pub fn load(&self) -> f64 {
    f64::from_bits(self.0.load(Ordering::Relaxed))
  }

  #[inline]
  pub fn store(&self, value: f64) {
    self.0.store(value.to_bits(), Ordering::Relaxed);
  }

  /// Add `value` with a CAS retry loop.
  pub fn fetch_add(&self, value: f64) {
    let mut current = self.0.load(Ordering::Relaxed);
    loop {
      let next = (f64::from_bits(current) + value).to_bits();
      match self
        .0
        .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
      {
        Ok(_) => return,
        Err(actual) => current = actual,
      }
    }
  }
}

impl Default for AtomicF64 {
  fn default() -> Self {
    Self::new(0.0)
  }
}

impl std::fmt::Debug for AtomicF64 {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.load())
  }
}

/// Zero-initialized accumulator array.
pub fn zeroed(len: usize) -> Vec<AtomicF64> {
  (0..len).map(|_| AtomicF64::default()).collect()
}

/// Plain `f64` copy of an accumulator array.
pub fn snapshot(cells: &[AtomicF64]) -> Vec<f64> {
  cells.iter().map(AtomicF64::load).collect()
}
