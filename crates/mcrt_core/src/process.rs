//! Cross-process reduction interface.
//!
//! Distributed runs sum detector arrays element-wise onto a root rank before
//! calibration; only the root writes output. The reduction itself lives
//! outside this core.

/// Cooperating process group for distributed aggregation.
pub trait ProcessGroup: Send + Sync {
  /// Element-wise sum onto the root rank. After the call the root holds the
  /// total; other ranks' arrays are unspecified.
  fn sum_to_root(&self, data: &mut [f64]);

  /// True on the rank that performs calibration and output.
  fn is_root(&self) -> bool;
}

/// Trivial single-process group: the reduction is a no-op and this rank is
/// always the root.
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
  fn sum_to_root(&self, _data: &mut [f64]) {}

  fn is_root(&self) -> bool {
    true
  }
}
