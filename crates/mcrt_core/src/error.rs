//! Crate-wide error type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the transfer core.
///
/// Construction and sampling failures are fatal for the simulation; worker
/// failures carry the first error raised inside a parallel body.
#[derive(Debug, Error)]
pub enum Error {
  /// A Voronoi cell could not be computed during tessellation.
  #[error("voronoi cell {cell} failed to compute: {reason}")]
  DegenerateCell { cell: usize, reason: &'static str },

  /// Rejection sampling could not place a point inside a cell.
  #[error("no interior point found for cell {cell} after {attempts} attempts")]
  SamplingExhausted { cell: usize, attempts: usize },

  /// Mass-weighted sampling was requested but no distribution is available.
  #[error("no mass distribution available for position sampling")]
  NoMassDistribution,

  /// A configuration value is inconsistent or out of range.
  #[error("invalid configuration: {0}")]
  InvalidConfiguration(String),

  /// A worker body panicked; the payload message is preserved.
  #[error("worker thread panicked: {0}")]
  WorkerPanic(String),

  #[error(transparent)]
  Io(#[from] std::io::Error),
}
