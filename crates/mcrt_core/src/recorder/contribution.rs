//! Per-thread contribution queues and per-history moment folding.
//!
//! Statistics must be taken per photon *history*, not per detection, so that
//! variance estimates reflect real packet weights. Each thread buffers the
//! `(ell, pixel, weight)` triples of its current history; when a packet with
//! a new history index arrives the closed history is folded into the moment
//! arrays and the buffer is recycled.

use smallvec::SmallVec;

use super::atomics::{self, AtomicF64};

/// Orders of the accumulated statistical moments (`sum of w^k`, k = 1..4).
pub const MOMENT_ORDERS: usize = 4;

/// One recorded detection of the current history.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Contribution {
  pub ell: u32,
  /// IFU pixel index, `-1` when the packet missed the field of view.
  pub pixel: i64,
  pub weight: f64,
}

/// Moment arrays `W[k][bin] = sum over histories of w_total^(k+1)`.
pub struct MomentSet {
  orders: [Vec<AtomicF64>; MOMENT_ORDERS],
}

impl MomentSet {
  pub fn new(bins: usize) -> Self {
    Self {
      orders: std::array::from_fn(|_| atomics::zeroed(bins)),
    }
  }

  /// Fold one closed per-history bin total into all four moments.
  pub fn add_history(&self, bin: usize, w_total: f64) {
    let mut power = w_total;
    for order in &self.orders {
      order[bin].fetch_add(power);
      power *= w_total;
    }
  }

  /// Snapshot of moment order `k`: index 0 holds `sum w`, index 3 `sum w^4`.
  pub fn snapshot(&self, k: usize) -> Vec<f64> {
    atomics::snapshot(&self.orders[k])
  }
}

/// Detection buffer for one thread's current photon history.
#[derive(Default)]
pub(crate) struct ContributionList {
  history: Option<u64>,
  contributions: SmallVec<[Contribution; 16]>,
}

impl ContributionList {
  pub fn history(&self) -> Option<u64> {
    self.history
  }

  /// Recycle the buffer for a new history.
  pub fn reset(&mut self, history: u64) {
    self.history = Some(history);
    self.contributions.clear();
  }

  pub fn record(&mut self, ell: u32, pixel: i64, weight: f64) {
    self.contributions.push(Contribution { ell, pixel, weight });
  }

  /// Fold the buffered history into the moment arrays and drain the buffer.
  ///
  /// SED moments close one bin per wavelength (summing across pixels and
  /// misses alike); IFU moments close one bin per `(ell, pixel)` pair for
  /// in-field pixels only. Folding an already-drained buffer is a no-op,
  /// which makes `flush` idempotent.
  pub fn fold(
    &mut self,
    sed_moments: Option<&MomentSet>,
    ifu_moments: Option<&MomentSet>,
    pixels_per_frame: usize,
  ) {
    if self.contributions.is_empty() {
      return;
    }
    self
      .contributions
      .sort_by(|a, b| a.ell.cmp(&b.ell).then(a.pixel.cmp(&b.pixel)));

    if let Some(moments) = sed_moments {
      let mut run_start = 0;
      while run_start < self.contributions.len() {
        let ell = self.contributions[run_start].ell;
        let mut w_total = 0.0;
        let mut run_end = run_start;
        while run_end < self.contributions.len() && self.contributions[run_end].ell == ell {
          w_total += self.contributions[run_end].weight;
          run_end += 1;
        }
        moments.add_history(ell as usize, w_total);
        run_start = run_end;
      }
    }

    if let Some(moments) = ifu_moments {
      let mut run_start = 0;
      while run_start < self.contributions.len() {
        let key = (
          self.contributions[run_start].ell,
          self.contributions[run_start].pixel,
        );
        let mut w_total = 0.0;
        let mut run_end = run_start;
        while run_end < self.contributions.len()
          && (
            self.contributions[run_end].ell,
            self.contributions[run_end].pixel,
          ) == key
        {
          w_total += self.contributions[run_end].weight;
          run_end += 1;
        }
        if key.1 >= 0 {
          let bin = key.1 as usize + key.0 as usize * pixels_per_frame;
          moments.add_history(bin, w_total);
        }
        run_start = run_end;
      }
    }

    self.contributions.clear();
  }
}
