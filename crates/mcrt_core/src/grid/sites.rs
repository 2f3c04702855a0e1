//! Site intake: domain filtering and duplicate removal.

use glam::DVec3;
use tracing::info;

use super::bounds::Aabb3;

/// Outcome of filtering, with counts for diagnostics.
pub(crate) struct FilteredSites {
  /// Surviving sites in original input order.
  pub sites: Vec<DVec3>,
  pub dropped_outside: usize,
  pub dropped_nearby: usize,
}

/// Drop sites outside the domain, then discard any site within `eps` of an
/// earlier-kept site.
///
/// The proximity sweep runs over an x-sorted view; only pairs whose x
/// coordinates are within `eps` are compared in full 3-D. Survivors keep
/// their original input order.
pub(crate) fn filter_sites(bounds: &Aabb3, input: &[DVec3], eps: f64) -> FilteredSites {
  let mut candidates: Vec<(usize, DVec3)> = Vec::with_capacity(input.len());
  let mut dropped_outside = 0;
  for (index, &site) in input.iter().enumerate() {
    if bounds.contains_point(site) {
      candidates.push((index, site));
    } else {
      dropped_outside += 1;
    }
  }

  candidates.sort_by(|a, b| {
    a.1
      .x
      .total_cmp(&b.1.x)
      .then(a.1.y.total_cmp(&b.1.y))
      .then(a.1.z.total_cmp(&b.1.z))
  });

  let eps_sq = eps * eps;
  let mut kept: Vec<(usize, DVec3)> = Vec::with_capacity(candidates.len());
  let mut dropped_nearby = 0;
  for &(index, site) in &candidates {
    let duplicate = kept
      .iter()
      .rev()
      .take_while(|(_, prev)| site.x - prev.x <= eps)
      .any(|(_, prev)| (site - *prev).length_squared() < eps_sq);
    if duplicate {
      dropped_nearby += 1;
    } else {
      kept.push((index, site));
    }
  }

  kept.sort_by_key(|&(index, _)| index);

  if dropped_outside > 0 || dropped_nearby > 0 {
    info!(
      dropped_outside,
      dropped_nearby,
      kept = kept.len(),
      "filtered input sites"
    );
  }

  FilteredSites {
    sites: kept.into_iter().map(|(_, site)| site).collect(),
    dropped_outside,
    dropped_nearby,
  }
}
