//! Unstructured spatial grid: a Voronoi partition of a bounded box.
//!
//! `MeshGrid` owns the tessellation of the domain into convex cells (one per
//! input site), the block/tree acceleration structures for point location,
//! and the ray-segment walk used to trace photon paths. After construction
//! the grid is immutable and safe for concurrent queries.
//!
//! # Module structure
//!
//! - [`bounds`]: `Aabb3`, `Wall` - the domain box and its six wall faces
//! - [`polyhedron`]: `ConvexCell` - half-space clipping engine
//! - [`tessellation`]: per-site Voronoi cell computation
//! - [`blocks`]: `BlockGrid` - block lists and per-block k-d trees
//! - [`walk`]: `Segment` - the ray walk across bisector planes
//! - [`sites`]: input filtering (domain check, duplicate sweep)

pub mod bounds;
mod blocks;
mod polyhedron;
mod sites;
mod tessellation;
mod walk;

use std::time::Instant;

use glam::DVec3;
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::random::Random;

pub use bounds::{Aabb3, Wall};
pub use walk::Segment;

use blocks::BlockGrid;
use tessellation::SiteGrid;

/// Relative tolerance scale: `eps = EPS_SCALE * diagonal(bounds)`.
const EPS_SCALE: f64 = 1e-12;

/// Attempt cap for rejection sampling inside one cell.
const MAX_SAMPLING_ATTEMPTS: usize = 10_000;

/// Adjacency of one cell face: another cell, or a domain wall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Neighbor {
  Cell(u32),
  Wall(Wall),
}

/// One Voronoi cell: its site, derived geometry, and face adjacency.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
  site: DVec3,
  centroid: DVec3,
  volume: f64,
  bbox: Aabb3,
  neighbors: SmallVec<[Neighbor; 16]>,
}

/// Immutable Voronoi grid over a bounded box.
pub struct MeshGrid {
  bounds: Aabb3,
  eps: f64,
  cells: Vec<Cell>,
  sites: Vec<DVec3>,
  blocks: BlockGrid,
  /// Normalized cumulative cell weights, when a mass distribution is set.
  cumulative_weights: Option<Vec<f64>>,
}

impl MeshGrid {
  /// Build a grid from `input_sites` inside `bounds`.
  ///
  /// With `ignore_nearby_and_outliers` set, sites outside the domain are
  /// dropped and sites within `eps` of an earlier-kept site are discarded;
  /// otherwise the caller guarantees the sites are distinct and inside.
  /// Cell identifiers are contiguous over the surviving sites, in input
  /// order. Fails if any cell cannot be tessellated.
  pub fn new(bounds: Aabb3, input_sites: &[DVec3], ignore_nearby_and_outliers: bool) -> Result<Self> {
    let start = Instant::now();
    let eps = EPS_SCALE * bounds.diagonal();

    let sites: Vec<DVec3> = if ignore_nearby_and_outliers {
      sites::filter_sites(&bounds, input_sites, eps).sites
    } else {
      input_sites.to_vec()
    };

    let cell_count = sites.len();
    let nb = BlockGrid::blocks_per_axis(cell_count);
    let site_grid = SiteGrid::build(&bounds, &sites, nb);

    let cells: Vec<Cell> = (0..cell_count)
      .into_par_iter()
      .map(|m| tessellation::compute_cell(m, &sites, &site_grid, &bounds, eps))
      .collect::<Result<_>>()?;

    let bboxes: Vec<Aabb3> = cells.iter().map(|c| c.bbox).collect();
    let blocks = BlockGrid::build(&bounds, &sites, &bboxes, eps);

    let (block_count, max_block_cells, tree_count) = blocks.statistics();
    info!(
      cells = cell_count,
      blocks = block_count,
      max_block_cells,
      trees = tree_count,
      elapsed_ms = start.elapsed().as_millis() as u64,
      "voronoi grid constructed"
    );

    Ok(Self {
      bounds,
      eps,
      cells,
      sites,
      blocks,
      cumulative_weights: None,
    })
  }

  /// Attach a per-cell mass distribution for `generate_position`.
  ///
  /// A non-positive total weight is a suppressed-input condition: it logs a
  /// warning and leaves the grid without a distribution.
  pub fn set_cell_weights(&mut self, weights: &[f64]) -> Result<()> {
    if weights.len() != self.cells.len() {
      return Err(Error::InvalidConfiguration(format!(
        "{} weights for {} cells",
        weights.len(),
        self.cells.len()
      )));
    }
    let total: f64 = weights.iter().filter(|w| w.is_sign_positive()).sum();
    if !(total > 0.0) {
      warn!("total cell mass is not positive; mass distribution suppressed");
      self.cumulative_weights = None;
      return Ok(());
    }
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut running = 0.0;
    for &w in weights {
      running += (w.max(0.0)) / total;
      cumulative.push(running);
    }
    if let Some(last) = cumulative.last_mut() {
      *last = 1.0;
    }
    self.cumulative_weights = Some(cumulative);
    Ok(())
  }

  // ---------------------------------------------------------------------
  // Queries
  // ---------------------------------------------------------------------

  pub fn bounds(&self) -> &Aabb3 {
    &self.bounds
  }

  /// Numerical tolerance derived from the domain diagonal.
  pub fn eps(&self) -> f64 {
    self.eps
  }

  /// Number of cells in the grid.
  pub fn cell_count(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  pub fn site(&self, m: usize) -> DVec3 {
    self.cells[m].site
  }

  pub fn centroid(&self, m: usize) -> DVec3 {
    self.cells[m].centroid
  }

  pub fn volume(&self, m: usize) -> f64 {
    self.cells[m].volume
  }

  pub fn cell_bbox(&self, m: usize) -> &Aabb3 {
    &self.cells[m].bbox
  }

  pub fn neighbors(&self, m: usize) -> &[Neighbor] {
    &self.cells[m].neighbors
  }

  /// Sum of all cell volumes; equals the box volume up to tolerance.
  pub fn total_volume(&self) -> f64 {
    self.cells.iter().map(|c| c.volume).sum()
  }

  /// Index of the cell containing `point`: the cell of the nearest site.
  ///
  /// Returns `None` for points outside the domain (and for an empty grid).
  pub fn cell_index_at(&self, point: DVec3) -> Option<usize> {
    if !self.bounds.contains_point(point) {
      return None;
    }
    self.blocks.nearest_cell(point, &self.sites)
  }

  // ---------------------------------------------------------------------
  // Sampling
  // ---------------------------------------------------------------------

  /// Uniform random position inside cell `m`.
  ///
  /// Rejection-samples the cell bounding box, accepting points closer to the
  /// cell's own site than to any neighbor site.
  pub fn generate_position_in_cell(&self, m: usize, rng: &mut Random) -> Result<DVec3> {
    let cell = &self.cells[m];
    for _ in 0..MAX_SAMPLING_ATTEMPTS {
      let p = rng.position_in_box(&cell.bbox);
      let d_own = (p - cell.site).length_squared();
      let inside = cell.neighbors.iter().all(|&n| match n {
        Neighbor::Cell(i) => (p - self.cells[i as usize].site).length_squared() >= d_own,
        Neighbor::Wall(_) => true,
      });
      if inside {
        return Ok(p);
      }
    }
    Err(Error::SamplingExhausted {
      cell: m,
      attempts: MAX_SAMPLING_ATTEMPTS,
    })
  }

  /// Random position distributed according to the cell mass distribution.
  pub fn generate_position(&self, rng: &mut Random) -> Result<DVec3> {
    let cumulative = self
      .cumulative_weights
      .as_ref()
      .ok_or(Error::NoMassDistribution)?;
    let m = rng.cdf_index(cumulative);
    self.generate_position_in_cell(m, rng)
  }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
