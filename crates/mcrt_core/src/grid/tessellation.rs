//! Per-site Voronoi cell computation.
//!
//! Each cell starts as the full domain box and is clipped by the perpendicular
//! bisector of every site that can still touch it. Candidates are gathered
//! from a uniform site grid in expanding shells and processed in increasing
//! distance order; once half the distance to the next site exceeds the
//! farthest cell vertex, no further site can cut the cell.

use glam::DVec3;
use smallvec::SmallVec;

use super::bounds::Aabb3;
use super::polyhedron::{ClipOutcome, ConvexCell, FaceTag};
use super::{Cell, Neighbor};
use crate::error::{Error, Result};

/// Uniform spatial binning of the input sites, used only during construction.
pub(crate) struct SiteGrid {
  min: DVec3,
  inv_block_size: DVec3,
  min_block_dim: f64,
  nb: usize,
  blocks: Vec<Vec<u32>>,
}

impl SiteGrid {
  pub fn build(bounds: &Aabb3, sites: &[DVec3], nb: usize) -> Self {
    let size = bounds.size();
    let block_size = size / nb as f64;
    let mut grid = Self {
      min: bounds.min,
      inv_block_size: DVec3::ONE / block_size,
      min_block_dim: block_size.x.min(block_size.y).min(block_size.z),
      nb,
      blocks: vec![Vec::new(); nb * nb * nb],
    };
    for (index, &site) in sites.iter().enumerate() {
      let (i, j, k) = grid.block_coords(site);
      let idx = grid.linear(i, j, k);
      grid.blocks[idx].push(index as u32);
    }
    grid
  }

  #[inline]
  fn linear(&self, i: usize, j: usize, k: usize) -> usize {
    (i * self.nb + j) * self.nb + k
  }

  fn block_coords(&self, p: DVec3) -> (usize, usize, usize) {
    let f = (p - self.min) * self.inv_block_size;
    let clamp = |v: f64| (v.floor().max(0.0) as usize).min(self.nb - 1);
    (clamp(f.x), clamp(f.y), clamp(f.z))
  }

  /// Visit the site indices of every block at Chebyshev distance `shell`
  /// from the home block.
  fn for_shell(&self, home: (usize, usize, usize), shell: usize, mut visit: impl FnMut(u32)) {
    let (bi, bj, bk) = (home.0 as i64, home.1 as i64, home.2 as i64);
    let s = shell as i64;
    let nb = self.nb as i64;
    for di in -s..=s {
      let i = bi + di;
      if i < 0 || i >= nb {
        continue;
      }
      for dj in -s..=s {
        let j = bj + dj;
        if j < 0 || j >= nb {
          continue;
        }
        for dk in -s..=s {
          if di.abs().max(dj.abs()).max(dk.abs()) != s {
            continue;
          }
          let k = bk + dk;
          if k < 0 || k >= nb {
            continue;
          }
          for &idx in &self.blocks[self.linear(i as usize, j as usize, k as usize)] {
            visit(idx);
          }
        }
      }
    }
  }
}

/// Compute the Voronoi cell of site `m` within `bounds`.
pub(crate) fn compute_cell(
  m: usize,
  sites: &[DVec3],
  site_grid: &SiteGrid,
  bounds: &Aabb3,
  eps: f64,
) -> Result<Cell> {
  let r0 = sites[m];
  let mut cell = ConvexCell::from_box(bounds);
  let mut rmax_sq = cell.max_radius_sq(r0);

  let home = site_grid.block_coords(r0);
  let mut candidates: Vec<(f64, u32)> = Vec::new();

  for shell in 0..=site_grid.nb {
    if shell >= 2 {
      // Nothing in an unscanned shell can be closer than this.
      let d_min = (shell - 1) as f64 * site_grid.min_block_dim;
      if d_min * d_min >= 4.0 * rmax_sq {
        break;
      }
    }

    candidates.clear();
    site_grid.for_shell(home, shell, |idx| {
      if idx as usize != m {
        let d_sq = (sites[idx as usize] - r0).length_squared();
        candidates.push((d_sq, idx));
      }
    });
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

    for &(d_sq, idx) in &candidates {
      // A site at distance d cuts only if its bisector (at d/2) lies within
      // the current farthest vertex.
      if d_sq >= 4.0 * rmax_sq {
        break;
      }
      if d_sq < eps * eps {
        return Err(Error::DegenerateCell {
          cell: m,
          reason: "coincident sites",
        });
      }
      let other = sites[idx as usize];
      let normal = (other - r0).normalize();
      let offset = normal.dot((other + r0) * 0.5);
      match cell.clip(normal, offset, FaceTag::Site(idx), eps) {
        ClipOutcome::Unchanged => {}
        ClipOutcome::Clipped => {
          rmax_sq = cell.max_radius_sq(r0);
        }
        ClipOutcome::Empty => {
          return Err(Error::DegenerateCell {
            cell: m,
            reason: "cell clipped away entirely; site outside the domain?",
          });
        }
      }
    }
  }

  let (volume, centroid) = cell.measures();
  if !(volume > 0.0) {
    return Err(Error::DegenerateCell {
      cell: m,
      reason: "cell has no volume",
    });
  }

  let neighbors: SmallVec<[Neighbor; 16]> = cell
    .face_tags()
    .map(|tag| match tag {
      FaceTag::Site(i) => Neighbor::Cell(i),
      FaceTag::Wall(w) => Neighbor::Wall(w),
    })
    .collect();

  Ok(Cell {
    site: r0,
    centroid,
    volume,
    bbox: cell.bbox(),
    neighbors,
  })
}

#[cfg(test)]
#[path = "tessellation_test.rs"]
mod tessellation_test;
