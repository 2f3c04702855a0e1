//! Ray-segment walk through neighboring cells.
//!
//! The bisecting plane between two sites is the exact Voronoi face between
//! their cells, so stepping to the nearest forward plane crossing yields the
//! next cell without enumerating face polygons.

use glam::DVec3;

use super::{MeshGrid, Neighbor};

/// One traversed stretch of a ray.
///
/// `cell` is `None` for the stretch outside the domain box, covering the
/// distance from the ray origin to its entry point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
  pub cell: Option<usize>,
  pub length: f64,
}

impl MeshGrid {
  /// Walk a ray through the grid.
  ///
  /// Returns the exhaustive ordered list of `(cell, length)` segments from
  /// the ray origin until it leaves the domain, or an empty list when the ray
  /// misses the domain entirely. A grazing pass through a vertex or edge is
  /// recovered by nudging the point forward by `eps` and relocating.
  pub fn walk(&self, origin: DVec3, direction: DVec3) -> Vec<Segment> {
    let mut segments = Vec::new();
    let k = direction.normalize();
    if !k.is_finite() {
      return segments;
    }

    // Advance to the domain box.
    let mut r = origin;
    match self.bounds().ray_entry(r, k) {
      None => return segments,
      Some(t) => {
        if t > 0.0 {
          segments.push(Segment {
            cell: None,
            length: t,
          });
          r += t * k;
        }
      }
    }

    let mut current = match self.cell_index_at(r) {
      Some(m) => m,
      None => return Vec::new(),
    };

    loop {
      let site_m = self.site(current);
      let mut s_min = f64::INFINITY;
      let mut crossing: Option<Neighbor> = None;

      for &neighbor in self.neighbors(current) {
        let s = match neighbor {
          Neighbor::Cell(i) => {
            let site_i = self.site(i as usize);
            let n = site_i - site_m;
            let denominator = n.dot(k);
            if denominator <= 0.0 {
              continue;
            }
            let midpoint = (site_i + site_m) * 0.5;
            n.dot(midpoint - r) / denominator
          }
          Neighbor::Wall(wall) => {
            let axis = wall.axis();
            let denominator = k.to_array()[axis];
            if denominator == 0.0 {
              continue;
            }
            (wall.plane(self.bounds()) - r.to_array()[axis]) / denominator
          }
        };
        if s > 0.0 && s < s_min {
          s_min = s;
          crossing = Some(neighbor);
        }
      }

      match crossing {
        None => {
          // Grazing a vertex or edge: no forward crossing was found. Nudge
          // past the degeneracy and relocate.
          r += self.eps() * k;
          match self.cell_index_at(r) {
            Some(m) => current = m,
            None => return segments,
          }
        }
        Some(neighbor) => {
          segments.push(Segment {
            cell: Some(current),
            length: s_min,
          });
          r += (s_min + self.eps()) * k;
          match neighbor {
            Neighbor::Wall(_) => return segments,
            Neighbor::Cell(i) => current = i as usize,
          }
        }
      }
    }
  }

  /// Total in-domain path length of a walk result.
  pub fn path_length(segments: &[Segment]) -> f64 {
    segments
      .iter()
      .filter(|s| s.cell.is_some())
      .map(|s| s.length)
      .sum()
  }
}

#[cfg(test)]
#[path = "walk_test.rs"]
mod walk_test;
