//! Convex polyhedron clipped by half-spaces.
//!
//! A cell starts as the domain box and is cut down by one bisector plane per
//! relevant site. Faces keep a tag naming the plane that produced them, so the
//! surviving tags are exactly the cell's neighbor relations.

use std::collections::HashMap;

use glam::DVec3;
use smallvec::SmallVec;

use super::bounds::{Aabb3, Wall};

/// Identifies the plane that produced a face.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceTag {
  /// Perpendicular bisector against another site (pre-filter cell id).
  Site(u32),
  /// One of the six domain walls.
  Wall(Wall),
}

/// A planar face of the cell, as an index loop into the vertex arena.
///
/// Loops wind counter-clockwise seen from outside the cell.
#[derive(Clone, Debug)]
pub struct Face {
  pub tag: FaceTag,
  pub vertices: SmallVec<[u32; 8]>,
}

/// Result of clipping the cell by one half-space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipOutcome {
  /// The plane does not cut the cell; geometry unchanged.
  Unchanged,
  /// The plane cut the cell; a new face with the given tag was added.
  Clipped,
  /// Nothing of the cell survives the half-space.
  Empty,
}

/// Convex cell under construction.
#[derive(Clone, Debug)]
pub struct ConvexCell {
  vertices: Vec<DVec3>,
  faces: Vec<Face>,
}

impl ConvexCell {
  /// Start from the full domain box, one face per wall.
  pub fn from_box(bounds: &Aabb3) -> Self {
    let (lo, hi) = (bounds.min, bounds.max);
    let vertices = vec![
      DVec3::new(lo.x, lo.y, lo.z), // 0
      DVec3::new(hi.x, lo.y, lo.z), // 1
      DVec3::new(hi.x, hi.y, lo.z), // 2
      DVec3::new(lo.x, hi.y, lo.z), // 3
      DVec3::new(lo.x, lo.y, hi.z), // 4
      DVec3::new(hi.x, lo.y, hi.z), // 5
      DVec3::new(hi.x, hi.y, hi.z), // 6
      DVec3::new(lo.x, hi.y, hi.z), // 7
    ];
    // Outward winding on every face.
    let faces = vec![
      Face {
        tag: FaceTag::Wall(Wall::ZMin),
        vertices: SmallVec::from_slice(&[0, 3, 2, 1]),
      },
      Face {
        tag: FaceTag::Wall(Wall::ZMax),
        vertices: SmallVec::from_slice(&[4, 5, 6, 7]),
      },
      Face {
        tag: FaceTag::Wall(Wall::XMin),
        vertices: SmallVec::from_slice(&[0, 4, 7, 3]),
      },
      Face {
        tag: FaceTag::Wall(Wall::XMax),
        vertices: SmallVec::from_slice(&[1, 2, 6, 5]),
      },
      Face {
        tag: FaceTag::Wall(Wall::YMin),
        vertices: SmallVec::from_slice(&[0, 1, 5, 4]),
      },
      Face {
        tag: FaceTag::Wall(Wall::YMax),
        vertices: SmallVec::from_slice(&[3, 7, 6, 2]),
      },
    ];
    Self { vertices, faces }
  }

  pub fn vertex_count(&self) -> usize {
    self.vertices.len()
  }

  pub fn face_count(&self) -> usize {
    self.faces.len()
  }

  /// Tags of the surviving faces, i.e. the cell's neighbor relations.
  pub fn face_tags(&self) -> impl Iterator<Item = FaceTag> + '_ {
    self.faces.iter().map(|f| f.tag)
  }

  /// Squared distance from `point` to the farthest cell vertex.
  pub fn max_radius_sq(&self, point: DVec3) -> f64 {
    self
      .vertices
      .iter()
      .map(|v| (*v - point).length_squared())
      .fold(0.0, f64::max)
  }

  /// Bounding box over the cell vertices.
  pub fn bbox(&self) -> Aabb3 {
    let mut bb = Aabb3::empty();
    for v in &self.vertices {
      bb.encapsulate(*v);
    }
    bb
  }

  /// Volume and centroid via a tetrahedral fan from the vertex average.
  ///
  /// With outward face winding every tetrahedron contributes a positive
  /// volume, so the sum is the exact cell volume.
  pub fn measures(&self) -> (f64, DVec3) {
    let n = self.vertices.len();
    if n < 4 {
      return (0.0, DVec3::ZERO);
    }
    let reference = self.vertices.iter().copied().sum::<DVec3>() / n as f64;

    let mut volume6 = 0.0;
    let mut moment6 = DVec3::ZERO;
    for face in &self.faces {
      let loop_ = &face.vertices;
      let v0 = self.vertices[loop_[0] as usize];
      for i in 1..loop_.len() - 1 {
        let v1 = self.vertices[loop_[i] as usize];
        let v2 = self.vertices[loop_[i + 1] as usize];
        let a = v0 - reference;
        let b = v1 - reference;
        let c = v2 - reference;
        let v6 = a.dot(b.cross(c));
        volume6 += v6;
        // Tetrahedron centroid is the average of its four corners.
        moment6 += v6 * (reference + v0 + v1 + v2) * 0.25;
      }
    }
    if volume6 <= 0.0 {
      return (0.0, reference);
    }
    (volume6 / 6.0, moment6 / volume6)
  }

  /// Clip the cell by the half-space `unit_normal . x <= offset`.
  ///
  /// `unit_normal` must be normalized; the new face (if any) is tagged with
  /// `tag`. Vertices within `tol` of the plane count as kept, which absorbs
  /// grazing cuts.
  pub fn clip(&mut self, unit_normal: DVec3, offset: f64, tag: FaceTag, tol: f64) -> ClipOutcome {
    let dist: Vec<f64> = self
      .vertices
      .iter()
      .map(|v| unit_normal.dot(*v) - offset)
      .collect();

    let any_outside = dist.iter().any(|&d| d > tol);
    if !any_outside {
      return ClipOutcome::Unchanged;
    }
    let any_inside = dist.iter().any(|&d| d <= tol);
    if !any_inside {
      self.vertices.clear();
      self.faces.clear();
      return ClipOutcome::Empty;
    }

    // Cut every face loop, sharing intersection vertices across the two faces
    // adjacent to each cut edge.
    let mut edge_cut: HashMap<(u32, u32), u32> = HashMap::new();
    let mut new_faces: Vec<Face> = Vec::with_capacity(self.faces.len() + 1);

    for face in &self.faces {
      let m = face.vertices.len();
      let mut kept: SmallVec<[u32; 8]> = SmallVec::new();
      for i in 0..m {
        let a = face.vertices[i];
        let b = face.vertices[(i + 1) % m];
        let da = dist[a as usize];
        let db = dist[b as usize];
        let a_in = da <= tol;
        let b_in = db <= tol;
        if a_in {
          kept.push(a);
        }
        if a_in != b_in {
          let key = (a.min(b), a.max(b));
          let idx = match edge_cut.get(&key) {
            Some(&idx) => idx,
            None => {
              let t = da / (da - db);
              let va = self.vertices[a as usize];
              let vb = self.vertices[b as usize];
              let idx = self.vertices.len() as u32;
              self.vertices.push(va.lerp(vb, t));
              edge_cut.insert(key, idx);
              idx
            }
          };
          kept.push(idx);
        }
      }
      if kept.len() >= 3 {
        new_faces.push(Face {
          tag: face.tag,
          vertices: kept,
        });
      }
    }

    // Close the cut with a face on the clipping plane, ordered angularly
    // about its centroid so the winding points outward (along unit_normal).
    let mut ring: Vec<u32> = edge_cut.values().copied().collect();
    if ring.len() >= 3 {
      let centroid = ring
        .iter()
        .map(|&i| self.vertices[i as usize])
        .sum::<DVec3>()
        / ring.len() as f64;
      let e1 = unit_normal.any_orthonormal_vector();
      let e2 = unit_normal.cross(e1);
      ring.sort_by(|&p, &q| {
        let rp = self.vertices[p as usize] - centroid;
        let rq = self.vertices[q as usize] - centroid;
        let ap = rp.dot(e2).atan2(rp.dot(e1));
        let aq = rq.dot(e2).atan2(rq.dot(e1));
        ap.total_cmp(&aq)
      });
      new_faces.push(Face {
        tag,
        vertices: SmallVec::from_vec(ring),
      });
    }

    self.faces = new_faces;
    self.compact();
    ClipOutcome::Clipped
  }

  /// Drop vertices no longer referenced by any face and remap the loops.
  fn compact(&mut self) {
    let mut remap: Vec<u32> = vec![u32::MAX; self.vertices.len()];
    let mut kept: Vec<DVec3> = Vec::with_capacity(self.vertices.len());
    for face in &mut self.faces {
      for idx in face.vertices.iter_mut() {
        let old = *idx as usize;
        if remap[old] == u32::MAX {
          remap[old] = kept.len() as u32;
          kept.push(self.vertices[old]);
        }
        *idx = remap[old];
      }
    }
    self.vertices = kept;
  }
}

#[cfg(test)]
#[path = "polyhedron_test.rs"]
mod polyhedron_test;
