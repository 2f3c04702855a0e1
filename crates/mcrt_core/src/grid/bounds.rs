//! Axis-aligned domain box with double precision.

use glam::DVec3;

/// One of the six domain-wall faces of the simulation box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Wall {
  XMin,
  XMax,
  YMin,
  YMax,
  ZMin,
  ZMax,
}

impl Wall {
  pub const ALL: [Wall; 6] = [
    Wall::XMin,
    Wall::XMax,
    Wall::YMin,
    Wall::YMax,
    Wall::ZMin,
    Wall::ZMax,
  ];

  /// Axis perpendicular to this wall (0 = x, 1 = y, 2 = z).
  #[inline]
  pub fn axis(self) -> usize {
    match self {
      Wall::XMin | Wall::XMax => 0,
      Wall::YMin | Wall::YMax => 1,
      Wall::ZMin | Wall::ZMax => 2,
    }
  }

  /// True for the walls on the low side of their axis.
  #[inline]
  pub fn is_min(self) -> bool {
    matches!(self, Wall::XMin | Wall::YMin | Wall::ZMin)
  }

  /// Coordinate of the wall plane along its axis.
  #[inline]
  pub fn plane(self, bounds: &Aabb3) -> f64 {
    let corner = if self.is_min() { bounds.min } else { bounds.max };
    corner.to_array()[self.axis()]
  }

  /// Outward unit normal of the wall.
  pub fn outward_normal(self) -> DVec3 {
    let mut n = [0.0; 3];
    n[self.axis()] = if self.is_min() { -1.0 } else { 1.0 };
    DVec3::from_array(n)
  }
}

/// Double-precision axis-aligned bounding box.
///
/// Used both for the simulation domain and for per-cell bounding boxes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb3 {
  /// Minimum corner (inclusive).
  pub min: DVec3,
  /// Maximum corner (inclusive).
  pub max: DVec3,
}

impl Aabb3 {
  /// Create a new AABB from min and max corners.
  ///
  /// # Panics
  /// Debug-asserts that min <= max on all axes.
  pub fn new(min: DVec3, max: DVec3) -> Self {
    debug_assert!(
      min.x <= max.x && min.y <= max.y && min.z <= max.z,
      "AABB min must be <= max on all axes"
    );
    Self { min, max }
  }

  /// Create an AABB with inverted extents, ready for encapsulation.
  pub fn empty() -> Self {
    Self {
      min: DVec3::splat(f64::INFINITY),
      max: DVec3::splat(f64::NEG_INFINITY),
    }
  }

  /// Expand the AABB to include a point.
  #[inline]
  pub fn encapsulate(&mut self, point: DVec3) {
    self.min = self.min.min(point);
    self.max = self.max.max(point);
  }

  /// Check if the AABB contains a point (boundary inclusive).
  #[inline]
  pub fn contains_point(&self, point: DVec3) -> bool {
    point.x >= self.min.x
      && point.x <= self.max.x
      && point.y >= self.min.y
      && point.y <= self.max.y
      && point.z >= self.min.z
      && point.z <= self.max.z
  }

  /// Size of the AABB (max - min).
  #[inline]
  pub fn size(&self) -> DVec3 {
    self.max - self.min
  }

  /// Center of the AABB.
  #[inline]
  pub fn center(&self) -> DVec3 {
    (self.min + self.max) * 0.5
  }

  /// Length of the main diagonal.
  #[inline]
  pub fn diagonal(&self) -> f64 {
    self.size().length()
  }

  /// Volume of the AABB.
  #[inline]
  pub fn volume(&self) -> f64 {
    let s = self.size();
    s.x * s.y * s.z
  }

  /// Grow the AABB by `margin` on every side.
  pub fn expanded(&self, margin: f64) -> Self {
    Self {
      min: self.min - DVec3::splat(margin),
      max: self.max + DVec3::splat(margin),
    }
  }

  /// Distance along the ray to its first intersection with the AABB.
  ///
  /// Returns `Some(0.0)` when the origin is already inside, `None` when the
  /// ray misses the box. Slab method over the three axes.
  pub fn ray_entry(&self, origin: DVec3, direction: DVec3) -> Option<f64> {
    let o = origin.to_array();
    let d = direction.to_array();
    let lo = self.min.to_array();
    let hi = self.max.to_array();

    let mut t_enter = 0.0f64;
    let mut t_exit = f64::INFINITY;
    for axis in 0..3 {
      if d[axis] == 0.0 {
        if o[axis] < lo[axis] || o[axis] > hi[axis] {
          return None;
        }
      } else {
        let inv = 1.0 / d[axis];
        let mut ta = (lo[axis] - o[axis]) * inv;
        let mut tb = (hi[axis] - o[axis]) * inv;
        if ta > tb {
          std::mem::swap(&mut ta, &mut tb);
        }
        t_enter = t_enter.max(ta);
        t_exit = t_exit.min(tb);
        if t_enter > t_exit {
          return None;
        }
      }
    }
    Some(t_enter)
  }
}
