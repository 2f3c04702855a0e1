//! Point-location acceleration: block lists and per-block k-d trees.
//!
//! The domain is cut into `nb x nb x nb` uniform blocks; each block lists the
//! cells whose (eps-expanded) bounding box overlaps it. Blocks holding more
//! than a handful of cells additionally carry a k-d tree over the cell sites,
//! so nearest-site queries stay logarithmic in crowded regions.

use glam::DVec3;

use super::bounds::Aabb3;

/// Blocks with more cells than this build a search tree.
const TREE_THRESHOLD: usize = 5;

/// Arena-allocated k-d tree node; children are arena indices.
struct KdNode {
  cell: u32,
  site: DVec3,
  left: Option<u32>,
  right: Option<u32>,
}

struct KdTree {
  nodes: Vec<KdNode>,
  root: u32,
}

impl KdTree {
  /// Build by recursive median split on `depth mod 3`, ties broken
  /// lexicographically with the axis cycling first.
  fn build(items: &mut [(u32, DVec3)]) -> Self {
    let mut nodes = Vec::with_capacity(items.len());
    let root = Self::build_recursive(items, 0, &mut nodes);
    debug_assert!(root.is_some());
    Self {
      nodes,
      root: root.unwrap_or(0),
    }
  }

  fn build_recursive(
    items: &mut [(u32, DVec3)],
    depth: usize,
    nodes: &mut Vec<KdNode>,
  ) -> Option<u32> {
    if items.is_empty() {
      return None;
    }
    let axis = depth % 3;
    let mid = items.len() / 2;
    items.select_nth_unstable_by(mid, |a, b| cmp_cyclic(a.1, b.1, axis));
    let (cell, site) = items[mid];

    let index = nodes.len() as u32;
    nodes.push(KdNode {
      cell,
      site,
      left: None,
      right: None,
    });

    let (low, rest) = items.split_at_mut(mid);
    let high = &mut rest[1..];
    let left = Self::build_recursive(low, depth + 1, nodes);
    let right = Self::build_recursive(high, depth + 1, nodes);
    nodes[index as usize].left = left;
    nodes[index as usize].right = right;
    Some(index)
  }

  fn nearest(&self, point: DVec3) -> (u32, f64) {
    let mut best = (u32::MAX, f64::INFINITY);
    self.search(self.root, point, 0, &mut best);
    best
  }

  fn search(&self, index: u32, point: DVec3, depth: usize, best: &mut (u32, f64)) {
    let node = &self.nodes[index as usize];
    let d_sq = (node.site - point).length_squared();
    if d_sq < best.1 {
      *best = (node.cell, d_sq);
    }

    let axis = depth % 3;
    let delta = point.to_array()[axis] - node.site.to_array()[axis];
    let (near, far) = if delta < 0.0 {
      (node.left, node.right)
    } else {
      (node.right, node.left)
    };
    if let Some(near) = near {
      self.search(near, point, depth + 1, best);
    }
    // Only cross the splitting plane when it can still hold a closer site.
    if delta * delta < best.1 {
      if let Some(far) = far {
        self.search(far, point, depth + 1, best);
      }
    }
  }
}

/// Lexicographic comparison starting at `axis` and cycling through the rest.
fn cmp_cyclic(a: DVec3, b: DVec3, axis: usize) -> std::cmp::Ordering {
  let a = a.to_array();
  let b = b.to_array();
  a[axis]
    .total_cmp(&b[axis])
    .then(a[(axis + 1) % 3].total_cmp(&b[(axis + 1) % 3]))
    .then(a[(axis + 2) % 3].total_cmp(&b[(axis + 2) % 3]))
}

struct Block {
  cells: Vec<u32>,
  tree: Option<KdTree>,
}

/// Uniform block grid over the cell bounding boxes.
pub(crate) struct BlockGrid {
  min: DVec3,
  inv_block_size: DVec3,
  nb: usize,
  blocks: Vec<Block>,
}

impl BlockGrid {
  /// Block count per axis for `cell_count` cells.
  pub fn blocks_per_axis(cell_count: usize) -> usize {
    ((3.0 * (cell_count as f64).cbrt()).round() as usize).clamp(3, 1000)
  }

  /// Build block lists from the cell bounding boxes (expanded by `eps`),
  /// then a search tree for every block holding more than five cells.
  pub fn build(bounds: &Aabb3, sites: &[DVec3], bboxes: &[Aabb3], eps: f64) -> Self {
    let nb = Self::blocks_per_axis(sites.len());
    let block_size = bounds.size() / nb as f64;
    let mut grid = Self {
      min: bounds.min,
      inv_block_size: DVec3::ONE / block_size,
      nb,
      blocks: (0..nb * nb * nb)
        .map(|_| Block {
          cells: Vec::new(),
          tree: None,
        })
        .collect(),
    };

    for (cell, bbox) in bboxes.iter().enumerate() {
      let (i0, j0, k0) = grid.block_coords(bbox.min - DVec3::splat(eps));
      let (i1, j1, k1) = grid.block_coords(bbox.max + DVec3::splat(eps));
      for i in i0..=i1 {
        for j in j0..=j1 {
          for k in k0..=k1 {
            let linear = grid.linear(i, j, k);
            grid.blocks[linear].cells.push(cell as u32);
          }
        }
      }
    }

    for block in &mut grid.blocks {
      if block.cells.len() > TREE_THRESHOLD {
        let mut items: Vec<(u32, DVec3)> = block
          .cells
          .iter()
          .map(|&c| (c, sites[c as usize]))
          .collect();
        block.tree = Some(KdTree::build(&mut items));
      }
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

  /// Cell whose site is nearest to `point`, searching only the block that
  /// contains the point. `None` when the block is empty.
  pub fn nearest_cell(&self, point: DVec3, sites: &[DVec3]) -> Option<usize> {
    let (i, j, k) = self.block_coords(point);
    let block = &self.blocks[self.linear(i, j, k)];

    if let Some(tree) = &block.tree {
      let (cell, _) = tree.nearest(point);
      return Some(cell as usize);
    }

    let mut best = (usize::MAX, f64::INFINITY);
    for &cell in &block.cells {
      let d_sq = (sites[cell as usize] - point).length_squared();
      if d_sq < best.1 {
        best = (cell as usize, d_sq);
      }
    }
    (best.0 != usize::MAX).then_some(best.0)
  }

  /// (block count, cells in the fullest block, blocks carrying a tree).
  pub fn statistics(&self) -> (usize, usize, usize) {
    let max_cells = self.blocks.iter().map(|b| b.cells.len()).max().unwrap_or(0);
    let trees = self.blocks.iter().filter(|b| b.tree.is_some()).count();
    (self.blocks.len(), max_cells, trees)
  }
}

#[cfg(test)]
#[path = "blocks_test.rs"]
mod blocks_test;
