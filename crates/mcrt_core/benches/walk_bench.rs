//! Ray walk benchmarks over random Voronoi grids.
//!
//! Measures the cost of the segment walk (point location plus bisector
//! stepping) as a function of grid size, which dominates the photon loop in
//! optically thin models.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use mcrt_core::{Aabb3, MeshGrid, Random};

fn build_grid(cells: usize, seed: u64) -> MeshGrid {
  let bounds = Aabb3::new(DVec3::splat(-1.0), DVec3::splat(1.0));
  let mut rng = Random::with_seed(seed);
  let sites: Vec<DVec3> = (0..cells).map(|_| rng.position_in_box(&bounds)).collect();
  MeshGrid::new(bounds, &sites, true).expect("grid construction")
}

fn bench_walk(c: &mut Criterion) {
  let mut group = c.benchmark_group("walk");
  for cells in [100usize, 1000, 10_000] {
    let grid = build_grid(cells, 1234);
    let mut rng = Random::with_seed(99);
    let rays: Vec<(DVec3, DVec3)> = (0..256)
      .map(|_| {
        let target = rng.position_in_box(grid.bounds());
        let origin = DVec3::new(-2.0, 2.0 * rng.uniform() - 1.0, 2.0 * rng.uniform() - 1.0);
        (origin, (target - origin).normalize())
      })
      .collect();

    group.bench_with_input(BenchmarkId::from_parameter(cells), &cells, |b, _| {
      let mut index = 0;
      b.iter(|| {
        let (origin, direction) = rays[index % rays.len()];
        index += 1;
        black_box(grid.walk(origin, direction))
      });
    });
  }
  group.finish();
}

fn bench_point_location(c: &mut Criterion) {
  let grid = build_grid(10_000, 77);
  let mut rng = Random::with_seed(7);
  let points: Vec<DVec3> = (0..1024).map(|_| rng.position_in_box(grid.bounds())).collect();

  c.bench_function("cell_index_at/10000", |b| {
    let mut index = 0;
    b.iter(|| {
      let p = points[index % points.len()];
      index += 1;
      black_box(grid.cell_index_at(p))
    });
  });
}

criterion_group!(benches, bench_walk, bench_point_location);
criterion_main!(benches);
