use glam::DVec3;

use super::*;

fn bounds() -> Aabb3 {
  Aabb3::new(DVec3::splat(-1.0), DVec3::splat(1.0))
}

fn random_sites(count: usize, seed: u64) -> Vec<DVec3> {
  let mut rng = Random::with_seed(seed);
  let b = bounds();
  (0..count).map(|_| rng.position_in_box(&b)).collect()
}

#[test]
fn test_empty_grid() {
  let grid = MeshGrid::new(bounds(), &[], true).unwrap();
  assert!(grid.is_empty());
  assert_eq!(grid.cell_index_at(DVec3::ZERO), None);
  assert!(grid.walk(DVec3::new(-2.0, 0.0, 0.0), DVec3::X).is_empty());
}

#[test]
fn test_volumes_sum_to_box_volume() {
  let sites = random_sites(100, 11);
  let grid = MeshGrid::new(bounds(), &sites, true).unwrap();
  assert_eq!(grid.cell_count(), 100);
  assert!((grid.total_volume() - 8.0).abs() < 1e-9);
}

#[test]
fn test_point_location_is_nearest_site() {
  let sites = random_sites(120, 12);
  let grid = MeshGrid::new(bounds(), &sites, true).unwrap();

  let mut rng = Random::with_seed(13);
  for _ in 0..500 {
    let p = rng.position_in_box(grid.bounds());
    let found = grid.cell_index_at(p).unwrap();
    let nearest = (0..grid.cell_count())
      .min_by(|&a, &b| {
        let da = (grid.site(a) - p).length_squared();
        let db = (grid.site(b) - p).length_squared();
        da.total_cmp(&db)
      })
      .unwrap();
    let d_found = (grid.site(found) - p).length_squared();
    let d_nearest = (grid.site(nearest) - p).length_squared();
    assert!((d_found - d_nearest).abs() < 1e-15);
  }
}

#[test]
fn test_outside_point_locates_to_none() {
  let grid = MeshGrid::new(bounds(), &random_sites(10, 14), true).unwrap();
  assert_eq!(grid.cell_index_at(DVec3::splat(1.5)), None);
}

#[test]
fn test_neighbor_relations_are_symmetric() {
  let sites = random_sites(60, 15);
  let grid = MeshGrid::new(bounds(), &sites, true).unwrap();
  for m in 0..grid.cell_count() {
    for &n in grid.neighbors(m) {
      if let Neighbor::Cell(i) = n {
        assert!(
          grid.neighbors(i as usize).contains(&Neighbor::Cell(m as u32)),
          "cell {i} does not list {m} back"
        );
      }
    }
  }
}

#[test]
fn test_coincident_sites_collapse_and_cover_domain() {
  // Three sites coincident within 1e-15: filtering retains one, and every
  // point in the domain locates to it.
  let site = DVec3::new(0.1, 0.2, 0.3);
  let sites = vec![
    site,
    site + DVec3::splat(1e-15),
    site - DVec3::new(0.0, 1e-15, 0.0),
  ];
  let grid = MeshGrid::new(bounds(), &sites, true).unwrap();
  assert_eq!(grid.cell_count(), 1);

  let mut rng = Random::with_seed(16);
  for _ in 0..100 {
    let p = rng.position_in_box(grid.bounds());
    assert_eq!(grid.cell_index_at(p), Some(0));
  }
}

#[test]
fn test_centroids_lie_inside_their_cell() {
  let sites = random_sites(50, 17);
  let grid = MeshGrid::new(bounds(), &sites, true).unwrap();
  for m in 0..grid.cell_count() {
    assert_eq!(grid.cell_index_at(grid.centroid(m)), Some(m));
    assert!(grid.cell_bbox(m).contains_point(grid.centroid(m)));
  }
}

#[test]
fn test_generate_position_in_cell() {
  let sites = random_sites(40, 18);
  let grid = MeshGrid::new(bounds(), &sites, true).unwrap();
  let mut rng = Random::with_seed(19);
  for m in 0..grid.cell_count() {
    let p = grid.generate_position_in_cell(m, &mut rng).unwrap();
    assert_eq!(grid.cell_index_at(p), Some(m));
  }
}

#[test]
fn test_generate_position_without_weights_fails() {
  let grid = MeshGrid::new(bounds(), &random_sites(5, 20), true).unwrap();
  let mut rng = Random::with_seed(21);
  assert!(matches!(
    grid.generate_position(&mut rng),
    Err(Error::NoMassDistribution)
  ));
}

#[test]
fn test_generate_position_follows_weights() {
  let sites = vec![DVec3::new(-0.5, 0.0, 0.0), DVec3::new(0.5, 0.0, 0.0)];
  let mut grid = MeshGrid::new(bounds(), &sites, true).unwrap();
  grid.set_cell_weights(&[0.0, 1.0]).unwrap();

  let mut rng = Random::with_seed(22);
  for _ in 0..200 {
    let p = grid.generate_position(&mut rng).unwrap();
    assert_eq!(grid.cell_index_at(p), Some(1));
  }
}

#[test]
fn test_non_positive_weights_suppress_distribution() {
  let mut grid = MeshGrid::new(bounds(), &random_sites(4, 23), true).unwrap();
  grid.set_cell_weights(&[0.0, 0.0, 0.0, 0.0]).unwrap();
  let mut rng = Random::with_seed(24);
  assert!(grid.generate_position(&mut rng).is_err());
}

#[test]
fn test_weight_length_mismatch_is_an_error() {
  let mut grid = MeshGrid::new(bounds(), &random_sites(4, 25), true).unwrap();
  assert!(grid.set_cell_weights(&[1.0, 2.0]).is_err());
}
