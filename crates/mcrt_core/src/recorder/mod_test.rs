use std::sync::Arc;

use glam::DVec3;

use super::*;
use crate::packet::{PhotonPacket, StokesVector};
use crate::wavelengths::{ListWavelengthGrid, WavelengthGrid};

/// Ten unit-width bins covering [1, 11).
fn grid10() -> Arc<dyn WavelengthGrid> {
  Arc::new(ListWavelengthGrid::from_borders((1..=11).map(f64::from).collect()).unwrap())
}

/// Wavelength safely inside bin `ell` of `grid10`.
fn lambda(ell: usize) -> f64 {
  1.25 + ell as f64
}

fn ifu_config() -> IfuConfig {
  IfuConfig {
    distance: 10.0,
    nx: 4,
    ny: 4,
    pixel_size_x: 1.0,
    pixel_size_y: 1.0,
    center_x: 0.0,
    center_y: 0.0,
  }
}

fn total_only_recorder() -> FluxRecorder {
  let mut recorder = FluxRecorder::new("inst", grid10())
    .with_medium(true, false)
    .with_statistics()
    .with_sed(SedConfig { distance: 10.0 })
    .with_ifu(ifu_config());
  recorder.finalize_configuration().unwrap();
  recorder
}

fn component_recorder(levels: usize) -> FluxRecorder {
  let mut recorder = FluxRecorder::new("inst", grid10())
    .with_medium(true, true)
    .with_components(levels)
    .with_sed(SedConfig { distance: 10.0 })
    .with_ifu(ifu_config());
  recorder.finalize_configuration().unwrap();
  recorder
}

#[test]
fn test_channel_count_formula() {
  // Total-only: 1 channel.
  assert_eq!(total_only_recorder().channel_count(), 1);

  // Components without medium fall back to total-only.
  let mut recorder = FluxRecorder::new("inst", grid10())
    .with_components(3)
    .with_medium(false, false)
    .with_sed(SedConfig { distance: 10.0 });
  recorder.finalize_configuration().unwrap();
  assert_eq!(recorder.channel_count(), 1);

  // 5 components + 3 Stokes + S levels.
  let mut recorder = FluxRecorder::new("inst", grid10())
    .with_medium(true, true)
    .with_components(2)
    .with_polarization()
    .with_sed(SedConfig { distance: 10.0 });
  recorder.finalize_configuration().unwrap();
  assert_eq!(recorder.channel_count(), 5 + 3 + 2);

  // Polarization alone adds Stokes channels to the total-only set.
  let mut recorder = FluxRecorder::new("inst", grid10())
    .with_medium(true, false)
    .with_polarization()
    .with_sed(SedConfig { distance: 10.0 });
  recorder.finalize_configuration().unwrap();
  assert_eq!(recorder.channel_count(), 1 + 3);
}

#[test]
fn test_total_only_detection_and_history_statistics() {
  // Two detections on one history, then one on a new history: the total
  // channel accumulates plain luminosities while the moments fold the
  // extincted per-history weights.
  let recorder = total_only_recorder();
  let ell = 3;

  let first = PhotonPacket::launch_primary(1, lambda(ell), 2.0, DVec3::X);
  let tau = std::f64::consts::LN_2;
  recorder.detect(&first, Some(7), tau);
  recorder.detect(&first, Some(7), tau);

  let second = PhotonPacket::launch_primary(2, lambda(ell), 1.0, DVec3::X);
  recorder.detect(&second, Some(7), 0.0);
  recorder.flush();

  let total = recorder.sed_channel(TOTAL);
  assert_eq!(total[ell], 5.0);

  // History 1 folds w = 2 * exp(-ln 2) = 2.0; history 2 folds w = 1.0.
  let w1 = recorder.sed_moments(0).unwrap();
  let w2 = recorder.sed_moments(1).unwrap();
  assert_eq!(w1[ell], 3.0);
  assert_eq!(w2[ell], 5.0);
}

#[test]
fn test_scatter_level_routing() {
  // A twice-scattered primary packet lands in PrimaryScattered and in the
  // second level channel, not the first.
  let recorder = component_recorder(2);
  let ell = 0;

  let mut packet = PhotonPacket::launch_primary(1, lambda(ell), 1.0, DVec3::X);
  packet.scatter(DVec3::Y, StokesVector::unpolarized());
  packet.scatter(DVec3::Z, StokesVector::unpolarized());
  recorder.detect(&packet, None, 0.0);

  assert_eq!(recorder.sed_channel(PRIMARY_SCATTERED)[ell], 1.0);
  let layout = recorder.layout.as_ref().unwrap();
  let (first_level, _) = layout.levels.unwrap();
  assert_eq!(recorder.sed_channel(first_level)[ell], 0.0);
  assert_eq!(recorder.sed_channel(first_level + 1)[ell], 1.0);

  // A third scattering exceeds S = 2: no level channel is touched.
  packet.scatter(DVec3::X, StokesVector::unpolarized());
  recorder.detect(&packet, None, 0.0);
  assert_eq!(recorder.sed_channel(first_level)[ell], 0.0);
  assert_eq!(recorder.sed_channel(first_level + 1)[ell], 1.0);
  assert_eq!(recorder.sed_channel(PRIMARY_SCATTERED)[ell], 2.0);
}

#[test]
fn test_component_routing_by_origin_and_scattering() {
  let recorder = component_recorder(0);
  let ell = 2;
  let tau = 1.0;
  let attenuation = (-1.0f64).exp();

  let primary = PhotonPacket::launch_primary(1, lambda(ell), 3.0, DVec3::X);
  recorder.detect(&primary, None, tau);
  assert_eq!(recorder.sed_channel(TRANSPARENT)[ell], 3.0);
  assert!((recorder.sed_channel(PRIMARY_DIRECT)[ell] - 3.0 * attenuation).abs() < 1e-12);

  let mut secondary = PhotonPacket::launch_secondary(2, lambda(ell), 2.0, DVec3::X);
  recorder.detect(&secondary, None, 0.0);
  assert_eq!(recorder.sed_channel(SECONDARY_DIRECT)[ell], 2.0);

  secondary.scatter(DVec3::Y, StokesVector::unpolarized());
  recorder.detect(&secondary, None, 0.0);
  assert_eq!(recorder.sed_channel(SECONDARY_SCATTERED)[ell], 2.0);
}

#[test]
fn test_missed_pixel_updates_sed_only() {
  let recorder = total_only_recorder();
  let packet = PhotonPacket::launch_primary(1, lambda(4), 1.5, DVec3::X);
  recorder.detect(&packet, None, 0.0);

  assert_eq!(recorder.sed_channel(TOTAL)[4], 1.5);
  assert!(recorder.ifu_channel(TOTAL).iter().all(|&v| v == 0.0));
}

#[test]
fn test_ifu_bin_layout() {
  let recorder = total_only_recorder();
  let packet = PhotonPacket::launch_primary(1, lambda(2), 1.0, DVec3::X);
  recorder.detect(&packet, Some(5), 0.0);

  let cube = recorder.ifu_channel(TOTAL);
  assert_eq!(cube[5 + 2 * 16], 1.0);
  assert_eq!(cube.iter().sum::<f64>(), 1.0);
}

#[test]
fn test_out_of_grid_wavelength_is_ignored() {
  let recorder = total_only_recorder();
  let packet = PhotonPacket::launch_primary(1, 99.0, 1.0, DVec3::X);
  recorder.detect(&packet, Some(0), 0.0);
  assert!(recorder.sed_channel(TOTAL).iter().all(|&v| v == 0.0));
}

#[test]
fn test_polarization_channels() {
  let mut recorder = FluxRecorder::new("inst", grid10())
    .with_medium(true, true)
    .with_components(0)
    .with_polarization()
    .with_sed(SedConfig { distance: 10.0 });
  recorder.finalize_configuration().unwrap();

  let ell = 1;
  let mut packet = PhotonPacket::launch_primary(1, lambda(ell), 2.0, DVec3::X);
  packet.scatter(
    DVec3::Y,
    StokesVector {
      q: 0.5,
      u: -0.25,
      v: 0.125,
    },
  );
  recorder.detect(&packet, None, 0.0);

  let layout = recorder.layout.as_ref().unwrap();
  let stokes_first = layout.stokes.unwrap();
  assert_eq!(recorder.sed_channel(stokes_first)[ell], 1.0);
  assert_eq!(recorder.sed_channel(stokes_first + 1)[ell], -0.5);
  assert_eq!(recorder.sed_channel(stokes_first + 2)[ell], 0.25);
}

#[test]
fn test_flush_is_idempotent() {
  let recorder = total_only_recorder();
  let packet = PhotonPacket::launch_primary(1, lambda(3), 2.0, DVec3::X);
  recorder.detect(&packet, Some(1), 0.0);

  recorder.flush();
  let after_first = recorder.sed_moments(0).unwrap();
  recorder.flush();
  let after_second = recorder.sed_moments(0).unwrap();
  assert_eq!(after_first, after_second);
  assert_eq!(recorder.sed_channel(TOTAL)[3], 2.0);
}

#[test]
fn test_detect_before_finalize_is_rejected_in_debug() {
  let recorder = FluxRecorder::new("inst", grid10()).with_sed(SedConfig { distance: 10.0 });
  let packet = PhotonPacket::launch_primary(1, lambda(0), 1.0, DVec3::X);
  let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
    recorder.detect(&packet, None, 0.0);
  }));
  if cfg!(debug_assertions) {
    assert!(outcome.is_err());
  } else {
    assert!(outcome.is_ok());
  }
}

#[test]
fn test_double_finalize_is_an_error() {
  let mut recorder = FluxRecorder::new("inst", grid10()).with_sed(SedConfig { distance: 10.0 });
  recorder.finalize_configuration().unwrap();
  assert!(recorder.finalize_configuration().is_err());
}

#[test]
fn test_concurrent_detection_totals() {
  // Many threads hammer the same bin; the lock-free accumulation must not
  // lose a single contribution.
  let recorder = Arc::new(total_only_recorder());
  let threads = 8;
  let per_thread = 500;

  std::thread::scope(|scope| {
    for thread_index in 0..threads {
      let recorder = Arc::clone(&recorder);
      scope.spawn(move || {
        for i in 0..per_thread {
          let history = (thread_index * per_thread + i) as u64;
          let packet = PhotonPacket::launch_primary(history, lambda(5), 1.0, DVec3::X);
          recorder.detect(&packet, Some(3), 0.0);
        }
      });
    }
  });
  recorder.flush();

  let expected = (threads * per_thread) as f64;
  assert_eq!(recorder.sed_channel(TOTAL)[5], expected);
  // Each history contributed w = 1 exactly once.
  assert_eq!(recorder.sed_moments(0).unwrap()[5], expected);
  assert_eq!(recorder.sed_moments(1).unwrap()[5], expected);
}
