//! Material mix interface consumed by the transport loop.
//!
//! The core needs a small capability set per medium component: cross
//! sections, state-aware opacities, and in-place scattering of a photon
//! packet. Concrete physics beyond the electron mix (dust optical
//! properties, Mueller machinery) lives outside this crate behind the same
//! trait.

use crate::packet::{PhotonPacket, StokesVector};
use crate::random::Random;

/// Thomson cross section for scattering off free electrons (m^2).
pub const SIGMA_THOMSON: f64 = 6.652_458_732_1e-29;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialType {
  Dust,
  Electrons,
  Gas,
}

/// How the mix samples scattering directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScatteringMode {
  /// Scalar phase function of the scattering angle only.
  PhaseFunction,
  /// Phase function plus Stokes vector transformation.
  SphericalPolarization,
}

/// Local medium state in one spatial cell.
#[derive(Clone, Copy, Debug)]
pub struct MediumState {
  /// Number density of the interacting particles (1/m^3).
  pub number_density: f64,
}

/// Capability set of one medium component.
pub trait MaterialMix: Send + Sync {
  fn material_type(&self) -> MaterialType;

  fn scattering_mode(&self) -> ScatteringMode;

  /// True when scattering transforms the Stokes vector.
  fn has_polarized_scattering(&self) -> bool {
    self.scattering_mode() == ScatteringMode::SphericalPolarization
  }

  /// Absorption cross section per particle at a wavelength (m^2).
  fn section_abs(&self, wavelength: f64) -> f64;

  /// Scattering cross section per particle at a wavelength (m^2).
  fn section_sca(&self, wavelength: f64) -> f64;

  fn section_ext(&self, wavelength: f64) -> f64 {
    self.section_abs(wavelength) + self.section_sca(wavelength)
  }

  /// Absorption opacity in a given medium state (1/m).
  fn opacity_abs(&self, wavelength: f64, state: &MediumState) -> f64 {
    state.number_density * self.section_abs(wavelength)
  }

  /// Scattering opacity in a given medium state (1/m).
  fn opacity_sca(&self, wavelength: f64, state: &MediumState) -> f64 {
    state.number_density * self.section_sca(wavelength)
  }

  /// Extinction opacity in a given medium state (1/m).
  fn opacity_ext(&self, wavelength: f64, state: &MediumState) -> f64 {
    state.number_density * self.section_ext(wavelength)
  }

  /// Scatter the packet in place: new direction, updated Stokes vector,
  /// incremented scatter count.
  fn perform_scattering(
    &self,
    wavelength: f64,
    state: &MediumState,
    packet: &mut PhotonPacket,
    rng: &mut Random,
  );
}

// =============================================================================
// ElectronMix - Thomson scattering off free electrons
// =============================================================================

/// Free-electron mix: wavelength-independent Thomson scattering with a
/// dipole phase function and zero absorption.
pub struct ElectronMix {
  polarization: bool,
}

impl ElectronMix {
  pub fn new(polarization: bool) -> Self {
    Self { polarization }
  }

  /// Sample the cosine of the scattering angle from the dipole phase
  /// function `p(cos) ~ 1 + cos^2` by rejection.
  fn sample_dipole_cosine(rng: &mut Random) -> f64 {
    loop {
      let cosine = 2.0 * rng.uniform() - 1.0;
      if rng.uniform() <= 0.5 * (1.0 + cosine * cosine) {
        return cosine;
      }
    }
  }
}

impl MaterialMix for ElectronMix {
  fn material_type(&self) -> MaterialType {
    MaterialType::Electrons
  }

  fn scattering_mode(&self) -> ScatteringMode {
    if self.polarization {
      ScatteringMode::SphericalPolarization
    } else {
      ScatteringMode::PhaseFunction
    }
  }

  fn section_abs(&self, _wavelength: f64) -> f64 {
    0.0
  }

  fn section_sca(&self, _wavelength: f64) -> f64 {
    SIGMA_THOMSON
  }

  fn perform_scattering(
    &self,
    _wavelength: f64,
    _state: &MediumState,
    packet: &mut PhotonPacket,
    rng: &mut Random,
  ) {
    let cosine = Self::sample_dipole_cosine(rng);
    let sine = (1.0 - cosine * cosine).max(0.0).sqrt();
    let azimuth = 2.0 * std::f64::consts::PI * rng.uniform();

    let forward = packet.direction();
    let (e1, e2) = forward.any_orthonormal_pair();
    let direction = cosine * forward + sine * (azimuth.cos() * e1 + azimuth.sin() * e2);

    let stokes = if self.polarization {
      // Dipole scattering of (effectively) unpolarized incident light
      // induces linear polarization perpendicular to the scattering plane.
      let degree = (1.0 - cosine * cosine) / (1.0 + cosine * cosine);
      StokesVector {
        q: -degree,
        u: 0.0,
        v: packet.stokes().v,
      }
    } else {
      packet.stokes()
    };

    packet.scatter(direction, stokes);
  }
}
