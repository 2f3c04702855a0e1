//! Photon packet carried through the transport loop.

use glam::DVec3;

/// Polarization state relative to unit intensity.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StokesVector {
  pub q: f64,
  pub u: f64,
  pub v: f64,
}

impl StokesVector {
  pub fn unpolarized() -> Self {
    Self::default()
  }

  /// Linear polarization degree `sqrt(Q^2 + U^2)`.
  pub fn linear_degree(&self) -> f64 {
    (self.q * self.q + self.u * self.u).sqrt()
  }
}

/// A luminosity packet and its full emission-and-scatter state.
///
/// The history index identifies the packet's complete chain from emission
/// through every scattering; it stays fixed across all detections of the
/// same history.
#[derive(Clone, Debug)]
pub struct PhotonPacket {
  wavelength: f64,
  direction: DVec3,
  luminosity: f64,
  stokes: StokesVector,
  num_scatterings: u32,
  primary_origin: bool,
  history_index: u64,
}

impl PhotonPacket {
  /// Launch a packet from a primary source.
  pub fn launch_primary(history_index: u64, wavelength: f64, luminosity: f64, direction: DVec3) -> Self {
    Self {
      wavelength,
      direction: direction.normalize(),
      luminosity,
      stokes: StokesVector::unpolarized(),
      num_scatterings: 0,
      primary_origin: true,
      history_index,
    }
  }

  /// Launch a packet from a medium (secondary) source.
  pub fn launch_secondary(history_index: u64, wavelength: f64, luminosity: f64, direction: DVec3) -> Self {
    Self {
      primary_origin: false,
      ..Self::launch_primary(history_index, wavelength, luminosity, direction)
    }
  }

  pub fn wavelength(&self) -> f64 {
    self.wavelength
  }

  pub fn direction(&self) -> DVec3 {
    self.direction
  }

  pub fn luminosity(&self) -> f64 {
    self.luminosity
  }

  pub fn stokes(&self) -> StokesVector {
    self.stokes
  }

  pub fn num_scatterings(&self) -> u32 {
    self.num_scatterings
  }

  pub fn has_primary_origin(&self) -> bool {
    self.primary_origin
  }

  pub fn history_index(&self) -> u64 {
    self.history_index
  }

  /// Scale the luminosity (biasing, splitting).
  pub fn apply_bias(&mut self, factor: f64) {
    self.luminosity *= factor;
  }

  /// Register a scattering event: new propagation direction, updated Stokes
  /// state, scatter count incremented.
  pub fn scatter(&mut self, direction: DVec3, stokes: StokesVector) {
    self.direction = direction.normalize();
    self.stokes = stokes;
    self.num_scatterings += 1;
  }
}
