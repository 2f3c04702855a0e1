//! Flux recorder: concurrent detection, per-history statistics, calibration.
//!
//! One recorder serves one synthetic instrument. Worker threads call
//! [`detect`](FluxRecorder::detect) for every photon packet reaching the
//! instrument; contributions are demultiplexed into lock-free detector
//! arrays (SED columns and IFU cubes, split over components, Stokes channels
//! and scatter orders as configured). Per-history statistics are buffered in
//! thread-local queues and folded when a new history arrives.
//!
//! # Module structure
//!
//! - [`atomics`]: lock-free `f64` accumulator cells
//! - [`contribution`]: per-thread queues and moment folding
//! - `calibrate`: cross-process reduction, calibration and output

mod atomics;
mod calibrate;
mod contribution;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use crate::error::{Error, Result};
use crate::packet::PhotonPacket;
use crate::wavelengths::WavelengthGrid;

pub use atomics::AtomicF64;
pub use contribution::{MomentSet, MOMENT_ORDERS};

use atomics::zeroed;
use contribution::ContributionList;

// Channel indices. In total-only mode the single channel sits at index 0;
// in component mode the five components occupy the first five slots.
const TOTAL: usize = 0;
const TRANSPARENT: usize = 0;
const PRIMARY_DIRECT: usize = 1;
const PRIMARY_SCATTERED: usize = 2;
const SECONDARY_DIRECT: usize = 3;
const SECONDARY_SCATTERED: usize = 4;
const COMPONENT_COUNT: usize = 5;

/// SED recording parameters.
#[derive(Clone, Debug)]
pub struct SedConfig {
  /// Distance from the model to the instrument.
  pub distance: f64,
}

/// IFU cube recording parameters.
#[derive(Clone, Debug)]
pub struct IfuConfig {
  pub distance: f64,
  pub nx: usize,
  pub ny: usize,
  pub pixel_size_x: f64,
  pub pixel_size_y: f64,
  pub center_x: f64,
  pub center_y: f64,
}

impl IfuConfig {
  fn pixels_per_frame(&self) -> usize {
    self.nx * self.ny
  }
}

/// Resolved channel layout, fixed at finalization.
#[derive(Clone, Debug)]
struct ChannelLayout {
  total_only: bool,
  /// Index of the Stokes Q channel; U and V follow.
  stokes: Option<usize>,
  /// First scatter-order channel and the number of levels.
  levels: Option<(usize, usize)>,
  count: usize,
}

/// Per-thread contribution buffers, keyed by thread id so `flush` can drain
/// every thread's pending history from the parent.
#[derive(Default)]
struct ThreadSlots {
  slots: RwLock<HashMap<ThreadId, Arc<Mutex<ContributionList>>>>,
}

impl ThreadSlots {
  fn current(&self) -> Arc<Mutex<ContributionList>> {
    let id = thread::current().id();
    if let Some(slot) = self.slots.read().unwrap().get(&id) {
      return Arc::clone(slot);
    }
    let mut slots = self.slots.write().unwrap();
    Arc::clone(slots.entry(id).or_default())
  }

  fn all(&self) -> Vec<Arc<Mutex<ContributionList>>> {
    self.slots.read().unwrap().values().cloned().collect()
  }
}

/// Deferred-aggregation detector for one instrument.
pub struct FluxRecorder {
  instrument: String,
  wavelengths: Arc<dyn WavelengthGrid>,
  has_medium: bool,
  has_medium_emission: bool,
  record_components: bool,
  scattering_levels: usize,
  record_polarization: bool,
  record_statistics: bool,
  sed: Option<SedConfig>,
  ifu: Option<IfuConfig>,

  layout: Option<ChannelLayout>,
  /// Channel-indexed SED arrays, each of length `len(wavelengths)`.
  sed_arrays: Vec<Vec<AtomicF64>>,
  /// Channel-indexed IFU arrays, laid out as `pixel + ell * (nx * ny)`.
  ifu_arrays: Vec<Vec<AtomicF64>>,
  sed_moments: Option<MomentSet>,
  ifu_moments: Option<MomentSet>,
  slots: ThreadSlots,
}

impl FluxRecorder {
  pub fn new(instrument: impl Into<String>, wavelengths: Arc<dyn WavelengthGrid>) -> Self {
    Self {
      instrument: instrument.into(),
      wavelengths,
      has_medium: false,
      has_medium_emission: false,
      record_components: false,
      scattering_levels: 0,
      record_polarization: false,
      record_statistics: false,
      sed: None,
      ifu: None,
      layout: None,
      sed_arrays: Vec::new(),
      ifu_arrays: Vec::new(),
      sed_moments: None,
      ifu_moments: None,
      slots: ThreadSlots::default(),
    }
  }

  /// Declare whether a transfer medium is present and whether it emits.
  pub fn with_medium(mut self, present: bool, emits: bool) -> Self {
    self.has_medium = present;
    self.has_medium_emission = emits;
    self
  }

  /// Record per-component channels, with `levels` extra "scattered exactly
  /// n times" channels for primary radiation.
  pub fn with_components(mut self, levels: usize) -> Self {
    self.record_components = true;
    self.scattering_levels = levels;
    self
  }

  /// Record Stokes Q/U/V channels.
  pub fn with_polarization(mut self) -> Self {
    self.record_polarization = true;
    self
  }

  /// Accumulate per-history statistical moments.
  pub fn with_statistics(mut self) -> Self {
    self.record_statistics = true;
    self
  }

  pub fn with_sed(mut self, config: SedConfig) -> Self {
    self.sed = Some(config);
    self
  }

  pub fn with_ifu(mut self, config: IfuConfig) -> Self {
    self.ifu = Some(config);
    self
  }

  /// Allocate the detector arrays; the configuration is frozen afterwards.
  ///
  /// Only the `Total` channel is allocated when components are off or no
  /// medium is present; nothing scatters in an empty model, so the split
  /// would be vacuous.
  pub fn finalize_configuration(&mut self) -> Result<()> {
    if self.layout.is_some() {
      return Err(Error::InvalidConfiguration(
        "recorder already finalized".into(),
      ));
    }
    if self.wavelengths.is_empty() {
      return Err(Error::InvalidConfiguration(
        "recorder needs a non-empty wavelength grid".into(),
      ));
    }
    if let Some(ifu) = &self.ifu {
      if ifu.nx == 0 || ifu.ny == 0 || ifu.distance <= 0.0 {
        return Err(Error::InvalidConfiguration(
          "IFU frame needs positive dimensions and distance".into(),
        ));
      }
    }
    if let Some(sed) = &self.sed {
      if sed.distance <= 0.0 {
        return Err(Error::InvalidConfiguration(
          "SED recording needs a positive distance".into(),
        ));
      }
    }

    let total_only = !self.record_components || !self.has_medium;
    let mut count = if total_only { 1 } else { COMPONENT_COUNT };
    let stokes = self.record_polarization.then(|| {
      let first = count;
      count += 3;
      first
    });
    let levels = (!total_only && self.scattering_levels > 0).then(|| {
      let first = count;
      count += self.scattering_levels;
      (first, self.scattering_levels)
    });

    let num_wavelengths = self.wavelengths.len();
    if self.sed.is_some() {
      self.sed_arrays = (0..count).map(|_| zeroed(num_wavelengths)).collect();
      if self.record_statistics {
        self.sed_moments = Some(MomentSet::new(num_wavelengths));
      }
    }
    if let Some(ifu) = &self.ifu {
      let bins = ifu.pixels_per_frame() * num_wavelengths;
      self.ifu_arrays = (0..count).map(|_| zeroed(bins)).collect();
      if self.record_statistics {
        self.ifu_moments = Some(MomentSet::new(bins));
      }
    }

    self.layout = Some(ChannelLayout {
      total_only,
      stokes,
      levels,
      count,
    });
    Ok(())
  }

  pub fn instrument(&self) -> &str {
    &self.instrument
  }

  /// Number of channels allocated per enabled family.
  pub fn channel_count(&self) -> usize {
    self.layout.as_ref().map_or(0, |layout| layout.count)
  }

  // ---------------------------------------------------------------------
  // Detection
  // ---------------------------------------------------------------------

  /// Record a packet reaching the instrument.
  ///
  /// `pixel` is the IFU pixel index, `None` when the packet misses the field
  /// of view; `optical_depth` is the extinction from the last interaction to
  /// the instrument. Safe to call concurrently from any thread; detections
  /// of one history must stay on one thread.
  pub fn detect(&self, packet: &PhotonPacket, pixel: Option<usize>, optical_depth: f64) {
    let Some(layout) = &self.layout else {
      debug_assert!(false, "detect before finalize_configuration");
      return;
    };
    let Some(ell) = self.wavelengths.bin(packet.wavelength()) else {
      return;
    };

    let luminosity = packet.luminosity();
    let extincted = luminosity * (-optical_depth).exp();

    if self.sed.is_some() {
      self.accumulate(&self.sed_arrays, layout, ell, packet, luminosity, extincted);
    }
    if let (Some(ifu), Some(pixel)) = (&self.ifu, pixel) {
      let bin = pixel + ell * ifu.pixels_per_frame();
      self.accumulate(&self.ifu_arrays, layout, bin, packet, luminosity, extincted);
    }

    if self.record_statistics {
      let slot = self.slots.current();
      let mut list = slot.lock().unwrap();
      if list.history() != Some(packet.history_index()) {
        let pixels = self.ifu.as_ref().map_or(0, IfuConfig::pixels_per_frame);
        list.fold(self.sed_moments.as_ref(), self.ifu_moments.as_ref(), pixels);
        list.reset(packet.history_index());
      }
      list.record(ell as u32, pixel.map_or(-1, |p| p as i64), extincted);
    }
  }

  /// Demultiplex one contribution into the channel arrays of one family.
  fn accumulate(
    &self,
    arrays: &[Vec<AtomicF64>],
    layout: &ChannelLayout,
    bin: usize,
    packet: &PhotonPacket,
    luminosity: f64,
    extincted: f64,
  ) {
    if layout.total_only {
      arrays[TOTAL][bin].fetch_add(luminosity);
    } else if packet.has_primary_origin() {
      if packet.num_scatterings() == 0 {
        arrays[TRANSPARENT][bin].fetch_add(luminosity);
        arrays[PRIMARY_DIRECT][bin].fetch_add(extincted);
      } else {
        arrays[PRIMARY_SCATTERED][bin].fetch_add(extincted);
        if let Some((first, count)) = layout.levels {
          let order = packet.num_scatterings() as usize;
          if order <= count {
            arrays[first + order - 1][bin].fetch_add(extincted);
          }
        }
      }
    } else if packet.num_scatterings() == 0 {
      arrays[SECONDARY_DIRECT][bin].fetch_add(extincted);
    } else {
      arrays[SECONDARY_SCATTERED][bin].fetch_add(extincted);
    }

    if let Some(stokes_first) = layout.stokes {
      let stokes = packet.stokes();
      arrays[stokes_first][bin].fetch_add(extincted * stokes.q);
      arrays[stokes_first + 1][bin].fetch_add(extincted * stokes.u);
      arrays[stokes_first + 2][bin].fetch_add(extincted * stokes.v);
    }
  }

  // ---------------------------------------------------------------------
  // Aggregation
  // ---------------------------------------------------------------------

  /// Fold every thread's pending history into the moment arrays.
  ///
  /// Must run after the photon loop completes and before calibration.
  /// Idempotent: a second flush with no interleaved detections is a no-op.
  pub fn flush(&self) {
    if !self.record_statistics {
      return;
    }
    let pixels = self.ifu.as_ref().map_or(0, IfuConfig::pixels_per_frame);
    for slot in self.slots.all() {
      let mut list = slot.lock().unwrap();
      list.fold(self.sed_moments.as_ref(), self.ifu_moments.as_ref(), pixels);
    }
  }

  /// Snapshot of SED moment order `k` (0 = `sum w` .. 3 = `sum w^4`).
  pub fn sed_moments(&self, k: usize) -> Option<Vec<f64>> {
    self.sed_moments.as_ref().map(|m| m.snapshot(k))
  }

  /// Snapshot of IFU moment order `k`.
  pub fn ifu_moments(&self, k: usize) -> Option<Vec<f64>> {
    self.ifu_moments.as_ref().map(|m| m.snapshot(k))
  }

  /// Raw (uncalibrated) snapshot of one SED channel; test and diagnostic
  /// accessor.
  pub fn sed_channel(&self, channel: usize) -> Vec<f64> {
    atomics::snapshot(&self.sed_arrays[channel])
  }

  /// Raw (uncalibrated) snapshot of one IFU channel.
  pub fn ifu_channel(&self, channel: usize) -> Vec<f64> {
    atomics::snapshot(&self.ifu_arrays[channel])
  }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
