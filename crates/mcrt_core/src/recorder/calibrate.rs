//! Calibration and output of the recorded detector arrays.
//!
//! Runs once at simulation end: detector arrays are summed across
//! cooperating processes, the root rank converts accumulated luminosities
//! into fluxes and surface brightness, synthesizes the total from the
//! components, and hands the results to the output sink.

use std::f64::consts::PI;

use tracing::info;

use super::{
  ChannelLayout, FluxRecorder, IfuConfig, COMPONENT_COUNT, PRIMARY_DIRECT, PRIMARY_SCATTERED,
  SECONDARY_DIRECT, SECONDARY_SCATTERED, TOTAL,
};
use crate::error::{Error, Result};
use crate::output::{CubeMeta, OutputSink};
use crate::process::ProcessGroup;
use crate::units::FluxUnits;

/// Component column labels, in output order.
const COMPONENT_LABELS: [&str; COMPONENT_COUNT] = [
  "transparent",
  "primary direct",
  "primary scattered",
  "secondary direct",
  "secondary scattered",
];

/// Cube name suffixes for the component channels.
const COMPONENT_SUFFIXES: [&str; COMPONENT_COUNT] = [
  "transparent",
  "primarydirect",
  "primaryscattered",
  "secondarydirect",
  "secondaryscattered",
];

const STOKES_SUFFIXES: [&str; 3] = ["stokesQ", "stokesU", "stokesV"];

impl FluxRecorder {
  /// Reduce, calibrate and write all recorded output.
  ///
  /// Every rank participates in the reduction; only the root rank calibrates
  /// and writes. The in-memory accumulators are left untouched, so no
  /// partial output can leak out of a failed calibration.
  pub fn calibrate_and_write(
    &self,
    process: &dyn ProcessGroup,
    units: &dyn FluxUnits,
    sink: &mut dyn OutputSink,
  ) -> Result<()> {
    let layout = self
      .layout
      .as_ref()
      .ok_or_else(|| Error::InvalidConfiguration("recorder not finalized".into()))?;

    let mut sed: Vec<Vec<f64>> = if self.sed.is_some() {
      (0..layout.count).map(|c| self.sed_channel(c)).collect()
    } else {
      Vec::new()
    };
    let mut ifu: Vec<Vec<f64>> = if self.ifu.is_some() {
      (0..layout.count).map(|c| self.ifu_channel(c)).collect()
    } else {
      Vec::new()
    };
    for array in sed.iter_mut().chain(ifu.iter_mut()) {
      process.sum_to_root(array);
    }
    if !process.is_root() {
      return Ok(());
    }

    if let Some(config) = &self.sed {
      let c_flux = 1.0 / (4.0 * PI * config.distance * config.distance);
      for column in &mut sed {
        for (ell, value) in column.iter_mut().enumerate() {
          *value *= c_flux * units.flux_factor(self.wavelengths.wavelength(ell));
        }
      }
      self.write_sed(layout, units, &sed, sink)?;
    }

    if let Some(config) = &self.ifu {
      let c_flux = 1.0 / (4.0 * PI * config.distance * config.distance);
      let solid_angle = 4.0
        * (0.5 * config.pixel_size_x / config.distance).atan()
        * (0.5 * config.pixel_size_y / config.distance).atan();
      let c_sb = c_flux / solid_angle;
      let pixels = config.pixels_per_frame();
      for cube in &mut ifu {
        for (ell, frame) in cube.chunks_mut(pixels).enumerate() {
          let factor = c_sb * units.surface_brightness_factor(self.wavelengths.wavelength(ell));
          for value in frame {
            *value *= factor;
          }
        }
      }
      self.write_ifu(config, layout, units, &ifu, sink)?;
    }

    info!(instrument = %self.instrument, "instrument output written");
    Ok(())
  }

  /// Assemble and write the multi-column SED table.
  fn write_sed(
    &self,
    layout: &ChannelLayout,
    units: &dyn FluxUnits,
    sed: &[Vec<f64>],
    sink: &mut dyn OutputSink,
  ) -> Result<()> {
    let flux_unit = units.flux_unit();
    let mut headers = vec![format!("wavelength ({})", units.wavelength_unit())];
    let mut columns = vec![
      (0..self.wavelengths.len())
        .map(|ell| self.wavelengths.wavelength(ell) * units.wavelength_factor(self.wavelengths.wavelength(ell)))
        .collect::<Vec<f64>>(),
    ];

    headers.push(format!("total flux ({flux_unit})"));
    columns.push(self.synthesize_total(layout, sed));

    if !layout.total_only {
      for (component, label) in COMPONENT_LABELS.iter().enumerate() {
        headers.push(format!("{label} flux ({flux_unit})"));
        columns.push(sed[component].clone());
      }
    }
    if let Some(stokes_first) = layout.stokes {
      for (offset, name) in ["Q", "U", "V"].iter().enumerate() {
        headers.push(format!("Stokes {name} ({flux_unit})"));
        columns.push(sed[stokes_first + offset].clone());
      }
    }
    if let Some((first, count)) = layout.levels {
      for level in 0..count {
        headers.push(format!(
          "{}-times scattered primary flux ({flux_unit})",
          level + 1
        ));
        columns.push(sed[first + level].clone());
      }
    }

    sink.write_sed_table(&format!("{}_sed", self.instrument), &headers, &columns)
  }

  /// Write one cube per non-empty channel.
  fn write_ifu(
    &self,
    config: &IfuConfig,
    layout: &ChannelLayout,
    units: &dyn FluxUnits,
    ifu: &[Vec<f64>],
    sink: &mut dyn OutputSink,
  ) -> Result<()> {
    let meta = CubeMeta {
      nx: config.nx,
      ny: config.ny,
      nz: self.wavelengths.len(),
      pixel_size_x: config.pixel_size_x,
      pixel_size_y: config.pixel_size_y,
      center_x: config.center_x,
      center_y: config.center_y,
      unit: units.surface_brightness_unit().to_owned(),
    };

    let mut write = |suffix: &str, data: &[f64]| -> Result<()> {
      if data.iter().any(|&v| v != 0.0) {
        sink.write_cube(&format!("{}_{}", self.instrument, suffix), &meta, data)?;
      }
      Ok(())
    };

    write("total", &self.synthesize_total(layout, ifu))?;
    if !layout.total_only {
      for (component, suffix) in COMPONENT_SUFFIXES.iter().enumerate() {
        write(suffix, &ifu[component])?;
      }
    }
    if let Some(stokes_first) = layout.stokes {
      for (offset, suffix) in STOKES_SUFFIXES.iter().enumerate() {
        write(suffix, &ifu[stokes_first + offset])?;
      }
    }
    if let Some((first, count)) = layout.levels {
      for level in 0..count {
        write(
          &format!("primaryscatteredlevel{}", level + 1),
          &ifu[first + level],
        )?;
      }
    }
    Ok(())
  }

  /// Total channel: recorded directly in total-only mode, otherwise the sum
  /// of the extincted components (secondary terms only when the medium
  /// emits).
  fn synthesize_total(&self, layout: &ChannelLayout, arrays: &[Vec<f64>]) -> Vec<f64> {
    if layout.total_only {
      return arrays[TOTAL].clone();
    }
    let mut total = arrays[PRIMARY_DIRECT].clone();
    for (index, value) in total.iter_mut().enumerate() {
      *value += arrays[PRIMARY_SCATTERED][index];
      if self.has_medium_emission {
        *value += arrays[SECONDARY_DIRECT][index] + arrays[SECONDARY_SCATTERED][index];
      }
    }
    total
  }
}

#[cfg(test)]
#[path = "calibrate_test.rs"]
mod calibrate_test;
