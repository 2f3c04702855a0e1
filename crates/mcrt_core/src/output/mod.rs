//! Output sinks for calibrated instrument data.
//!
//! The recorder talks to a sink capability rather than to concrete file
//! formats: a file-backed sink for production output and an in-memory sink
//! for tests. FITS encoding is left to external writers implementing
//! [`OutputSink`].

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Geometry and unit metadata attached to an IFU cube.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeMeta {
  pub nx: usize,
  pub ny: usize,
  pub nz: usize,
  pub pixel_size_x: f64,
  pub pixel_size_y: f64,
  pub center_x: f64,
  pub center_y: f64,
  pub unit: String,
}

/// Destination for calibrated instrument output.
pub trait OutputSink {
  /// Write a multi-column text table; one header line per column, rows in
  /// column order.
  fn write_sed_table(&mut self, name: &str, headers: &[String], columns: &[Vec<f64>])
    -> Result<()>;

  /// Write a 3-D image cube laid out as `pixel + frame * (nx * ny)`.
  fn write_cube(&mut self, name: &str, meta: &CubeMeta, data: &[f64]) -> Result<()>;
}

// =============================================================================
// File-backed sink
// =============================================================================

/// Sink writing plain-text tables and flat binary cubes into a directory.
pub struct FileOutputSink {
  directory: PathBuf,
}

impl FileOutputSink {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
    }
  }
}

impl OutputSink for FileOutputSink {
  fn write_sed_table(
    &mut self,
    name: &str,
    headers: &[String],
    columns: &[Vec<f64>],
  ) -> Result<()> {
    let path = self.directory.join(format!("{name}.dat"));
    let mut out = BufWriter::new(File::create(path)?);
    for (index, header) in headers.iter().enumerate() {
      writeln!(out, "# column {}: {}", index + 1, header)?;
    }
    let rows = columns.first().map_or(0, Vec::len);
    for row in 0..rows {
      for (index, column) in columns.iter().enumerate() {
        if index > 0 {
          write!(out, " ")?;
        }
        write!(out, "{:.7e}", column[row])?;
      }
      writeln!(out)?;
    }
    out.flush()?;
    Ok(())
  }

  fn write_cube(&mut self, name: &str, meta: &CubeMeta, data: &[f64]) -> Result<()> {
    // Self-describing header line followed by little-endian f64 planes.
    let path = self.directory.join(format!("{name}.cube"));
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(
      out,
      "# {} {} {} pixel {} {} center {} {} unit {}",
      meta.nx,
      meta.ny,
      meta.nz,
      meta.pixel_size_x,
      meta.pixel_size_y,
      meta.center_x,
      meta.center_y,
      meta.unit
    )?;
    for value in data {
      out.write_all(&value.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
  }
}

/// Read back a table written by [`FileOutputSink::write_sed_table`].
pub fn read_sed_table(path: &Path) -> Result<Vec<Vec<f64>>> {
  let reader = BufReader::new(File::open(path)?);
  let mut columns: Vec<Vec<f64>> = Vec::new();
  for line in reader.lines() {
    let line = line?;
    if line.starts_with('#') || line.trim().is_empty() {
      continue;
    }
    let values: Vec<f64> = line
      .split_whitespace()
      .map(|token| token.parse::<f64>().unwrap_or(f64::NAN))
      .collect();
    if columns.is_empty() {
      columns = vec![Vec::new(); values.len()];
    }
    for (column, value) in columns.iter_mut().zip(values) {
      column.push(value);
    }
  }
  Ok(columns)
}

// =============================================================================
// In-memory sink
// =============================================================================

/// Recorded SED table.
pub struct SedTable {
  pub name: String,
  pub headers: Vec<String>,
  pub columns: Vec<Vec<f64>>,
}

/// Recorded IFU cube.
pub struct Cube {
  pub name: String,
  pub meta: CubeMeta,
  pub data: Vec<f64>,
}

/// Sink keeping everything in memory; used by tests and embedders.
#[derive(Default)]
pub struct MemoryOutputSink {
  pub tables: Vec<SedTable>,
  pub cubes: Vec<Cube>,
}

impl OutputSink for MemoryOutputSink {
  fn write_sed_table(
    &mut self,
    name: &str,
    headers: &[String],
    columns: &[Vec<f64>],
  ) -> Result<()> {
    self.tables.push(SedTable {
      name: name.to_owned(),
      headers: headers.to_vec(),
      columns: columns.to_vec(),
    });
    Ok(())
  }

  fn write_cube(&mut self, name: &str, meta: &CubeMeta, data: &[f64]) -> Result<()> {
    self.cubes.push(Cube {
      name: name.to_owned(),
      meta: meta.clone(),
      data: data.to_vec(),
    });
    Ok(())
  }
}
