//! mcrt_core - Monte Carlo radiative transfer core
//!
//! This crate carries the three load-bearing subsystems of a Monte Carlo
//! radiative transfer simulation:
//!
//! - **Unstructured grid traversal**: a Voronoi tessellation of a bounded
//!   box with block/tree point location and a ray-segment walk across
//!   neighboring cells
//! - **Parallel execution**: a persistent worker pool distributing index
//!   ranges across threads with lock-free chunk dispensing and first-error
//!   capture
//! - **Flux recording**: a deferred-aggregation detector demultiplexing
//!   photon contributions into SED columns, IFU cubes, Stokes maps and
//!   per-history statistics under concurrent writes
//!
//! Emission policy, instrument projection, wavelength grids, unit systems
//! and the cross-process reduction are consumed through narrow interfaces;
//! the crate ships a minimal concrete instance of each so a simulation can
//! be assembled end-to-end.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use glam::DVec3;
//! use mcrt_core::{Aabb3, FluxRecorder, MeshGrid, Random, SedConfig, WorkerPool};
//!
//! let grid = MeshGrid::new(bounds, &sites, true)?;
//! let pool = WorkerPool::with_available_parallelism();
//! let mut recorder = FluxRecorder::new("instrument", wavelengths)
//!   .with_medium(true, false)
//!   .with_sed(SedConfig { distance: 3.086e17 });
//! recorder.finalize_configuration()?;
//!
//! pool.call(
//!   |first, count| {
//!     for history in first..first + count {
//!       let mut packet = emit(history as u64);
//!       for segment in grid.walk(position, packet.direction()) {
//!         // accumulate optical depth, sample interactions...
//!       }
//!       recorder.detect(&packet, pixel, optical_depth);
//!     }
//!     Ok(())
//!   },
//!   num_packets,
//! )?;
//!
//! recorder.flush();
//! recorder.calibrate_and_write(&process, &units, &mut sink)?;
//! ```

pub mod error;
pub use error::{Error, Result};

// Unstructured spatial grid
pub mod grid;
pub use grid::{Aabb3, MeshGrid, Neighbor, Segment, Wall};

// Persistent worker pool
pub mod parallel;
pub use parallel::WorkerPool;

// Flux recording
pub mod recorder;
pub use recorder::{FluxRecorder, IfuConfig, SedConfig};

// Photon packets
pub mod packet;
pub use packet::{PhotonPacket, StokesVector};

// Medium components
pub mod materials;
pub use materials::{ElectronMix, MaterialMix, MediumState};

// Consumed interfaces with shipped defaults
pub mod output;
pub mod process;
pub mod random;
pub mod units;
pub mod wavelengths;
pub use random::Random;
