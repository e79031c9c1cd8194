//! Staging of SPECT projection data for OSEM reconstruction.
//!
//! Raw projections, attenuation maps, scatter estimates and initial
//! estimates are read from an [`io::ImageStore`], windowed, resampled onto
//! the rotated-pixel grid of the reconstruction and handed to an
//! [`engine::Engine`].

pub mod error;
pub mod io;
pub mod config;
pub mod resample;
pub mod views;
pub mod slices;
pub mod acquire;
pub mod saveiter;
pub mod setup;
pub mod engine;
pub mod mlem;
pub mod utils;

pub use error::{Error, Result};
pub use units::todo::{Lengthf32, Intensityf32};

/// Extents `[nx, ny, nz]` of a volume
pub type BoxDim = [usize; 3];

/// Flat sample buffer of a volume; its shape travels separately
pub type ImageData = Vec<Intensityf32>;
