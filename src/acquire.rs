//! Reading the input images and staging them for reconstruction.
//!
//! Projection-like inputs (measured projections, scatter estimate) are
//! `bins x rows x views`: the requested rows of each view are resampled onto
//! the rotated-pixel grid and scaled by the number of views, so that the
//! reconstruction is in units of total acquisition time rather than time per
//! view. Image-like inputs (attenuation map, initial estimate, activity) are
//! `pixels x pixels x slices`: the requested slices are extracted, in the
//! configured axis order.

use std::path::Path;

use rayon::prelude::*;
use units::cm_;

use crate::config::{StagingConfig, recon::{Mode, ReconParameters}};
use crate::error::zeroed;
use crate::io::{ImageSource, ImageStore};
use crate::resample::{BinGrid, measured_to_modified};
use crate::slices::extract_slices;
use crate::views::ViewGeometry;
use crate::{Error, ImageData, Result};

/// Extents of the problem, as found in the primary input image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSizes {
    pub n_pixels: usize,
    pub first_slice: i64,
    pub n_slices: usize,
    /// Known from the projections when reconstructing; from the parameter
    /// file when generating projections
    pub n_views: Option<usize>,
}

/// Sizes of the reconstruction, from the projections (`Osem`) or the activity
/// image (`Genprj`) in `path`.
pub fn image_sizes(store: &impl ImageStore, path: &Path, mode: Mode, config: &StagingConfig) -> Result<ImageSizes> {
    log::info!("GetImageSizes");
    let sizes = || -> Result<ImageSizes> {
        let [nx, ny, nz] = store.open(path)?.dims();
        log::debug!("input image=({nx} x {ny} x {nz})");
        if nx == 0 {
            return Err(Error::illegal("image_sizes", format!(
                "number of pixels must be > 0: image is ({nx} x {ny} x {nz})")));
        }
        let default_end = match mode {
            Mode::Osem   => ny as i64 - 1,
            Mode::Genprj => nz as i64 - 1,
        };
        let end = config.slice_end.unwrap_or(default_end);
        let start = config.slice_start;
        let n_slices = end - start + 1;
        if n_slices <= 0 {
            return Err(Error::illegal("image_sizes", format!(
                "number of slices must be > 0: start={start}, end={end}, num={n_slices}")));
        }
        if mode == Mode::Genprj && nx != ny {
            return Err(Error::ShapeMismatch { width: nx, height: ny, expected: nx });
        }
        let sizes = ImageSizes {
            n_pixels: nx,
            first_slice: start,
            n_slices: n_slices as usize,
            n_views: (mode == Mode::Osem).then_some(nz),
        };
        log::debug!("{sizes:?}");
        Ok(sizes)
    };
    sizes().map_err(|e| e.in_file("image sizes of", path))
}

/// Stages the inputs of one run; every input is read through `store`, which
/// also receives the optional debug images.
pub struct Acquisition<'a, S: ImageStore> {
    pub store : &'a S,
    pub config: &'a StagingConfig,
    pub params: &'a ReconParameters,
}

impl<'a, S: ImageStore> Acquisition<'a, S> {

    pub fn new(store: &'a S, config: &'a StagingConfig, params: &'a ReconParameters) -> Self {
        Self { store, config, params }
    }

    /// Measured projections on the rotated-pixel grid, scaled by the number of views
    pub fn projections(&self, path: &Path, views: &[ViewGeometry]) -> Result<ImageData> {
        log::info!("GetPrjImage: {}", path.display());
        self.projection_like(path, self.config.slice_start, views, self.params.n_views as f32)
            .map_err(|e| e.in_file("projections", path))
    }

    /// Attenuation map, in the configured axis order
    pub fn attenuation_map(&self, path: &Path) -> Result<ImageData> {
        log::info!("GetAtnMap: {}", path.display());
        let atn = self.volume(path, self.config.atn_slice_start, "attenuation map")
            .map_err(|e| e.in_file("attenuation map", path))?;
        log::info!("sum atn={:.2}", atn.iter().sum::<f32>());
        if self.config.debug_images {
            self.write_native(Path::new("atnimage.im"), &atn)?;
        }
        Ok(atn)
    }

    /// Initial estimate, with negative values replaced by the image mean
    pub fn initial_estimate(&self, path: &Path) -> Result<ImageData> {
        log::info!("GetInitialEstimate: {}", path.display());
        let mut estimate = self.volume(path, self.config.initest_slice_start, "initial estimate")
            .map_err(|e| e.in_file("initial estimate", path))?;
        let replacement = clean_negatives(&mut estimate);
        log::debug!("negative initial estimate values replaced by {replacement}");
        if self.config.save_initial_estimate {
            self.write_native(Path::new("initest.im"), &estimate)?;
        }
        Ok(estimate)
    }

    /// Activity image from which projections are to be generated
    pub fn activity_image(&self, path: &Path) -> Result<ImageData> {
        log::info!("GetActImage: {}", path.display());
        let act = self.volume(path, self.config.slice_start, "activity image")
            .map_err(|e| e.in_file("activity image", path))?;
        log::info!("sum act={:.2}", act.iter().sum::<f32>());
        Ok(act)
    }

    /// The additive scatter estimate and its scale factor, if one was given
    pub fn scatter_estimate(&self, views: &[ViewGeometry]) -> Result<(Option<ImageData>, f32)> {
        log::info!("GetScatterEstimate");
        let Some(path) = &self.config.scatter_file else {
            log::debug!("no scatter estimate file will be used");
            return Ok((None, 1.0));
        };
        let scatter = self.projection_like(path, self.config.scatter_slice_start, views, self.params.n_views as f32)
            .map_err(|e| e.in_file("scatter estimate", path))?;
        Ok((Some(scatter), self.config.scatter_scale))
    }

    fn volume(&self, path: &Path, start: i64, what: &'static str) -> Result<ImageData> {
        if start < 0 {
            return Err(Error::illegal("Acquisition", format!("start slice for {what} must be >= 0, not {start}")));
        }
        let mut source = self.store.open(path)?;
        extract_slices(&mut source, start, self.params.n_slices, self.params.n_pixels, self.config.order)
    }

    /// Rows `start..` of each view resampled onto the pixel grid and multiplied
    /// by `scale`, unless `scale` is 0 or 1
    fn projection_like(&self, path: &Path, start: i64, views: &[ViewGeometry], scale: f32) -> Result<ImageData> {
        let &ReconParameters { n_pixels, n_slices, n_views, pixel_width, .. } = self.params;
        if views.len() != n_views {
            return Err(Error::illegal("Acquisition", format!(
                "{} view geometries for {n_views} views", views.len())));
        }

        let mut source = self.store.open(path)?;
        let [n_bins, n_rows, n_angles] = source.dims();
        if n_bins != n_pixels || n_angles != n_views {
            return Err(Error::illegal("Acquisition", format!(
                "number of bins ({n_bins}) or number of angles ({n_angles}) not correct ({n_pixels}/{n_views})")));
        }
        let last = start + n_slices as i64 - 1;
        if start < 0 || last >= n_rows as i64 {
            return Err(Error::OutOfRange { first: start, last, available: n_rows });
        }
        log::debug!("bins={n_bins}, rows={n_rows}, angles={n_angles}, start={start}, slices={n_slices}");

        // Keep only the requested rows of each view, one view at a time
        let view_len = n_bins * n_slices;
        let mut slab = zeroed(n_bins * n_rows, "projection view")?;
        let mut rows = zeroed(view_len * n_views, "projection rows")?;
        let offset = start as usize * n_bins;
        for (angle, dest) in rows.chunks_exact_mut(view_len).enumerate() {
            source.read_slices(angle, angle, &mut slab)?;
            dest.copy_from_slice(&slab[offset .. offset + view_len]);
        }
        drop(source);

        let grid = BinGrid::new(n_pixels, cm_(pixel_width));
        let mut modified = zeroed(view_len * n_views, "modified projections")?;
        modified.par_chunks_exact_mut(view_len)
            .zip(rows.par_chunks_exact(view_len))
            .zip(views.par_iter())
            .for_each(|((modified, measured), view)| {
                measured_to_modified(measured, grid, grid, n_slices, view, modified)
            });

        if scale != 0.0 && scale != 1.0 {
            modified.par_iter_mut().for_each(|x| *x *= scale);
        }
        log::trace!("prjsum={:.2}, modprjsum={:.2}", rows.iter().sum::<f32>(), modified.iter().sum::<f32>());
        Ok(modified)
    }

    fn write_native(&self, path: &Path, data: &[f32]) -> Result<()> {
        let ReconParameters { n_pixels, n_slices, .. } = *self.params;
        let native = self.config.order.to_native(data.to_vec(), n_pixels, n_slices)?;
        log::info!("writing {}", path.display());
        self.store.write(path, [n_pixels, n_pixels, n_slices], &native)
    }
}

/// Replace negative samples with the mean of the whole image (1 if the mean
/// is not positive). Returns the replacement value.
pub fn clean_negatives(data: &mut [f32]) -> f32 {
    let mean = if data.is_empty() { 0.0 }
               else { (data.iter().map(|&x| f64::from(x)).sum::<f64>() / data.len() as f64) as f32 };
    let replacement = if mean <= 0.0 { 1.0 } else { mean };
    for x in data.iter_mut().filter(|x| **x < 0.0) {
        *x = replacement;
    }
    replacement
}
