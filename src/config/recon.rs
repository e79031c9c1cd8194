//! Reconstruction parameters and options derived from the parameter file.

use std::path::{Path, PathBuf};

use units::{Length, cm, cm_};

use crate::acquire::ImageSizes;
use crate::slices::AxisOrder;
use crate::{Error, Result};
use super::parms::Parms;

/// Which executable is being set up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Reconstruct an image from measured projections
    Osem,
    /// Generate projections of an activity image
    Genprj,
}

/// Physical effects included in the projector model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Effects {
    pub attenuation: bool,
    pub drf: bool,
    pub srf: bool,
}

impl Effects {

    /// `a`: attenuation, `d`: detector response, `s`: scatter response.
    /// Case is not significant, anything else is ignored with a warning.
    pub fn parse(model: &str, name: &str) -> Self {
        let mut effects = Self::default();
        for c in model.chars() {
            match c.to_ascii_lowercase() {
                'a' => effects.attenuation = true,
                'd' => effects.drf         = true,
                's' => effects.srf         = true,
                other => log::warn!("illegal character ({other}) found in {name}. Ignoring."),
            }
        }
        effects
    }

    /// `prjmodel` takes precedence over `model`
    pub fn from_parms(parms: &Parms) -> Result<Self> {
        let model    = parms.string("model", "")?;
        let prjmodel = parms.string("prjmodel", &model.value)?;
        let effects = if prjmodel.found { Self::parse(&prjmodel.value, "prjmodel") }
                      else              { Self::parse(&model   .value, "model"   ) };
        log::info!("modeling: {effects:?}");
        Ok(effects)
    }
}

/// Collimator and camera geometry for the geometric detector response
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrfParameters {
    pub hole_length: Length,
    pub hole_diameter: Length,
    /// Back face of collimator to the detection plane
    pub backface_to_detector: Length,
    pub intrinsic_fwhm: Length,
}

impl DrfParameters {
    pub fn none() -> Self {
        Self {
            hole_length         : cm(0.0),
            hole_diameter       : cm(0.0),
            backface_to_detector: cm(0.0),
            intrinsic_fwhm      : cm(0.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReconParameters {

    /// Width of the image pixels, and of the projection bins
    pub pixel_width: Length,

    pub n_pixels: usize,
    pub n_slices: usize,
    pub n_views: usize,
    pub n_ang_per_subset: usize,
    pub n_iterations: usize,

    /// Iterations between saved estimates, before the first entry of
    /// `save_iterations`
    pub save_interval: usize,
    pub save_iterations: String,

    pub n_srf_iterations: usize,

    /// Scatter kernels are collapsed by this factor (1, 2 or 4)
    pub srf_collapse_factor: usize,

    pub atn_scale_factor: f32,
    pub scatter_scale: f32,
    pub drf: DrfParameters,

    /// Where normalization images are cached; `None` keeps them in memory
    pub norm_base: Option<PathBuf>,
}

impl ReconParameters {
    pub fn n_subsets(&self) -> usize { self.n_views / self.n_ang_per_subset }
    pub fn image_dims(&self) -> crate::BoxDim { [self.n_pixels, self.n_pixels, self.n_slices] }
    pub fn projection_dims(&self) -> crate::BoxDim { [self.n_pixels, self.n_slices, self.n_views] }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    pub effects: Effects,
    pub drf_from_file: bool,
    pub use_grf_in_bck: bool,
    pub fft_convolve: bool,

    /// Attenuation-map support threshold, already multiplied by the pixel
    /// width (cm)
    pub atnmap_support_threshold: f32,
    pub use_contour_support: bool,
    pub debug_level: i64,
    pub axial_pad_length: usize,
    pub axial_avg_length: usize,

    /// Reconstruction buffer starts off holding an initial estimate
    pub recon_is_initial_estimate: bool,
    pub fast_rotate: bool,
    pub start_iteration: usize,
    pub order: AxisOrder,
}

/// Derive the reconstruction parameters and options for `mode`, given the
/// sizes found in the primary image.
pub fn read_parameters(
    parms  : &Parms,
    mode   : Mode,
    effects: Effects,
    sizes  : &ImageSizes,
) -> Result<(ReconParameters, Options)> {
    let pixel_width = parms.length("pixwidth", cm(0.0))?.value;
    if cm_(pixel_width) <= 0.0 {
        return Err(Error::illegal("read_parameters", format!(
            "pixwidth must be > 0, not {} cm", cm_(pixel_width))));
    }

    let (n_views, n_iterations, save_interval, save_iterations, n_ang_per_subset, n_srf_iterations) = match mode {
        Mode::Genprj => {
            let n_views = parms.count("nang", 1)?.value;
            (n_views, 0, 0, String::new(), n_views, 0)
        }
        Mode::Osem => {
            let n_views = sizes.n_views.ok_or_else(|| Error::illegal(
                "read_parameters", "number of views unknown"))?;
            let n_iterations     = parms.count ("iterations", 1)?.value;
            let save_interval    = parms.count ("save_int"  , 1)?.value;
            let save_iterations  = parms.string("save_iterations", "")?.value;
            let n_ang_per_subset = parms.count ("num_ang_per_set", n_views)?.value;
            check_subsets(n_views, n_ang_per_subset)?;
            let n_srf_iterations = parms.count ("num_srf_iterations", 2)?.value;
            (n_views, n_iterations, save_interval, save_iterations, n_ang_per_subset, n_srf_iterations)
        }
    };
    if n_views == 0 {
        return Err(Error::illegal("read_parameters", "number of views must be > 0"));
    }

    let srf_collapse_factor = parms.count("srf_collapse_fac", 1)?.value;
    if ![1, 2, 4].contains(&srf_collapse_factor) {
        return Err(Error::illegal("read_parameters", format!(
            "srf_collapse_fac must be 1 (no collapse), 2 or 4, not {srf_collapse_factor}")));
    }

    let atn_scale_factor = parms.double("atnmapfac", 1.0)?.value as f32;
    let drf_from_file    = parms.bool("drf_from_file", false)?.value;
    let use_grf_in_bck   = drf_from_file && mode == Mode::Osem && parms.bool("use_grf_in_bck", false)?.value;

    let drf = if effects.drf && (!drf_from_file || use_grf_in_bck) {
        log::debug!("generating DRF on the fly");
        let required = |key: &str| -> Result<Length> {
            let parm = parms.length(key, cm(1.0))?;
            if !parm.found {
                return Err(Error::illegal("read_parameters", format!(
                    "missing {key}: gap, collthickness, holediam and intrinsicfwhm are all needed with DRF modeling")));
            }
            Ok(parm.value)
        };
        DrfParameters {
            hole_length         : required("collthickness")?,
            hole_diameter       : required("holediam")?,
            backface_to_detector: required("gap")?,
            intrinsic_fwhm      : required("intrinsicfwhm")?,
        }
    } else {
        DrfParameters::none()
    };
    let fft_convolve = effects.drf && parms.bool("fft_convolve", false)?.value;

    let atnmap_support_threshold = parms.double("atnmap_support_thresh", 0.0)?.value as f32 * cm_(pixel_width);
    let use_contour_support = parms.bool ("use_contour_support", false)?.value;
    let debug_level         = parms.int  ("debug_level", 4)?.value;
    let axial_pad_length    = parms.count("axial_pad_length", 0)?.value;
    let axial_avg_length    = parms.count("axial_avg_length", 0)?.value;
    let fast_rotate         = parms.bool ("fastrotate", true)?.value;
    let order = if parms.bool("reorder_pixels", false)?.value { AxisOrder::Reordered }
                else                                          { AxisOrder::Native    };

    let start_iteration = parms.int("start_iter", 0)?.value;
    let start_iteration = usize::try_from(start_iteration).unwrap_or_else(|_| {
        log::warn!("start_iter must be >= 0, not {start_iteration}: setting to 0");
        0
    });

    let params = ReconParameters {
        pixel_width,
        n_pixels: sizes.n_pixels,
        n_slices: sizes.n_slices,
        n_views,
        n_ang_per_subset,
        n_iterations,
        save_interval,
        save_iterations,
        n_srf_iterations,
        srf_collapse_factor,
        atn_scale_factor,
        scatter_scale: 1.0,
        drf,
        norm_base: None,
    };
    let options = Options {
        effects,
        drf_from_file,
        use_grf_in_bck,
        fft_convolve,
        atnmap_support_threshold,
        use_contour_support,
        debug_level,
        axial_pad_length,
        axial_avg_length,
        recon_is_initial_estimate: false,
        fast_rotate,
        start_iteration,
        order,
    };
    log::debug!("{params:?}");
    log::debug!("{options:?}");
    Ok((params, options))
}

/// The views must divide evenly into subsets, and the number of subsets must
/// be even (unless there is only one).
pub fn check_subsets(n_views: usize, n_ang_per_subset: usize) -> Result<()> {
    if n_ang_per_subset == 0 || n_views % n_ang_per_subset != 0 {
        return Err(Error::illegal("read_parameters", format!(
            "no. of angles not an integer multiple of the no. of angles per subset: NumAngles={n_views}, NumAngPerSet={n_ang_per_subset}")));
    }
    let n_subsets = n_views / n_ang_per_subset;
    if n_subsets != 1 && n_subsets % 2 != 0 {
        return Err(Error::illegal("read_parameters", format!(
            "number of subsets ({n_subsets}) for num_ang_per_set={n_ang_per_subset} is not even")));
    }
    Ok(())
}

/// Base name for normalization images, unless they are kept in memory
pub fn norm_base(parms: &Parms, output_base: &Path) -> Result<Option<PathBuf>> {
    let tmpdir = parms.string("tmpdir", "/var/tmp")?.value;
    if parms.bool("norm_in_memory", true)?.value {
        return Ok(None);
    }
    let name = output_base.file_name().map(PathBuf::from).unwrap_or_else(|| output_base.into());
    Ok(Some(Path::new(&tmpdir).join(name)))
}
