//! Interface to the iterative reconstruction engine.

use std::path::PathBuf;

use crate::config::recon::{Options, ReconParameters};
use crate::views::ViewGeometry;
use crate::{ImageData, Result};

/// Everything the engine needs besides the projections and the image
#[derive(Clone, Debug)]
pub struct ReconJob {
    pub params: ReconParameters,
    pub options: Options,
    pub views: Vec<ViewGeometry>,

    /// Same layout as the image
    pub attenuation: Option<ImageData>,

    /// Same layout as the projections; scaled by `params.scatter_scale`
    /// before being added to the forward projection
    pub scatter: Option<ImageData>,

    pub srf_kernel_file: Option<PathBuf>,
    pub drf_table_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub msg_file: Option<PathBuf>,
}

/// Called after every iteration with its 1-based number and the current estimate
pub type OnIteration<'a> = dyn FnMut(usize, &[f32]) -> Result<()> + 'a;

/// Projections on the rotated-pixel grid are `pixels x slices x views`;
/// images are `pixels x pixels x slices` in `job.options.order`.
///
/// Failures are reported as `Error::Engine`, carrying the status with which
/// the executables exit.
pub trait Engine {

    /// Reconstruct `image` from `projections`. `image` holds the initial
    /// estimate if `job.options.recon_is_initial_estimate`.
    fn osem(&self, job: &ReconJob, projections: &[f32], image: &mut ImageData, on_iteration: &mut OnIteration) -> Result<()>;

    /// Forward project `activity`, scaled by `primary_fac`, into `projections`
    fn project(&self, job: &ReconJob, activity: &[f32], primary_fac: f32, projections: &mut [f32]) -> Result<()>;
}
