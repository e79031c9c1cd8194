//! Parameter file and the settings derived from it.

pub mod parms;
pub mod recon;

use std::path::PathBuf;

use crate::slices::AxisOrder;
use crate::Result;
use parms::Parms;

/// Where, in each input image, the slices to be staged begin, and what to
/// do with them once they have been read.
#[derive(Clone, Debug, PartialEq)]
pub struct StagingConfig {

    /// First slice (projection row, or image plane) of the primary image
    pub slice_start: i64,

    /// Last slice of the primary image; defaults to the last one available
    pub slice_end: Option<i64>,

    pub atn_slice_start: i64,
    pub initest_slice_start: i64,

    /// Defaults to `slice_start`
    pub scatter_slice_start: i64,

    /// Additive scatter estimate, in the same layout as the projections
    pub scatter_file: Option<PathBuf>,
    pub scatter_scale: f32,

    /// Write the cleaned initial estimate to `initest.im`
    pub save_initial_estimate: bool,

    /// Write the staged attenuation map to `atnimage.im`
    pub debug_images: bool,

    pub order: AxisOrder,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            slice_start          : 0,
            slice_end            : None,
            atn_slice_start      : 0,
            initest_slice_start  : 0,
            scatter_slice_start  : 0,
            scatter_file         : None,
            scatter_scale        : 1.0,
            save_initial_estimate: false,
            debug_images         : false,
            order                : AxisOrder::Native,
        }
    }
}

impl StagingConfig {

    pub fn from_parms(parms: &Parms) -> Result<Self> {
        let slice_start = parms.int("slice_start", 0)?.value;
        let slice_end   = parms.int("slice_end"  , 0)?;
        let scatter_file = parms.string("scat_est_file", "")?;
        let scatter_file = scatter_file.found.then(|| PathBuf::from(scatter_file.value));
        let scatter_scale = if scatter_file.is_some() { parms.double("scat_est_fac", 1.0)?.value as f32 }
                            else                      { 1.0 };
        let order = if parms.bool("reorder_pixels", false)?.value { AxisOrder::Reordered }
                    else                                          { AxisOrder::Native    };
        Ok(Self {
            slice_start,
            slice_end: slice_end.found.then_some(slice_end.value),
            atn_slice_start      : parms.int ("atn_slice_start"      , 0)?.value,
            initest_slice_start  : parms.int ("initest_slice_start"  , 0)?.value,
            scatter_slice_start  : parms.int ("scat_startslice", slice_start)?.value,
            scatter_file,
            scatter_scale,
            save_initial_estimate: parms.bool("save_initial_estimate", false)?.value,
            debug_images         : parms.bool("debug_images"         , false)?.value,
            order,
        })
    }
}
