//! Volumetric image store.
//!
//! A volume of shape `[nx, ny, nz]` is a flat buffer of `f32` in which `x`
//! varies fastest: sample `[x, y, z]` lives at `x + nx * (y + ny * z)`. A
//! "slice" is one `nx * ny` plane at fixed `z`.
//!
//! + Projection data: bins x slices x angles
//!
//! + Images: pixels x pixels x slices

pub mod raw;
pub mod memory;

use std::path::Path;

use crate::{BoxDim, Error, Result};

/// An open, readable image. Closed when dropped.
pub trait ImageSource {

    /// Extents `[nx, ny, nz]`
    fn dims(&self) -> BoxDim;

    /// Copy planes `first..=last` (along `z`) into the start of `out`
    fn read_slices(&mut self, first: usize, last: usize, out: &mut [f32]) -> Result<()>;

    fn slice_len(&self) -> usize {
        let [nx, ny, _] = self.dims();
        nx * ny
    }
}

pub trait ImageStore {
    type Source: ImageSource;

    fn open(&self, path: &Path) -> Result<Self::Source>;

    fn write(&self, path: &Path, dims: BoxDim, data: &[f32]) -> Result<()>;
}

/// Number of samples in a volume of extents `dims`
pub fn volume_len(dims: BoxDim) -> Result<usize> {
    let [nx, ny, nz] = dims;
    nx.checked_mul(ny)
        .and_then(|n| n.checked_mul(nz))
        .ok_or_else(|| Error::illegal("volume_len", format!("image dimensions {dims:?} are too large")))
}

/// Number of samples in planes `first..=last`, if they exist and fit in `out_len`
pub(crate) fn checked_read_len(dims: BoxDim, first: usize, last: usize, out_len: usize) -> Result<usize> {
    let [nx, ny, nz] = dims;
    if first > last || last >= nz {
        return Err(Error::illegal("read_slices", format!(
            "cannot read slices {first}..={last} from image with {nz} slices")));
    }
    let len = volume_len([nx, ny, last - first + 1])?;
    if out_len < len {
        return Err(Error::illegal("read_slices", format!(
            "buffer of {out_len} samples too small for {len}")));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn volume_len_overflow_is_an_error() {
        assert_eq!(volume_len([2, 3, 4]).unwrap(), 24);
        assert!(matches!(volume_len([usize::MAX, 2, 1]), Err(Error::IllegalValue { .. })));
        assert!(matches!(checked_read_len([usize::MAX, usize::MAX, 3], 0, 2, 10), Err(Error::IllegalValue { .. })));
    }
}
