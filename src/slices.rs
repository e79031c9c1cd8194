//! Extraction of a contiguous window of slices from an image volume.

use ndarray::{Array3, ArrayView3};

use crate::error::zeroed;
use crate::io::ImageSource;
use crate::{Error, ImageData, Result};

/// Memory layout of an `n x n x n_slices` image inside the reconstruction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AxisOrder {
    /// Slice-major: `x + n * (y + n * slice)`, as stored on disk
    #[default]
    Native,
    /// Slice axis between columns and rows: `x + n * (slice + n_slices * y)`
    Reordered,
}

impl AxisOrder {

    /// Position of pixel `[x, y]` of `slice` in the flat buffer
    pub fn index(self, [x, y, slice]: [usize; 3], n_pixels: usize, n_slices: usize) -> usize {
        match self {
            Self::Native    => x + n_pixels * (y     + n_pixels * slice),
            Self::Reordered => x + n_pixels * (slice + n_slices * y    ),
        }
    }

    /// Rearrange a slice-major buffer into this order
    pub fn from_native(self, data: ImageData, n_pixels: usize, n_slices: usize) -> Result<ImageData> {
        match self {
            Self::Native    => Ok(data),
            Self::Reordered => swap_outer_axes(data, [n_slices, n_pixels, n_pixels]),
        }
    }

    /// Rearrange a buffer in this order into slice-major order
    pub fn to_native(self, data: ImageData, n_pixels: usize, n_slices: usize) -> Result<ImageData> {
        match self {
            Self::Native    => Ok(data),
            Self::Reordered => swap_outer_axes(data, [n_pixels, n_slices, n_pixels]),
        }
    }
}

/// `shape` is outermost first; the innermost axis keeps its place
fn swap_outer_axes(data: ImageData, [outer, middle, inner]: [usize; 3]) -> Result<ImageData> {
    let volume = ArrayView3::from_shape((outer, middle, inner), &data)?;
    let swapped: Array3<f32> = volume.permuted_axes([1, 0, 2]).as_standard_layout().into_owned();
    Ok(swapped.into_raw_vec())
}

/// Read slices `start_slice ..= start_slice + n_slices - 1` of a square
/// `n_pixels x n_pixels` image, in `order`.
pub fn extract_slices(
    source     : &mut impl ImageSource,
    start_slice: i64,
    n_slices   : usize,
    n_pixels   : usize,
    order      : AxisOrder,
) -> Result<ImageData> {
    let [nx, ny, nz] = source.dims();
    if nx != ny || nx != n_pixels {
        return Err(Error::ShapeMismatch { width: nx, height: ny, expected: n_pixels });
    }
    let last = start_slice + n_slices as i64 - 1;
    if start_slice < 0 || last >= nz as i64 {
        return Err(Error::OutOfRange { first: start_slice, last, available: nz });
    }
    if n_slices == 0 { return Ok(Vec::new()) }

    log::debug!("extracting slices {start_slice}..={last} of {nz} ({order:?})");
    let mut data = zeroed(n_pixels * n_pixels * n_slices, "slice window")?;
    source.read_slices(start_slice as usize, last as usize, &mut data)?;
    order.from_native(data, n_pixels, n_slices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use rstest::rstest;
    use crate::io::{ImageStore, memory::MemoryStore};
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    /// Volume whose samples encode their own `[x, y, z]` position as `xyz` digits
    fn numbered(dims @ [nx, ny, nz]: [usize; 3]) -> MemoryStore {
        let data = (0..nz).flat_map(|z| (0..ny).flat_map(move |y| (0..nx).map(move |x| {
            (100 * x + 10 * y + z) as f32
        }))).collect();
        let store = MemoryStore::new();
        store.insert("img.im", dims, data);
        store
    }

    fn extract(store: &MemoryStore, start: i64, n: usize, n_pixels: usize, order: AxisOrder) -> Result<ImageData> {
        let mut source = store.open(Path::new("img.im"))?;
        extract_slices(&mut source, start, n, n_pixels, order)
    }

    #[rstest(/**/ start, n, ok,
             case(0,  4, true ),
             case(2,  2, true ),   // last slice is the last one available
             case(3,  1, true ),
             case(3,  2, false),   // one past the end
             case(0,  5, false),
             case(-1, 1, false),
    )]
    fn window_must_lie_within_image(start: i64, n: usize, ok: bool) {
        let store = numbered([3, 3, 4]);
        let result = extract(&store, start, n, 3, AxisOrder::Native);
        if ok { assert_eq!(result.unwrap().len(), 9 * n) }
        else  { assert!(matches!(result, Err(Error::OutOfRange { .. }))) }
    }

    #[test]
    fn out_of_range_reports_window() {
        let store = numbered([2, 2, 3]);
        match extract(&store, 2, 3, 2, AxisOrder::Native) {
            Err(Error::OutOfRange { first, last, available }) => assert_eq!((first, last, available), (2, 4, 3)),
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[rstest(/**/ dims,
             case([3, 4, 2]),  // not square
             case([4, 4, 2]),  // square, but wrong size
    )]
    fn transaxial_shape_is_checked(dims: [usize; 3]) {
        let store = numbered(dims);
        assert!(matches!(extract(&store, 0, 1, 3, AxisOrder::Native), Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn native_window_starts_at_requested_slice() -> Result<()> {
        let store = numbered([2, 2, 5]);
        let data = extract(&store, 3, 2, 2, AxisOrder::Native)?;
        assert_eq!(data, vec![3.0, 103.0, 13.0, 113.0,   4.0, 104.0, 14.0, 114.0]);
        Ok(())
    }

    #[test]
    fn reordered_window_puts_slices_between_columns_and_rows() -> Result<()> {
        let (n, n_slices) = (3, 2);
        let store = numbered([n, n, 4]);
        let data = extract(&store, 1, n_slices, n, AxisOrder::Reordered)?;
        for y in 0..n {
            for s in 0..n_slices {
                for x in 0..n {
                    let expected = (100 * x + 10 * y + s + 1) as f32;
                    assert_eq!(data[AxisOrder::Reordered.index([x, y, s], n, n_slices)], expected);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn reordering_can_be_undone() -> Result<()> {
        let (n, n_slices) = (4, 3);
        let native: ImageData = (0..n * n * n_slices).map(|i| i as f32).collect();
        let reordered = AxisOrder::Reordered.from_native(native.clone(), n, n_slices)?;
        assert_ne!(reordered, native);
        assert_eq!(AxisOrder::Reordered.to_native(reordered, n, n_slices)?, native);
        Ok(())
    }
}
