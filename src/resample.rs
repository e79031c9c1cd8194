//! Area-weighted resampling between two grids along the transaxial axis.
//!
//! Each output pixel receives the sum of the input bins it overlaps, each
//! bin weighted by the fraction of it which lies under the pixel. All
//! positions are in input-bin units:
//!
//! ```text
//!   input   |  0  |  1  |  2  |  3  |  4  |
//!   output        |    0    |    1    |
//!              left    left+w    left+2w
//! ```
//!
//! Slices are resampled independently: slice `s` of the input occupies
//! `input[s*from.n .. (s+1)*from.n]`, and likewise for the output.

use crate::views::ViewGeometry;
use crate::Lengthf32;

/// Number and width of the bins along one axis
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinGrid {
    pub n: usize,
    pub width: Lengthf32,
}

impl BinGrid {
    pub fn new(n: usize, width: Lengthf32) -> Self { Self { n, width } }
}

/// Resample `n_slices` rows from `from` onto `to`, with the first output
/// pixel starting at `left` (in input-bin units). `output` is overwritten.
///
/// # Panics
///
/// If either width is not positive, or if `input` or `output` is shorter
/// than `n_slices` rows of its grid.
pub fn resample(
    input   : &[f32],
    from    : BinGrid,
    to      : BinGrid,
    n_slices: usize,
    left    : f32,
    output  : &mut [f32],
) {
    assert!(from.width > 0.0 && to.width > 0.0, "bin widths must be positive: {from:?} {to:?}");
    assert!(input .len() >= from.n * n_slices, "input holds fewer than {n_slices} slices of {} bins", from.n);
    assert!(output.len() >= to  .n * n_slices, "output holds fewer than {n_slices} slices of {} pixels", to.n);

    let output = &mut output[..to.n * n_slices];
    output.fill(0.0);

    // Output pixel width in input-bin units
    let w = f64::from(to.width / from.width);
    let n_bins = from.n as i64;
    for pixel in 0..to.n {
        let lo = f64::from(left) +  pixel      as f64 * w;
        let hi = f64::from(left) + (pixel + 1) as f64 * w;
        let (bin_lo, bin_hi) = (lo.floor() as i64, hi.floor() as i64);

        // Pixel lies entirely outside the measured bins
        if (bin_lo < 0 && bin_hi < 0) || (bin_lo >= n_bins && bin_hi >= n_bins) { continue }

        for slice in 0..n_slices {
            let row = &input[slice * from.n .. (slice + 1) * from.n];
            output[slice * to.n + pixel] += overlap_sum(row, lo, hi, bin_lo, bin_hi);
        }
    }
}

/// Sum of the bins of `row` under `[lo, hi)`, weighted by their overlap
#[inline]
fn overlap_sum(row: &[f32], lo: f64, hi: f64, bin_lo: i64, bin_hi: i64) -> f32 {
    let value = |bin: i64| if (0..row.len() as i64).contains(&bin) { row[bin as usize] } else { 0.0 };
    if bin_lo == bin_hi {
        return (hi - lo) as f32 * value(bin_lo);
    }
    let mut sum = 0.0;
    for bin in bin_lo..=bin_hi {
        let b = bin as f64;
        let weight =
            if      b       < lo { b + 1.0 - lo }
            else if b + 1.0 > hi { hi - b       }
            else                 { 1.0          };
        sum += weight as f32 * value(bin);
    }
    sum
}

/// Convert one view of measured projections from the measured bin grid onto
/// the rotated-pixel grid of the reconstruction.
pub fn measured_to_modified(
    measured: &[f32],
    bins    : BinGrid,
    pixels  : BinGrid,
    n_slices: usize,
    view    : &ViewGeometry,
    modified: &mut [f32],
) {
    log::trace!("measured -> modified: {} bins -> {} pixels, left = {}", bins.n, pixels.n, view.left);
    resample(measured, bins, pixels, n_slices, view.left, modified);
}

/// Convert one view of generated projections from the rotated-pixel grid
/// back onto the user's bin grid, normalized by the number of views.
///
/// Returns the sum of the converted view.
pub fn modified_to_user(
    modified: &[f32],
    pixels  : BinGrid,
    bins    : BinGrid,
    n_slices: usize,
    n_views : usize,
    view    : &ViewGeometry,
    user    : &mut [f32],
) -> f32 {
    let bin_width_in_pixels = bins.width / pixels.width;
    resample(modified, pixels, bins, n_slices, -view.left * bin_width_in_pixels, user);
    let factor = bin_width_in_pixels / n_views as f32;
    let user = &mut user[..bins.n * n_slices];
    let mut sum = 0.0;
    for sample in user.iter_mut() {
        *sample *= factor;
        sum += *sample;
    }
    log::trace!("modified -> user: sum = {sum}");
    sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use units::{cm, degree};
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn grid(n: usize, width: f32) -> BinGrid { BinGrid::new(n, width) }

    fn view(left: f32) -> ViewGeometry {
        ViewGeometry { angle: degree(0.0), cor_to_collimator: cm(20.0), left, right: 0.0 }
    }

    fn resampled(input: &[f32], from: BinGrid, to: BinGrid, n_slices: usize, left: f32) -> Vec<f32> {
        let mut output = vec![f32::NAN; to.n * n_slices];
        resample(input, from, to, n_slices, left, &mut output);
        output
    }

    #[test]
    fn ten_bins_onto_four_double_width_pixels() {
        let input: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let output = resampled(&input, grid(10, 1.0), grid(4, 2.0), 1, 1.0);
        // Pixel 0 covers [1, 3): bins 1 and 2; pixel 3 covers [7, 9): bins 7 and 8
        assert_eq!(output, vec![3.0, 7.0, 11.0, 15.0]);
    }

    #[rstest(/**/ left, expected,
             case( 0.0, vec![1.0, 5.0, 9.0]),
             case( 0.5, vec![2.0, 6.0, 7.0]),
             case(-1.0, vec![0.0, 3.0, 7.0]),
             case( 4.0, vec![9.0, 0.0, 0.0]),
    )]
    fn partial_overlaps_are_area_weighted(left: f32, expected: Vec<f32>) {
        let input = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let output = resampled(&input, grid(6, 1.0), grid(3, 2.0), 1, left);
        for (o, e) in output.iter().zip(&expected) {
            assert_float_eq!(*o, *e, abs <= 1e-5);
        }
    }

    #[test]
    fn narrow_pixels_take_a_share_of_one_bin() {
        // Four half-width pixels inside two bins
        let output = resampled(&[2.0, 6.0], grid(2, 1.0), grid(4, 0.5), 1, 0.0);
        assert_eq!(output, vec![1.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn pixels_outside_the_bins_are_zero() {
        let input = [1.0, 1.0, 1.0];
        assert_eq!(resampled(&input, grid(3, 1.0), grid(3, 1.0), 1,  10.0), vec![0.0; 3]);
        assert_eq!(resampled(&input, grid(3, 1.0), grid(3, 1.0), 1, -10.0), vec![0.0; 3]);
    }

    #[test]
    fn slices_are_resampled_independently() {
        let input = [1.0, 2.0, 3.0,   10.0, 20.0, 30.0];
        let output = resampled(&input, grid(3, 1.0), grid(3, 1.0), 2, 1.0);
        assert_eq!(output, vec![2.0, 3.0, 0.0,   20.0, 30.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "output holds fewer")]
    fn short_output_buffer_panics() {
        let mut output = vec![0.0; 5];
        resample(&[1.0; 6], grid(3, 1.0), grid(3, 1.0), 2, 0.0, &mut output);
    }

    #[test]
    #[should_panic(expected = "bin widths must be positive")]
    fn zero_width_panics() {
        let mut output = vec![0.0; 3];
        resample(&[1.0; 3], grid(3, 0.0), grid(3, 1.0), 1, 0.0, &mut output);
    }

    #[test]
    fn inverse_scales_by_bin_ratio_over_views() {
        let modified = [4.0, 8.0, 12.0, 16.0];
        let mut user = vec![0.0; 4];
        let sum = modified_to_user(&modified, grid(4, 1.0), grid(4, 1.0), 1, 4, &view(0.0), &mut user);
        assert_eq!(user, vec![1.0, 2.0, 3.0, 4.0]);
        assert_float_eq!(sum, 10.0, abs <= 1e-6);
    }

    #[test]
    fn inverse_undoes_forward_with_view_scaling() {
        let n_views = 6;
        let measured: Vec<f32> = (0..16).map(|i| (i * i) as f32).collect();
        let (bins, pixels) = (grid(8, 0.442), grid(8, 0.442));

        let mut modified = vec![0.0; 16];
        measured_to_modified(&measured, bins, pixels, 2, &view(0.0), &mut modified);
        modified.iter_mut().for_each(|x| *x *= n_views as f32);

        let mut user = vec![0.0; 16];
        modified_to_user(&modified, pixels, bins, 2, n_views, &view(0.0), &mut user);
        for (u, m) in user.iter().zip(&measured) {
            assert_float_eq!(*u, *m, rmax <= 1e-5);
        }
    }

    proptest! {
        #[test]
        fn unit_ratio_integer_offset_is_a_shift(
            input in proptest::collection::vec(0.0_f32..100.0, 1..30),
            offset in -35_i32..35,
        ) {
            let n = input.len();
            let output = resampled(&input, grid(n, 0.3), grid(n, 0.3), 1, offset as f32);
            for (p, out) in output.iter().enumerate() {
                let source = p as i32 + offset;
                let expected = if (0..n as i32).contains(&source) { input[source as usize] } else { 0.0 };
                prop_assert_eq!(*out, expected);
            }
        }

        #[test]
        fn covering_grid_conserves_counts(
            input in proptest::collection::vec(0.0_f32..10.0, 1..40),
            w     in 0.3_f64..3.0,
            left  in -3.0_f64..=0.0,
        ) {
            let n = input.len();
            let n_out = ((n as f64 - left) / w).ceil() as usize + 1;
            let output = resampled(&input, grid(n, 1.0), grid(n_out, w as f32), 1, left as f32);
            let total_in : f32 = input.iter().sum();
            let total_out: f32 = output.iter().sum();
            prop_assert!((total_in - total_out).abs() <= 1e-3 * total_in.max(1.0),
                         "in: {total_in}  out: {total_out}");
        }
    }
}
