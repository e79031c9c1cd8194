/// Units which are simply type aliases for `f32` rather than having an
/// implementation as a `uom` `Quantity`.
///
/// The resampler and the engines work on flat `f32` buffers whose widths are
/// ratios of the bin and pixel widths, so there is nothing to gain from
/// carrying units through their inner loops. The aliases still give some
/// clues in the source as to what the numbers represent.

pub type Lengthf32    = f32;
pub type Intensityf32 = f32; // counts per bin, or activity per pixel
