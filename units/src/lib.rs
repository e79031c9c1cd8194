//! Physical quantities used by the staging pipeline, built on `uom`.
//!
//! Lengths in the parameter file and the orbit description are in
//! centimetres, angles are specified in degrees and stored in radians.

pub mod todo;

pub use uom::si::f32::{Angle, Length};

mod unit {
  pub use uom::si::{length::{millimeter, centimeter},
                    angle ::{radian, degree},
  };
}

// Making values from float literals is long-winded in `uom`, so provide some
// pithily-named convenience constructors.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f32) -> $quantity { $quantity::new::<unit::$unit>(x) }
  };
}

wrap!(cm     Length centimeter);
wrap!(mm     Length millimeter);
wrap!(radian Angle      radian);
wrap!(degree Angle      degree);

// Reverse direction of the above.
pub fn cm_    (x: Length) -> f32 { x.get::<unit::centimeter>() }
pub fn radian_(x: Angle ) -> f32 { x.get::<unit::radian>() }
pub fn degree_(x: Angle ) -> f32 { x.get::<unit::degree>() }

/// Parse a length such as `"4.42 mm"`; bare numbers are taken to be in cm.
pub fn parse_length(s: &str) -> Result<Length, String> {
  let s = s.trim();
  if let Ok(x) = s.parse::<f32>() { return Ok(cm(x)) }
  s.parse::<Length>().map_err(|e| format!("cannot parse `{s}` as a length: {e:?}"))
}

#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}
