//! Acquisition geometry of each projection view.

use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use units::{Angle, Length, cm, cm_, degree, degree_, radian};

use crate::config::parms::Parms;
use crate::{Error, Result};

/// Geometry of one view, in acquisition order
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewGeometry {

    /// Rotation angle of the detector
    pub angle: Angle,

    /// Distance from the centre of rotation to the face of the collimator
    pub cor_to_collimator: Length,

    /// Position of the first rotated-grid pixel, in measured-bin units
    pub left: f32,

    /// Position of the last rotated-grid pixel, in measured-bin units
    pub right: f32,
}

/// Trajectory of the detector during acquisition
#[derive(Clone, Debug, PartialEq)]
pub enum Orbit {
    /// Same centre-of-rotation distance for every view
    Circular(Length),
    /// One centre-of-rotation distance per view, one per line in the file
    NonCircular(PathBuf),
}

impl Orbit {

    /// `Noncircular_orbit`, `Cor2Col`, `orbit_file`
    pub fn from_parms(parms: &Parms) -> Result<Self> {
        if parms.bool("noncircular_orbit", false)?.value {
            let file = parms.string("orbit_file", "")?;
            if !file.found || file.value.is_empty() {
                return Err(Error::illegal("Orbit", "non-circular orbit requested but no orbit_file given"));
            }
            Ok(Self::NonCircular(file.value.into()))
        } else {
            Ok(Self::Circular(parms.length("cor2col", cm(0.0))?.value))
        }
    }
}

impl ViewGeometry {

    /// Geometry of `n_views` views evenly spread over `angle_range`, starting
    /// at `angle_start`.
    ///
    /// With the assumptions that the pixel and bin widths are the same, that
    /// the number of pixels and bins are the same, and that all transaxial
    /// bins were measured, every view covers bins `0 ..= n_pixels - 1`.
    pub fn table(
        n_views    : usize,
        n_pixels   : usize,
        angle_start: Angle,
        angle_range: Angle,
        orbit      : &Orbit,
    ) -> Result<Vec<Self>> {
        if n_views == 0 {
            return Err(Error::illegal("ViewGeometry::table", "need at least one view"));
        }
        let distances = match orbit {
            Orbit::Circular(cfcr) => {
                if cm_(*cfcr) < 0.0 {
                    return Err(Error::illegal("ViewGeometry::table", format!(
                        "Cor2Col must be >= 0.0, not {} cm", cm_(*cfcr))));
                }
                log::debug!("Circular orbit: ror={:.1} cm", cm_(*cfcr));
                vec![*cfcr; n_views]
            }
            Orbit::NonCircular(path) => {
                log::debug!("Non-circular orbit from {}", path.display());
                let file = File::open(path).map_err(Error::io(path))?;
                read_orbit(BufReader::new(file), n_views, path)?
            }
        };

        let start = f64::from(degree_(angle_start));
        let step  = f64::from(degree_(angle_range)) / n_views as f64;
        let right = n_pixels.saturating_sub(1) as f32;
        let views: Vec<_> = distances.into_iter().enumerate()
            .map(|(i, cor_to_collimator)| ViewGeometry {
                angle: radian(((start + step * i as f64) * PI / 180.0) as f32),
                cor_to_collimator,
                left: 0.0,
                right,
            })
            .collect();
        for (i, v) in views.iter().enumerate() {
            log::trace!("view {i:4}: angle={:7.2} deg  cfcr={:6.2} cm", degree_(v.angle), cm_(v.cor_to_collimator));
        }
        Ok(views)
    }
}

/// Read one centre-of-rotation distance (cm) per view, skipping blank lines
/// and `#` comments. Anything after the first number on a line is ignored.
pub fn read_orbit(reader: impl BufRead, n_views: usize, origin: &Path) -> Result<Vec<Length>> {
    let reading = |source| Error::Io { path: origin.into(), source };
    let mut lines = reader.lines();
    let mut distances = Vec::with_capacity(n_views);
    for view in 0..n_views {
        let line = loop {
            match lines.next() {
                None => return Err(reading(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("orbit file ends before angle {view} of {n_views}")))),
                Some(line) => {
                    let line = line.map_err(reading)?;
                    let trimmed = line.trim();
                    if !trimmed.is_empty() && !trimmed.starts_with('#') { break line }
                }
            }
        };
        let value = line.split_whitespace().next()
            .and_then(|token| token.parse::<f32>().ok())
            .ok_or_else(|| reading(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("cannot read a number for angle {view} from `{}`", line.trim()))))?;
        distances.push(cm(value));
    }
    Ok(distances)
}

/// `angle_start` (default 0 degrees), `angle_range` (default 360 degrees)
pub fn angles_from_parms(parms: &Parms) -> Result<(Angle, Angle)> {
    let start = parms.double("angle_start",   0.0)?.value as f32;
    let range = parms.double("angle_range", 360.0)?.value as f32;
    Ok((degree(start), degree(range)))
}
