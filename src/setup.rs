//! Everything that happens between reading the command line and handing the
//! job to the engine.

use std::path::{Path, PathBuf};

use units::cm_;

use crate::acquire::{Acquisition, image_sizes};
use crate::config::StagingConfig;
use crate::config::parms::Parms;
use crate::config::recon::{Effects, Mode, norm_base, read_parameters};
use crate::engine::ReconJob;
use crate::error::zeroed;
use crate::io::ImageStore;
use crate::saveiter::SaveSchedule;
use crate::views::{Orbit, ViewGeometry, angles_from_parms};
use crate::{Error, ImageData, Result};

/// The images named on the command line, by role
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageNames {
    /// Projections (`Osem`) or activity image (`Genprj`)
    pub primary: PathBuf,
    pub attenuation: Option<PathBuf>,
    pub initial_estimate: Option<PathBuf>,
    /// Reconstruction (`Osem`) or generated projections (`Genprj`)
    pub output: PathBuf,
}

pub fn usage(mode: Mode) -> &'static str {
    match mode {
        Mode::Osem   => "osems parmfile prjimage [atnmap] [initest] recon",
        Mode::Genprj => "genprj parmfile actimage [atnmap] prjimage",
    }
}

/// Assign roles to the image names which follow the parameter file.
///
/// The attenuation map is taken when attenuation or scatter is modeled, in
/// which case it is mandatory. When reconstructing, a remaining name before
/// the output is the initial estimate; an empty one means there is none.
pub fn assign_image_names(names: &[PathBuf], mode: Mode, effects: Effects) -> Result<ImageNames> {
    let max = match mode { Mode::Osem => 4, Mode::Genprj => 3 };
    let wrong = |problem: &str| Error::Usage(format!("{problem}\nusage: {}", usage(mode)));
    let (primary, output, mut middle) = match names {
        [primary, middle @ .., output] if names.len() <= max => (primary, output, middle),
        [_, _, ..] => return Err(wrong("too many images")),
        _          => return Err(wrong("too few images")),
    };

    let attenuation = if effects.attenuation || effects.srf {
        let (atn, rest) = middle.split_first()
            .ok_or_else(|| wrong("an attenuation map is needed when modeling attenuation or scatter"))?;
        middle = rest;
        Some(atn.clone())
    } else {
        None
    };

    let initial_estimate = match (mode, middle) {
        (Mode::Osem, [initest, rest @ ..]) => {
            middle = rest;
            Some(initest).filter(|p| !p.as_os_str().is_empty()).cloned()
        }
        _ => None,
    };
    if !middle.is_empty() {
        return Err(wrong("too many images"));
    }

    let names = ImageNames { primary: primary.clone(), attenuation, initial_estimate, output: output.clone() };
    log::debug!("{names:?}");
    Ok(names)
}

/// Output file name without its `.im` extension
pub fn output_base(output: &Path) -> PathBuf {
    let name = output.to_string_lossy();
    PathBuf::from(name.strip_suffix(".im").unwrap_or(&*name))
}

/// Staged inputs, ready for the engine
#[derive(Debug)]
pub struct Staged {
    pub job: ReconJob,
    /// Measured (`Osem`) or to be generated (`Genprj`), on the rotated-pixel grid
    pub projections: ImageData,
    /// Reconstruction buffer (`Osem`) or activity image (`Genprj`)
    pub image: ImageData,
    pub names: ImageNames,
    pub output_base: PathBuf,
    /// Scale of the primary (unscattered) projections, when generating them
    pub primary_fac: f32,
    /// When reconstructing: which iterations are written out
    pub save: Option<SaveSchedule>,
}

/// Read the parameters and every input image needed by `mode`.
pub fn setup(store: &impl ImageStore, parms: &Parms, mode: Mode, names: &[PathBuf]) -> Result<Staged> {
    let effects = Effects::from_parms(parms)?;
    let names = assign_image_names(names, mode, effects)?;
    let config = StagingConfig::from_parms(parms)?;
    let sizes = image_sizes(store, &names.primary, mode, &config)?;
    let (mut params, mut options) = read_parameters(parms, mode, effects, &sizes)?;
    let output_base = output_base(&names.output);

    let save = match mode {
        Mode::Osem   => Some(SaveSchedule::new(params.save_interval, params.n_iterations, options.start_iteration, &params.save_iterations)?),
        Mode::Genprj => None,
    };

    let attenuation = match &names.attenuation {
        Some(path) if effects.attenuation || effects.srf =>
            Some(Acquisition::new(store, &config, &params).attenuation_map(path)?),
        _ => None,
    };

    let (angle_start, angle_range) = angles_from_parms(parms)?;
    let orbit = Orbit::from_parms(parms)?;
    let views = ViewGeometry::table(params.n_views, params.n_pixels, angle_start, angle_range, &orbit)?;

    let [nx, ny, nz] = params.image_dims();
    let (projections, image) = match mode {
        Mode::Osem => {
            params.norm_base = norm_base(parms, &output_base)?;
            let acquisition = Acquisition::new(store, &config, &params);
            let projections = acquisition.projections(&names.primary, &views)?;
            let image = match &names.initial_estimate {
                Some(path) => {
                    options.recon_is_initial_estimate = true;
                    acquisition.initial_estimate(path)?
                }
                None => zeroed(nx * ny * nz, "reconstructed image")?,
            };
            (projections, image)
        }
        Mode::Genprj => {
            let bin_width = parms.length("binwidth", params.pixel_width)?.value;
            let (bin_width, pixel_width) = (cm_(bin_width), cm_(params.pixel_width));
            if (bin_width - pixel_width).abs() > 1e-5 * pixel_width {
                return Err(Error::Usage(format!(
                    "binwidth ({bin_width} cm) must equal pixwidth ({pixel_width} cm)")));
            }
            let [nb, ns, nv] = params.projection_dims();
            let projections = zeroed(nb * ns * nv, "projections")?;
            let image = Acquisition::new(store, &config, &params).activity_image(&names.primary)?;
            (projections, image)
        }
    };

    let srf_kernel_file = if effects.srf {
        let file = optional_file(parms, "srf_krnl_file")?;
        if file.is_none() {
            return Err(Error::illegal("setup", "srf_krnl_file is needed when modeling scatter"));
        }
        file
    } else {
        None
    };
    let drf_table_file = if effects.drf { optional_file(parms, "drf_tab_file")? } else { None };

    let (scatter, scatter_scale) = Acquisition::new(store, &config, &params).scatter_estimate(&views)?;
    params.scatter_scale = scatter_scale;

    let msg_file = optional_file(parms, "msg_file")?;
    let log_file = optional_file(parms, "log_file")?;

    let primary_fac = match mode {
        Mode::Genprj => parms.double("primaryfac", 1.0)?.value as f32,
        Mode::Osem   => 1.0,
    };

    for key in parms.unused() {
        log::warn!("parameter `{key}` in {} was not used", parms.path().display());
    }

    let job = ReconJob {
        params, options, views,
        attenuation, scatter,
        srf_kernel_file, drf_table_file, log_file, msg_file,
    };
    Ok(Staged { job, projections, image, names, output_base, primary_fac, save })
}

/// A file name parameter; absent and empty are the same
fn optional_file(parms: &Parms, key: &str) -> Result<Option<PathBuf>> {
    let name = parms.string(key, "")?.value;
    Ok((!name.is_empty()).then(|| PathBuf::from(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use crate::io::memory::MemoryStore;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn paths(names: &[&str]) -> Vec<PathBuf> { names.iter().map(PathBuf::from).collect() }

    fn named(primary: &str, attenuation: Option<&str>, initial_estimate: Option<&str>, output: &str) -> ImageNames {
        ImageNames {
            primary: primary.into(),
            attenuation: attenuation.map(PathBuf::from),
            initial_estimate: initial_estimate.map(PathBuf::from),
            output: output.into(),
        }
    }

    const NONE: Effects = Effects { attenuation: false, drf: false, srf: false };
    const ATN : Effects = Effects { attenuation: true , drf: false, srf: false };
    const SRF : Effects = Effects { attenuation: false, drf: true , srf: true  };

    #[rstest(/**/ mode, effects, given, expected,
             case(Mode::Osem  , NONE, &["p", "r"]          , named("p", None     , None     , "r")),
             case(Mode::Osem  , NONE, &["p", "i", "r"]     , named("p", None     , Some("i"), "r")),
             case(Mode::Osem  , NONE, &["p", "", "r"]      , named("p", None     , None     , "r")),
             case(Mode::Osem  , ATN , &["p", "a", "r"]     , named("p", Some("a"), None     , "r")),
             case(Mode::Osem  , SRF , &["p", "a", "i", "r"], named("p", Some("a"), Some("i"), "r")),
             case(Mode::Genprj, NONE, &["act", "prj"]      , named("act", None   , None     , "prj")),
             case(Mode::Genprj, ATN , &["act", "a", "prj"] , named("act", Some("a"), None   , "prj")),
    )]
    fn image_roles(mode: Mode, effects: Effects, given: &[&str], expected: ImageNames) {
        assert_eq!(assign_image_names(&paths(given), mode, effects).unwrap(), expected);
    }

    #[rstest(/**/ mode, effects, given,
             case(Mode::Osem  , NONE, &["r"]),
             case(Mode::Osem  , NONE, &["p", "a", "i", "r"]),
             case(Mode::Osem  , ATN , &["p", "r"]),
             case(Mode::Osem  , ATN , &["p", "a", "i", "r", "x"]),
             case(Mode::Genprj, NONE, &["act", "a", "prj"]),
             case(Mode::Genprj, SRF , &["act", "prj"]),
    )]
    fn wrong_image_counts_are_usage_errors(mode: Mode, effects: Effects, given: &[&str]) {
        assert!(matches!(assign_image_names(&paths(given), mode, effects), Err(Error::Usage(_))));
    }

    #[rstest(/**/ output, expected,
             case("recon.im"      , "recon"),
             case("out/recon.im"  , "out/recon"),
             case("recon"         , "recon"),
             case("recon.im.bak"  , "recon.im.bak"),
    )]
    fn im_extension_is_stripped(output: &str, expected: &str) {
        assert_eq!(output_base(Path::new(output)), PathBuf::from(expected));
    }

    fn osem_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert("prj.im", [4, 3, 2], vec![1.0; 24]);
        store
    }

    #[test]
    fn osem_inputs_are_staged() -> Result<()> {
        let store = osem_store();
        let parms = Parms::parse("pixwidth = 0.5\niterations = 3\nsave_int = 0\nslice_start = 1\n", "osem.par")?;
        let staged = setup(&store, &parms, Mode::Osem, &paths(&["prj.im", "recon.im"]))?;

        assert_eq!(staged.job.params.n_slices, 2);
        assert_eq!(staged.job.params.n_views, 2);
        assert_eq!(staged.job.views.len(), 2);
        assert_eq!(staged.projections, vec![2.0; 4 * 2 * 2]);
        assert_eq!(staged.image, vec![0.0; 4 * 4 * 2]);
        assert!(!staged.job.options.recon_is_initial_estimate);
        assert!(staged.job.attenuation.is_none());
        assert!(staged.job.scatter.is_none());
        assert_eq!(staged.output_base, PathBuf::from("recon"));
        assert_eq!(staged.save.map(|s| s.saved().collect::<Vec<_>>()), Some(vec![3]));
        Ok(())
    }

    #[test]
    fn resumed_run_saves_from_the_start_iteration() -> Result<()> {
        let store = osem_store();
        let parms = Parms::parse("pixwidth = 0.5\niterations = 10\nsave_int = 2\nstart_iter = 3\n", "osem.par")?;
        let staged = setup(&store, &parms, Mode::Osem, &paths(&["prj.im", "recon.im"]))?;
        assert_eq!(staged.save.map(|s| s.saved().collect::<Vec<_>>()), Some(vec![5, 7, 9, 10]));
        Ok(())
    }

    #[test]
    fn initial_estimate_marks_the_reconstruction_buffer() -> Result<()> {
        let store = osem_store();
        store.insert("init.im", [4, 4, 3], vec![2.0; 48]);
        let parms = Parms::parse("pixwidth = 0.5\n", "osem.par")?;
        let staged = setup(&store, &parms, Mode::Osem, &paths(&["prj.im", "init.im", "recon.im"]))?;
        assert!(staged.job.options.recon_is_initial_estimate);
        assert_eq!(staged.image, vec![2.0; 48]);
        Ok(())
    }

    #[test]
    fn attenuation_and_scatter_estimate_are_staged() -> Result<()> {
        let store = osem_store();
        store.insert("atn.im", [4, 4, 3], vec![0.15; 48]);
        store.insert("scat.im", [4, 3, 2], vec![0.5; 24]);
        let parms = Parms::parse(r#"
            pixwidth      = 0.5
            model         = "a"
            scat_est_file = "scat.im"
            scat_est_fac  = 0.5
            log_file      = ""
            msg_file      = "osem.msg"
        "#, "osem.par")?;
        let staged = setup(&store, &parms, Mode::Osem, &paths(&["prj.im", "atn.im", "recon.im"]))?;
        assert_eq!(staged.job.attenuation, Some(vec![0.15; 48]));
        assert_eq!(staged.job.scatter, Some(vec![1.0; 24]));
        assert_eq!(staged.job.params.scatter_scale, 0.5);
        assert_eq!(staged.job.log_file, None);
        assert_eq!(staged.job.msg_file, Some("osem.msg".into()));
        Ok(())
    }

    #[test]
    fn scatter_modeling_needs_a_kernel_file() {
        let store = osem_store();
        store.insert("atn.im", [4, 4, 3], vec![0.0; 48]);
        let parms = Parms::parse("pixwidth = 0.5\nmodel = \"s\"\n", "osem.par").unwrap();
        let result = setup(&store, &parms, Mode::Osem, &paths(&["prj.im", "atn.im", "recon.im"]));
        assert!(matches!(result, Err(Error::IllegalValue { .. })));
    }

    #[test]
    fn projections_are_generated_from_the_activity_image() -> Result<()> {
        let store = MemoryStore::new();
        store.insert("act.im", [3, 3, 2], vec![1.0; 18]);
        let parms = Parms::parse("pixwidth = 0.5\nbinwidth = \"5 mm\"\nnang = 4\nprimaryfac = 2.0\n", "genprj.par")?;
        let staged = setup(&store, &parms, Mode::Genprj, &paths(&["act.im", "prj.im"]))?;
        assert_eq!(staged.projections, vec![0.0; 3 * 2 * 4]);
        assert_eq!(staged.image, vec![1.0; 18]);
        assert_eq!(staged.primary_fac, 2.0);
        assert!(staged.save.is_none());
        Ok(())
    }

    #[test]
    fn bin_width_must_match_pixel_width() {
        let store = MemoryStore::new();
        store.insert("act.im", [3, 3, 2], vec![1.0; 18]);
        let parms = Parms::parse("pixwidth = 0.5\nbinwidth = 0.6\n", "genprj.par").unwrap();
        let result = setup(&store, &parms, Mode::Genprj, &paths(&["act.im", "prj.im"]));
        assert!(matches!(result, Err(Error::Usage(_))));
    }
}
