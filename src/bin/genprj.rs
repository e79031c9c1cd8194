use std::path::{Path, PathBuf};
use std::process::ExitCode;

use itertools::izip;
use units::cm_;

use osems::Result;
use osems::config::parms::Parms;
use osems::config::recon::{Mode, ReconParameters};
use osems::engine::Engine;
use osems::error::zeroed;
use osems::io::{ImageStore, raw::RawStore};
use osems::mlem::RotateSum;
use osems::resample::{BinGrid, modified_to_user};
use osems::setup::{Staged, setup};
use osems::utils::{finish, init_logging, parse_args, timing::Stage};

#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "genprj", about = "Generate SPECT projections of an activity image")]
pub struct Cli {
    /// Parameter file
    pub parmfile: PathBuf,

    /// actimage [atnmap] prjimage
    #[clap(required = true)]
    pub images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    match parse_args::<Cli>() {
        Ok(args) => finish(run(&args)),
        Err(code) => code,
    }
}

fn run(args: &Cli) -> Result<()> {
    let parms = Parms::from_file(&args.parmfile)?;
    let log_file = parms.string("log_file", "")?.value;
    let _logger = init_logging(
        parms.int("debug_level", 4)?.value,
        (!log_file.is_empty()).then(|| Path::new(&log_file)),
    )?;

    let stage = Stage::begin("Staging inputs");
    let store = RawStore;
    let Staged { job, mut projections, image, names, primary_fac, .. } = setup(&store, &parms, Mode::Genprj, &args.images)?;
    stage.end();

    let stage = Stage::begin("Projecting");
    RotateSum.project(&job, &image, primary_fac, &mut projections)?;
    stage.end();

    // Back onto the bins of the camera, one view at a time
    let ReconParameters { n_pixels, n_slices, n_views, pixel_width, .. } = job.params;
    let grid = BinGrid::new(n_pixels, cm_(pixel_width));
    let view_len = n_pixels * n_slices;
    let mut user = zeroed(view_len * n_views, "generated projections")?;
    let mut total = 0.0;
    for (modified, user, view) in izip!(projections.chunks_exact(view_len), user.chunks_exact_mut(view_len), &job.views) {
        total += modified_to_user(modified, grid, grid, n_slices, n_views, view, user);
    }
    log::info!("sum of generated projections: {total:.2}");

    let stage = Stage::begin(format!("Writing {}", names.output.display()));
    store.write(&names.output, [n_pixels, n_slices, n_views], &user)?;
    stage.end();
    Ok(())
}
