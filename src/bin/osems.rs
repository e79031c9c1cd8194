use std::path::{Path, PathBuf};
use std::process::ExitCode;

use indicatif::{ProgressBar, ProgressStyle};

use osems::Result;
use osems::config::parms::Parms;
use osems::config::recon::Mode;
use osems::engine::Engine;
use osems::io::{ImageStore, raw::RawStore};
use osems::mlem::RotateSum;
use osems::setup::{Staged, setup};
use osems::utils::{finish, init_logging, parse_args, timing::Stage};

#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "osems", about = "OSEM reconstruction of SPECT projections")]
pub struct Cli {
    /// Parameter file
    pub parmfile: PathBuf,

    /// prjimage [atnmap] [initest] recon
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
    let Staged { job, projections, mut image, output_base, save, .. } = setup(&store, &parms, Mode::Osem, &args.images)?;
    stage.end();

    let n_iterations = job.params.n_iterations;
    let (n_pixels, n_slices) = (job.params.n_pixels, job.params.n_slices);
    let dims = job.params.image_dims();
    let order = job.options.order;
    let write_native = |path: &Path, data: &[f32]| -> Result<()> {
        let native = order.to_native(data.to_vec(), n_pixels, n_slices)?;
        store.write(path, dims, &native)
    };

    let stage = Stage::begin("Reconstructing");
    let bar = ProgressBar::new(n_iterations.saturating_sub(job.options.start_iteration) as u64);
    bar.set_style(ProgressStyle::default_bar()
                  .template("Iteration {msg} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta_precise})")
                  .unwrap_or_else(|_| ProgressStyle::default_bar()));
    let mut on_iteration = |iteration: usize, estimate: &[f32]| -> Result<()> {
        bar.set_message(iteration.to_string());
        bar.inc(1);
        // The last iteration goes to the final image
        if iteration < n_iterations && save.as_ref().map_or(false, |s| s.should_save(iteration)) {
            let path = PathBuf::from(format!("{}.{iteration}.im", output_base.display()));
            log::info!("saving iteration {iteration} to {}", path.display());
            write_native(&path, estimate)?;
        }
        Ok(())
    };
    RotateSum.osem(&job, &projections, &mut image, &mut on_iteration)?;
    bar.finish_and_clear();
    stage.end();

    let path = PathBuf::from(format!("{}.im", output_base.display()));
    let stage = Stage::begin(format!("Writing {}", path.display()));
    write_native(&path, &image)?;
    stage.end();
    Ok(())
}
