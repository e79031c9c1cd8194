use std::path::Path;
use std::process::ExitCode;

use flexi_logger::{Duplicate, FileSpec, Logger, LoggerHandle};
use log::LevelFilter;

use crate::{Error, Result};

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}

/// Log level corresponding to the `debug_level` parameter
pub fn level_for(debug_level: i64) -> LevelFilter {
    match debug_level {
        i64::MIN..=3 => LevelFilter::Warn,
        4 | 5        => LevelFilter::Info,
        6 | 7        => LevelFilter::Debug,
        _            => LevelFilter::Trace,
    }
}

/// Log to stderr at the level implied by `debug_level`, unless `RUST_LOG` is
/// set. With a `log_file`, everything is also written there.
///
/// Logging stops when the returned handle is dropped.
pub fn init_logging(debug_level: i64, log_file: Option<&Path>) -> Result<LoggerHandle> {
    let failed = |e: flexi_logger::FlexiLoggerError| Error::illegal("init_logging", e.to_string());
    let logger = Logger::try_with_env_or_str(level_for(debug_level).as_str().to_lowercase())
        .map_err(failed)?;
    let logger = match log_file {
        None => logger,
        Some(path) => logger
            .log_to_file(FileSpec::try_from(path).map_err(failed)?.suppress_timestamp())
            .duplicate_to_stderr(Duplicate::All),
    };
    logger.start().map_err(failed)
}

/// Parse the command line of an executable. On failure, the message has been
/// printed and the exit code is returned: 0 for `--help` and `--version`, 1
/// for anything else.
pub fn parse_args<C: clap::Parser>() -> std::result::Result<C, ExitCode> {
    C::try_parse().map_err(|e| {
        let _ = e.print();
        if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS }
    })
}

/// Report the outcome of a run, and the status with which to exit
pub fn finish(result: Result<()>) -> ExitCode {
    let Err(e) = result else { return ExitCode::SUCCESS };
    // Display already includes the underlying causes
    log::error!("{e}");
    eprintln!("Error: {e}");
    ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
}

pub mod timing {

    use std::time::Instant;
    use super::group_digits;

    /// One step of a run, whose wall-clock time is logged when it ends
    pub struct Stage {
        name: String,
        began: Instant,
    }

    impl Stage {

        pub fn begin(name: impl Into<String>) -> Self {
            let name = name.into();
            log::info!("{name} ...");
            Self { name, began: Instant::now() }
        }

        /// Milliseconds since the stage began
        pub fn elapsed(&self) -> String {
            format!("{} ms", group_digits(self.began.elapsed().as_millis()))
        }

        pub fn end(self) {
            log::info!("{}: {}", self.name, self.elapsed());
        }
    }
}
