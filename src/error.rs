//! Everything that can stop a staging run.
//!
//! Every failure in the pipeline is fatal: there is no local recovery, the
//! error travels up to the executable, which reports it and exits.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {

    /// A parameter or geometry value fails a validity check
    #[error("{context}: {message}")]
    IllegalValue { context: &'static str, message: String },

    /// Requested slice window does not fit in the source image
    #[error("slices {first}..={last} requested, but the image has only {available} slices")]
    OutOfRange { first: i64, last: i64, available: usize },

    /// Transaxial extent of an image is not square, or not the expected size
    #[error("image is {width} x {height} pixels, expected {expected} x {expected}")]
    ShapeMismatch { width: usize, height: usize, expected: usize },

    /// Some other error, attributed to the image file in which it occurred
    #[error("{context} `{}`: {source}", path.display())]
    InFile { context: &'static str, path: PathBuf, #[source] source: Box<Error> },

    #[error("cannot access `{}`: {source}", path.display())]
    Io { path: PathBuf, #[source] source: std::io::Error },

    #[error("`{}` is not a valid image file: {source}", path.display())]
    Header { path: PathBuf, #[source] source: binrw::Error },

    #[error("cannot parse parameter file `{}`: {source}", path.display())]
    Parms { path: PathBuf, #[source] source: toml::de::Error },

    #[error("parameter `{key}` should be {expected}, found `{found}`")]
    ParmType { key: String, expected: &'static str, found: String },

    /// Malformed iteration-save schedule
    #[error("{0}")]
    Syntax(String),

    #[error("cannot allocate {len} samples for {what}")]
    Allocation { what: &'static str, len: usize },

    #[error("{0}")]
    Usage(String),

    #[error("reconstruction engine failed with status {status}: {message}")]
    Engine { status: i32, message: String },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

impl Error {

    pub fn illegal(context: &'static str, message: impl Into<String>) -> Self {
        Self::IllegalValue { context, message: message.into() }
    }

    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    /// Attribute this error to the image `path`, read by `context`
    pub fn in_file(self, context: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::InFile { context, path: path.into(), source: Box::new(self) }
    }

    /// Exit status to be reported by the executables
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Engine { status, .. } => *status,
            Self::InFile { source, .. } => source.exit_code(),
            _ => 1,
        }
    }
}

/// A zero-filled buffer, reporting memory exhaustion instead of aborting
pub fn zeroed(len: usize, what: &'static str) -> Result<Vec<f32>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(len).map_err(|_| Error::Allocation { what, len })?;
    buffer.resize(len, 0.0);
    Ok(buffer)
}
