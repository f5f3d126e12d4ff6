//! Error type shared by all fitting, simulation, and device routines.

use thiserror::Error;

/// Everything that can go wrong in this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tiff decoding error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("unsupported tiff layout: {0}")]
    TiffLayout(String),

    #[error("error reading npy array: {0}")]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error("error writing npz archive: {0}")]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),

    #[error("error parsing config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("bad command pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("config key '{key}' should be of type {expected}")]
    ConfigType { key: String, expected: &'static str },

    #[error("linear algebra error: {0}")]
    Linalg(String),

    #[error("fit failed to converge within {maxfev} function evaluations")]
    FitFailed { maxfev: usize },

    #[error("fit stalled after {evaluations} function evaluations: no step reduces the residual")]
    FitStalled { evaluations: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid step size '{0}': expected a number of micrometers")]
    InvalidStepSize(String),

    #[error("invalid axis index {0}: expected 0, 1, or 2")]
    InvalidAxis(usize),

    #[error("positioner error: {0}")]
    Device(String),
}

impl From<ndarray_linalg::error::LinalgError> for Error {
    fn from(err: ndarray_linalg::error::LinalgError) -> Self {
        Self::Linalg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
