//! Fit a 2D Gaussian beam profile to a camera frame to extract its waist.
//!
//! Pixel column `j` maps to `x = j * pixel` and row `i` to `y = i * pixel`,
//! with all lengths in micrometers.

use std::{
    fs::File,
    io::BufReader,
    path::Path,
};
use ndarray as nd;
use ndarray_npy::read_npy;
use tiff::{
    ColorType,
    decoder::{ Decoder, DecodingResult },
};
use crate::{
    error::{ Error, Result },
    optim::LevenbergMarquardt,
    utils::FExtremum,
};

/// Pixel pitch of the lab camera (μm).
pub const PIXEL_SIZE: f64 = 5.2;

/// A single grayscale camera frame.
#[derive(Clone, Debug, PartialEq)]
pub struct BeamFrame {
    data: nd::Array2<f64>,
    pixel: f64,
}

impl BeamFrame {
    /// Create a new frame from raw intensities and a pixel size in μm.
    ///
    /// Fails if the frame is empty or the pixel size is not a positive number.
    pub fn new(data: nd::Array2<f64>, pixel: f64) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidInput("empty beam frame".into()));
        }
        if !(pixel.is_finite() && pixel > 0.0) {
            return Err(Error::InvalidInput(format!(
                "pixel size must be positive, but got {}", pixel)));
        }
        Ok(Self { data, pixel })
    }

    /// Load a frame from a file, choosing the format by extension: `.npy`
    /// files are read as 2D `f64` arrays and everything else as TIFF.
    pub fn load<P>(path: P, pixel: f64) -> Result<Self>
    where P: AsRef<Path>
    {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("npy") => Self::load_npy(path, pixel),
            _ => Self::load_tiff(path, pixel),
        }
    }

    /// Load a frame from a 2D `f64` `.npy` file.
    pub fn load_npy<P>(path: P, pixel: f64) -> Result<Self>
    where P: AsRef<Path>
    {
        let data: nd::Array2<f64> = read_npy(path)?;
        Self::new(data, pixel)
    }

    /// Load a frame from a TIFF image, keeping only the first color channel.
    pub fn load_tiff<P>(path: P, pixel: f64) -> Result<Self>
    where P: AsRef<Path>
    {
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
        let (width, height) = decoder.dimensions()?;
        let channels: usize
            = match decoder.colortype()? {
                ColorType::Gray(_) => 1,
                ColorType::GrayA(_) => 2,
                ColorType::RGB(_) => 3,
                ColorType::RGBA(_) => 4,
                other => {
                    return Err(Error::TiffLayout(format!(
                        "unsupported color type {:?}", other)));
                },
            };
        let values: Vec<f64>
            = match decoder.read_image()? {
                DecodingResult::U8(buf)
                    => buf.into_iter().step_by(channels).map(f64::from).collect(),
                DecodingResult::U16(buf)
                    => buf.into_iter().step_by(channels).map(f64::from).collect(),
                DecodingResult::U32(buf)
                    => buf.into_iter().step_by(channels).map(f64::from).collect(),
                DecodingResult::F32(buf)
                    => buf.into_iter().step_by(channels).map(f64::from).collect(),
                DecodingResult::F64(buf)
                    => buf.into_iter().step_by(channels).collect(),
                _ => {
                    return Err(Error::TiffLayout(
                        "unsupported sample format".into()));
                },
            };
        let shape = (height as usize, width as usize);
        let data = nd::Array2::from_shape_vec(shape, values)
            .map_err(|err| Error::TiffLayout(err.to_string()))?;
        Self::new(data, pixel)
    }

    /// Raw intensities, indexed `[row, column]`.
    pub fn data(&self) -> &nd::Array2<f64> { &self.data }

    /// Pixel size (μm).
    pub fn pixel(&self) -> f64 { self.pixel }

    /// Number of rows and columns.
    pub fn shape(&self) -> (usize, usize) { self.data.dim() }

    /// Coordinates of each column (μm).
    pub fn x_coords(&self) -> nd::Array1<f64> {
        (0..self.data.ncols()).map(|j| j as f64 * self.pixel).collect()
    }

    /// Coordinates of each row (μm).
    pub fn y_coords(&self) -> nd::Array1<f64> {
        (0..self.data.nrows()).map(|i| i as f64 * self.pixel).collect()
    }

    /// Default starting point for a fit: amplitude 255 and zero background,
    /// centered on the brightest pixel, with a 200 μm waist.
    pub fn initial_guess(&self) -> BeamParams {
        let (k, _) = self.data.iter().copied().fargmax().unwrap_or((0, 0.0));
        let ncols = self.data.ncols();
        BeamParams {
            amplitude: 255.0,
            background: 0.0,
            x0: (k % ncols) as f64 * self.pixel,
            y0: (k / ncols) as f64 * self.pixel,
            waist: 200.0,
        }
    }
}

/// Parameters of the Gaussian beam model
/// ```text
/// G(x, y) = A exp(-2 ((x - x0)^2 + (y - y0)^2) / W^2) + B
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BeamParams {
    /// Peak height above background `A`
    pub amplitude: f64,
    /// Constant background `B`
    pub background: f64,
    /// Center x-coordinate (μm)
    pub x0: f64,
    /// Center y-coordinate (μm)
    pub y0: f64,
    /// 1/e^2 intensity radius `W` (μm)
    pub waist: f64,
}

impl BeamParams {
    /// Evaluate the model at a single point.
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        let r2 = (x - self.x0).powi(2) + (y - self.y0).powi(2);
        self.amplitude * (-2.0 * r2 / self.waist.powi(2)).exp() + self.background
    }

    /// Flatten to `[A, B, x0, y0, W]`.
    pub fn to_array(&self) -> nd::Array1<f64> {
        nd::array![self.amplitude, self.background, self.x0, self.y0, self.waist]
    }

    fn from_slice(p: &[f64]) -> Self {
        Self {
            amplitude: p[0],
            background: p[1],
            x0: p[2],
            y0: p[3],
            waist: p[4],
        }
    }
}

/// Result of a beam fit.
#[derive(Clone, Debug, PartialEq)]
pub struct BeamFit {
    /// Best-fit parameters; the waist is reported by absolute value
    pub params: BeamParams,
    /// One-standard-deviation uncertainties, in the same order as
    /// [`BeamParams::to_array`]
    pub errors: BeamParams,
    /// Full parameter covariance matrix
    pub covariance: nd::Array2<f64>,
}

/// Evaluate the model over a grid of `shape = (rows, columns)` pixels.
pub fn render(params: &BeamParams, shape: (usize, usize), pixel: f64)
    -> nd::Array2<f64>
{
    nd::Array2::from_shape_fn(
        shape, |(i, j)| params.eval(j as f64 * pixel, i as f64 * pixel))
}

/// Fit the Gaussian model to a frame by nonlinear least squares, starting
/// from `guess` with a budget of `maxfev` model evaluations.
pub fn fit(frame: &BeamFrame, guess: &BeamParams, maxfev: usize)
    -> Result<BeamFit>
{
    let (nrows, ncols) = frame.shape();
    let pixel = frame.pixel();
    let ydata: nd::Array1<f64> = frame.data().iter().copied().collect();
    let model = |p: &nd::Array1<f64>| -> nd::Array1<f64> {
        let params = BeamParams::from_slice(&p.to_vec());
        render(&params, (nrows, ncols), pixel)
            .into_iter()
            .collect()
    };
    let lsq = LevenbergMarquardt::default()
        .with_maxfev(maxfev)
        .fit(model, &ydata, &guess.to_array())?;
    let mut params = BeamParams::from_slice(&lsq.params.to_vec());
    params.waist = params.waist.abs();
    let errors = BeamParams::from_slice(&lsq.std_errors().to_vec());
    Ok(BeamFit { params, errors, covariance: lsq.covariance })
}

/// Format a waist and its uncertainty, both rounded to the first significant
/// digit of the uncertainty.
pub fn format_waist(waist: f64, err: f64) -> String {
    if !(err.is_finite() && err > 0.0) {
        return format!("Waist = {} ± {} μm", waist, err);
    }
    let decimals = -(err.log10().floor() as i32);
    if decimals >= 0 {
        let d = decimals as usize;
        format!("Waist = {:.*} ± {:.*} μm", d, waist, d, err)
    } else {
        let scale = 10.0_f64.powi(-decimals);
        format!(
            "Waist = {:.0} ± {:.0} μm",
            (waist / scale).round() * scale,
            (err / scale).round() * scale,
        )
    }
}
