//! Optional TOML configuration for the lab tools.
//!
//! A config file is parsed into a [`toml::Table`] and then read section by
//! section. Every value has a default equal to the constant used in the lab,
//! so an empty (or missing) file reproduces the standard analysis. Unknown
//! keys are ignored, but a known key holding a value of the wrong type is an
//! error.

use std::{
    f64::consts::TAU,
    fs,
    path::{ Path, PathBuf },
};
use ndarray as nd;
use toml::{ Table, Value };
use crate::error::{ Error, Result };

/// A parsed configuration file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    table: Table,
}

impl std::str::FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self { table: s.parse::<Table>()? })
    }
}

impl Config {
    /// Read and parse a TOML file.
    pub fn load<P>(path: P) -> Result<Self>
    where P: AsRef<Path>
    {
        fs::read_to_string(path)?.parse()
    }

    /// Load from a path if one is given, otherwise use all defaults.
    pub fn load_or_default<P>(path: Option<P>) -> Result<Self>
    where P: AsRef<Path>
    {
        path.map(Self::load).unwrap_or_else(|| Ok(Self::default()))
    }

    /// Access a single `[section]`. A missing section yields all defaults.
    pub fn section<'a>(&'a self, name: &'a str) -> Section<'a> {
        Section { name, table: self.table.get(name).and_then(Value::as_table) }
    }

    pub fn output(&self) -> Result<OutputConfig> {
        OutputConfig::from_section(&self.section("output"))
    }

    pub fn beam(&self) -> Result<BeamConfig> {
        BeamConfig::from_section(&self.section("beam"))
    }

    pub fn field(&self) -> Result<FieldConfig> {
        FieldConfig::from_section(&self.section("field"))
    }

    pub fn dressed(&self) -> Result<DressedConfig> {
        DressedConfig::from_section(&self.section("dressed"))
    }

    pub fn pulse(&self) -> Result<PulseConfig> {
        PulseConfig::from_section(&self.section("pulse"))
    }

    pub fn controller(&self) -> Result<ControllerConfig> {
        ControllerConfig::from_section(&self.section("controller"))
    }
}

/// A view into one section of a [`Config`], with typed getters.
#[derive(Copy, Clone, Debug)]
pub struct Section<'a> {
    name: &'a str,
    table: Option<&'a Table>,
}

impl<'a> Section<'a> {
    fn type_err(&self, key: &str, expected: &'static str) -> Error {
        Error::ConfigType { key: format!("{}.{}", self.name, key), expected }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.table.and_then(|t| t.get(key))
    }

    /// Get a float, accepting integers as well.
    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Float(x)) => Ok(*x),
            Some(Value::Integer(n)) => Ok(*n as f64),
            Some(_) => Err(self.type_err(key, "float")),
        }
    }

    /// Get a non-negative integer.
    pub fn usize_or(&self, key: &str, default: usize) -> Result<usize> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Integer(n)) if *n >= 0 => Ok(*n as usize),
            Some(_) => Err(self.type_err(key, "non-negative integer")),
        }
    }

    /// Get an integer.
    pub fn i64_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Integer(n)) => Ok(*n),
            Some(_) => Err(self.type_err(key, "integer")),
        }
    }

    /// Get a string.
    pub fn str_or(&self, key: &str, default: &str) -> Result<String> {
        match self.get(key) {
            None => Ok(default.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(self.type_err(key, "string")),
        }
    }

    /// Get an array of strings.
    pub fn strings_or(&self, key: &str, default: &[&str])
        -> Result<Vec<String>>
    {
        match self.get(key) {
            None => Ok(default.iter().map(|s| s.to_string()).collect()),
            Some(Value::Array(arr)) => {
                arr.iter()
                    .map(|v| {
                        v.as_str()
                            .map(String::from)
                            .ok_or_else(|| self.type_err(key, "array of strings"))
                    })
                    .collect()
            },
            Some(_) => Err(self.type_err(key, "array of strings")),
        }
    }

    /// Get an array of numbers.
    pub fn floats_or(&self, key: &str, default: &[f64]) -> Result<Vec<f64>> {
        match self.get(key) {
            None => Ok(default.to_vec()),
            Some(Value::Array(arr)) => {
                arr.iter()
                    .map(|v| match v {
                        Value::Float(x) => Ok(*x),
                        Value::Integer(n) => Ok(*n as f64),
                        _ => Err(self.type_err(key, "array of floats")),
                    })
                    .collect()
            },
            Some(_) => Err(self.type_err(key, "array of floats")),
        }
    }

    /// Get an array of integers. Floats are rejected rather than rounded.
    pub fn integers_or(&self, key: &str, default: &[i64]) -> Result<Vec<i64>> {
        match self.get(key) {
            None => Ok(default.to_vec()),
            Some(Value::Array(arr)) => {
                arr.iter()
                    .map(|v| {
                        v.as_integer()
                            .ok_or_else(|| self.type_err(key, "array of integers"))
                    })
                    .collect()
            },
            Some(_) => Err(self.type_err(key, "array of integers")),
        }
    }

    /// Get an array of exactly three numbers.
    pub fn vec3_or(&self, key: &str, default: [f64; 3]) -> Result<[f64; 3]> {
        let v = self.floats_or(key, &default)?;
        <[f64; 3]>::try_from(v.as_slice())
            .map_err(|_| self.type_err(key, "array of 3 floats"))
    }

    /// Get an array of `[a, b]` number pairs.
    pub fn pairs_or(&self, key: &str, default: &[[f64; 2]])
        -> Result<Vec<[f64; 2]>>
    {
        let err = || self.type_err(key, "array of [float, float] pairs");
        match self.get(key) {
            None => Ok(default.to_vec()),
            Some(Value::Array(arr)) => {
                arr.iter()
                    .map(|v| {
                        let pair: Vec<f64>
                            = v.as_array()
                            .ok_or_else(err)?
                            .iter()
                            .map(|x| {
                                x.as_float()
                                    .or_else(|| x.as_integer().map(|n| n as f64))
                                    .ok_or_else(err)
                            })
                            .collect::<Result<_>>()?;
                        <[f64; 2]>::try_from(pair.as_slice()).map_err(|_| err())
                    })
                    .collect()
            },
            Some(_) => Err(err()),
        }
    }
}

/// `[output]`: where binaries write their data.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl OutputConfig {
    fn from_section(sec: &Section) -> Result<Self> {
        Ok(Self { dir: sec.str_or("dir", "output")?.into() })
    }
}

/// `[beam]`: camera frames and fit settings.
#[derive(Clone, Debug, PartialEq)]
pub struct BeamConfig {
    /// Frames to fit (TIFF or `.npy`)
    pub files: Vec<PathBuf>,
    /// Pixel size (μm)
    pub pixel: f64,
    /// Initial amplitude guess
    pub amplitude: f64,
    /// Initial background guess
    pub background: f64,
    /// Initial waist guess (μm)
    pub waist: f64,
    /// Model evaluation budget
    pub maxfev: usize,
}

impl BeamConfig {
    fn from_section(sec: &Section) -> Result<Self> {
        Ok(Self {
            files: sec.strings_or("files", &["beam.tif"])?
                .into_iter().map(PathBuf::from).collect(),
            pixel: sec.f64_or("pixel", crate::beam::PIXEL_SIZE)?,
            amplitude: sec.f64_or("amplitude", 255.0)?,
            background: sec.f64_or("background", 0.0)?,
            waist: sec.f64_or("waist", 200.0)?,
            maxfev: sec.usize_or("maxfev", 100_000)?,
        })
    }
}

/// `[field]`: NV parameters and measured transition pairs (MHz).
#[derive(Clone, Debug, PartialEq)]
pub struct FieldConfig {
    pub zfs: f64,
    pub gamma: f64,
    /// Azimuthal field angle (degrees)
    pub phi: f64,
    pub frequencies: Vec<[f64; 2]>,
    pub xtol: f64,
    pub ftol: f64,
}

impl FieldConfig {
    fn from_section(sec: &Section) -> Result<Self> {
        Ok(Self {
            zfs: sec.f64_or("zfs", crate::field::ZFS)?,
            gamma: sec.f64_or("gamma", crate::field::GAMMA)?,
            phi: sec.f64_or("phi", 0.0)?,
            frequencies: sec.pairs_or("frequencies", &[[2898.0, 2842.0]])?,
            xtol: sec.f64_or("xtol", 1e-4)?,
            ftol: sec.f64_or("ftol", 1e-4)?,
        })
    }
}

/// `[dressed]`: dressed-state model parameters and field sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct DressedConfig {
    pub params: crate::dressed::DressedParams,
    /// Mechanical Rabi frequency Ω_m (MHz)
    pub rabi: f64,
    /// Field sweep bounds (G) and number of points
    pub field_min: f64,
    pub field_max: f64,
    pub points: usize,
    /// Slope below which a branch counts as protected (MHz/G)
    pub threshold: f64,
}

impl DressedConfig {
    fn from_section(sec: &Section) -> Result<Self> {
        let def = crate::dressed::DressedParams::default();
        let params = crate::dressed::DressedParams {
            zfs: sec.f64_or("zfs", def.zfs)?,
            gamma: sec.f64_or("gamma", def.gamma)?,
            field: sec.vec3_or("field", def.field)?,
            hyperfine: sec.vec3_or("hyperfine", def.hyperfine)?,
            drive: sec.f64_or("drive", def.drive)?,
        };
        Ok(Self {
            params,
            rabi: sec.f64_or("rabi", 2.0)?,
            field_min: sec.f64_or("field_min", -2.0)?,
            field_max: sec.f64_or("field_max", 2.0)?,
            points: sec.usize_or("points", 1000)?,
            threshold: sec.f64_or("threshold", 0.5)?,
        })
    }

    /// Field values to sweep over (G).
    pub fn field_points(&self) -> nd::Array1<f64> {
        nd::Array1::linspace(self.field_min, self.field_max, self.points)
    }
}

/// `[pulse]`: shaped-pulse parameters.
///
/// Frequencies are given in MHz and times in ns; the accessors convert to
/// angular frequency in rad/ns.
#[derive(Clone, Debug, PartialEq)]
pub struct PulseConfig {
    /// Peak Rabi frequency (MHz)
    pub rabi_max: f64,
    /// Frequency sweep amplitude (MHz)
    pub sweep_amplitude: f64,
    /// Sweep rate β (1/ns)
    pub sweep_rate: f64,
    /// Time step (ns)
    pub dt: f64,
    /// Half-width of the time window in units of `1/β`
    pub duration: f64,
    /// Detuning offset sweep bounds (MHz) and number of points
    pub offset_min: f64,
    pub offset_max: f64,
    pub offsets: usize,
}

const MHZ_TO_RAD_PER_NS: f64 = TAU * 1e-3;

impl PulseConfig {
    fn from_section(sec: &Section) -> Result<Self> {
        Ok(Self {
            rabi_max: sec.f64_or("rabi_max", 0.32)?,
            sweep_amplitude: sec.f64_or("sweep_amplitude", 0.5)?,
            sweep_rate: sec.f64_or("sweep_rate", 0.2e-3)?,
            dt: sec.f64_or("dt", 100.0)?,
            duration: sec.f64_or("duration", 5.0)?,
            offset_min: sec.f64_or("offset_min", -2.0)?,
            offset_max: sec.f64_or("offset_max", 2.0)?,
            offsets: sec.usize_or("offsets", 41)?,
        })
    }

    /// Peak Rabi frequency Ω_0 (rad/ns).
    pub fn omega0(&self) -> f64 { self.rabi_max * MHZ_TO_RAD_PER_NS }

    /// Sweep amplitude Λ (rad/ns).
    pub fn lambda(&self) -> f64 { self.sweep_amplitude * MHZ_TO_RAD_PER_NS }

    /// Half-width of the time window (ns).
    pub fn tmax(&self) -> f64 { self.duration / self.sweep_rate }

    /// Detuning offsets to sweep over (rad/ns).
    pub fn offset_points(&self) -> nd::Array1<f64> {
        nd::Array1::linspace(self.offset_min, self.offset_max, self.offsets)
            * MHZ_TO_RAD_PER_NS
    }
}

/// `[controller]`: settings for the positioner session.
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Initial step size text for all axes (μm)
    pub step: String,
    /// Identifier reported by the virtual device
    pub device_id: i64,
    /// Starting positions of the virtual device (nm)
    pub start: [i64; 3],
}

impl ControllerConfig {
    fn from_section(sec: &Section) -> Result<Self> {
        let start = sec.integers_or("start", &[0; 3])?;
        let start = <[i64; 3]>::try_from(start.as_slice())
            .map_err(|_| sec.type_err("start", "array of 3 integers"))?;
        Ok(Self {
            step: sec.str_or("step", crate::positioner::DEFAULT_STEP)?,
            device_id: sec.i64_or("device_id", 0)?,
            start,
        })
    }
}
