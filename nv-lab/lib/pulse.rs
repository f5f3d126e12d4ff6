//! Shaped microwave drives for a two-level spin.
//!
//! A drive is described by its instantaneous Rabi frequency (amplitude) and
//! its detuning from resonance, both in units of angular frequency.

use std::rc::Rc;
use ndarray as nd;

/// Parameterization of a drive's amplitude and detuning over time.
#[derive(Clone)]
pub enum PulseShape<'a> {
    /// Constant amplitude and detuning.
    Constant {
        /// Rabi frequency Ω (radians)
        amplitude: f64,
        /// Detuning δ (radians)
        detuning: f64,
    },
    /// Hyperbolic secant amplitude with a hyperbolic tangent frequency sweep,
    /// centered on `t = 0`:
    /// ```text
    /// Ω(t) = Ω_0 / cosh(β t)
    /// δ(t) = Λ tanh(β t)
    /// ```
    HyperbolicSecant {
        /// Peak Rabi frequency Ω_0 (radians)
        rabi_max: f64,
        /// Frequency sweep amplitude Λ (radians)
        sweep_amplitude: f64,
        /// Sweep rate β
        sweep_rate: f64,
    },
    /// Arbitrary time-dependent amplitude and detuning.
    Variable {
        /// Rabi frequency Ω(t) (radians)
        amplitude: Rc<dyn Fn(f64) -> f64 + 'a>,
        /// Detuning δ(t) (radians)
        detuning: Rc<dyn Fn(f64) -> f64 + 'a>,
    },
}

impl<'a> std::fmt::Debug for PulseShape<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant { amplitude, detuning } => {
                write!(f,
                    "Constant {{ amplitude: {:?}, detuning: {:?} }}",
                    amplitude, detuning,
                )
            },
            Self::HyperbolicSecant { rabi_max, sweep_amplitude, sweep_rate } => {
                write!(f,
                    "HyperbolicSecant {{ \
                    rabi_max: {:?}, \
                    sweep_amplitude: {:?}, \
                    sweep_rate: {:?} \
                    }}",
                    rabi_max, sweep_amplitude, sweep_rate,
                )
            },
            Self::Variable { .. } => {
                write!(f, "Variable {{ amplitude: Rc<...>, detuning: Rc<...> }}")
            },
        }
    }
}

impl<'a> PulseShape<'a> {
    /// Create a new `PulseShape::Constant`.
    pub fn new_constant(amplitude: f64, detuning: f64) -> Self {
        Self::Constant { amplitude, detuning }
    }

    /// Create a new `PulseShape::HyperbolicSecant`.
    pub fn new_sech(rabi_max: f64, sweep_amplitude: f64, sweep_rate: f64)
        -> Self
    {
        Self::HyperbolicSecant { rabi_max, sweep_amplitude, sweep_rate }
    }

    /// Create a new `PulseShape::Variable`.
    pub fn new_variable<F1, F2>(amplitude: F1, detuning: F2) -> Self
    where
        F1: Fn(f64) -> f64 + 'a,
        F2: Fn(f64) -> f64 + 'a,
    {
        Self::Variable {
            amplitude: Rc::new(amplitude),
            detuning: Rc::new(detuning),
        }
    }

    /// Compute the drive amplitude and detuning at a given time.
    pub fn gen_at(&self, t: f64) -> (f64, f64) {
        match self {
            Self::Constant { amplitude, detuning } => (*amplitude, *detuning),
            Self::HyperbolicSecant { rabi_max, sweep_amplitude, sweep_rate } => {
                let bt = *sweep_rate * t;
                (*rabi_max / bt.cosh(), *sweep_amplitude * bt.tanh())
            },
            Self::Variable { amplitude, detuning } => {
                (amplitude(t), detuning(t))
            },
        }
    }

    /// Calculate the drive amplitude and detuning over an array of time
    /// coordinates.
    pub fn gen_time_dep(&self, time: &nd::Array1<f64>)
        -> (nd::Array1<f64>, nd::Array1<f64>)
    {
        let (amp, det): (Vec<f64>, Vec<f64>)
            = time.iter().map(|t| self.gen_at(*t)).unzip();
        (amp.into(), det.into())
    }
}

/// Generate the uniformly spaced time grid `[-tmax, tmax)` with step `dt`.
///
/// Returns an empty array if `dt` is not positive.
pub fn time_grid(tmax: f64, dt: f64) -> nd::Array1<f64> {
    if dt <= 0.0 || !dt.is_finite() { return nd::Array1::zeros(0); }
    nd::Array1::range(-tmax, tmax, dt)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sech_shape() {
        let pulse = PulseShape::new_sech(2.0, 3.0, 0.5);
        let (a0, d0) = pulse.gen_at(0.0);
        assert!((a0 - 2.0).abs() < 1e-15);
        assert!(d0.abs() < 1e-15);
        let (a, d) = pulse.gen_at(100.0);
        assert!(a < 1e-15);
        assert!((d - 3.0).abs() < 1e-12);
        let (_, dm) = pulse.gen_at(-100.0);
        assert!((dm + 3.0).abs() < 1e-12);
    }

    #[test]
    fn variable_matches_closure() {
        let pulse = PulseShape::new_variable(|t| t * t, |t| -t);
        let time = nd::array![0.0, 1.0, 2.0];
        let (amp, det) = pulse.gen_time_dep(&time);
        assert_eq!(amp, nd::array![0.0, 1.0, 4.0]);
        assert_eq!(det, nd::array![0.0, -1.0, -2.0]);
    }

    #[test]
    fn grid_is_half_open() {
        let t = time_grid(25000.0, 100.0);
        assert_eq!(t.len(), 500);
        assert_eq!(t[0], -25000.0);
        assert!((t[t.len() - 1] - 24900.0).abs() < 1e-9);
        assert_eq!(time_grid(1.0, 0.0).len(), 0);
    }
}
