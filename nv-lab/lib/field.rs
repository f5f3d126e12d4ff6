//! Estimate a static magnetic field from the two ODMR transitions of an NV
//! center.
//!
//! The ground-state triplet is modeled with zero-field splitting `D` and
//! electron Zeeman coupling only. Given measured frequencies of the
//! `m = 0 → +1` and `m = 0 → -1` transitions, the field magnitude `B0` and its
//! polar angle `θ` relative to the NV axis are found by minimizing the squared
//! mismatch between measured and computed transition frequencies.
//!
//! Frequencies are in MHz, fields in Gauss, and angles in degrees.

use std::f64::consts::PI;
use ndarray::{ self as nd, array };
use ndarray_linalg::{ EigValsh, UPLO };
use num_complex::Complex64 as C64;
use crate::{
    c,
    error::{ Error, Result },
    optim::NelderMead,
};

/// Zero-field splitting of the NV ground state (MHz).
pub const ZFS: f64 = 2870.0;

/// Electron gyromagnetic ratio (MHz/G).
pub const GAMMA: f64 = 2.8;

/// Parameters of the NV ground-state Hamiltonian.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NvGroundState {
    /// Zero-field splitting `D` (MHz)
    pub zfs: f64,
    /// Gyromagnetic ratio `γ` (MHz/G)
    pub gamma: f64,
    /// Azimuthal angle `φ` of the field in the plane perpendicular to the NV
    /// axis (degrees)
    pub phi: f64,
}

impl Default for NvGroundState {
    fn default() -> Self { Self { zfs: ZFS, gamma: GAMMA, phi: 0.0 } }
}

/// Transition frequencies out of `m = 0`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Transitions {
    /// `m = 0 → +1` frequency (MHz); always the larger of the two
    pub plus: f64,
    /// `m = 0 → -1` frequency (MHz)
    pub minus: f64,
}

/// A field estimate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FieldEstimate {
    /// Field magnitude (G)
    pub b0: f64,
    /// Polar angle relative to the NV axis (degrees)
    pub theta: f64,
    /// Residual of the cost function at the estimate (MHz^2)
    pub cost: f64,
    /// Whether the minimizer met its tolerances
    pub converged: bool,
}

impl NvGroundState {
    /// Compute the ground-state Hamiltonian for a field of magnitude `b0`
    /// (G) at polar angle `theta` (degrees), in the `(m = +1, 0, -1)`
    /// basis.
    pub fn hamiltonian(&self, b0: f64, theta: f64) -> nd::Array2<C64> {
        let th = theta * PI / 180.0;
        let ph = self.phi * PI / 180.0;
        let bx = b0 * th.sin() * ph.cos();
        let by = b0 * th.sin() * ph.sin();
        let bz = b0 * th.cos();
        let L: C64 = self.gamma / 2.0_f64.sqrt() * C64::new(bx, -by);
        array![
            [c!(self.zfs + self.gamma * bz), L,         c!(0)                         ],
            [L.conj(),                       c!(0),     L                             ],
            [c!(0),                          L.conj(),  c!(self.zfs - self.gamma * bz)],
        ]
    }

    /// Compute the two transition frequencies out of the lowest state.
    pub fn transitions(&self, b0: f64, theta: f64) -> Result<Transitions> {
        let E: nd::Array1<f64>
            = self.hamiltonian(b0, theta).eigvalsh(UPLO::Upper)?;
        Ok(Transitions { plus: E[2] - E[0], minus: E[1] - E[0] })
    }

    /// Squared mismatch between computed transitions and a pair of measured
    /// frequencies.
    ///
    /// The field parameters are taken by absolute value, and the larger
    /// measured frequency is always compared with the `m = 0 → +1`
    /// transition.
    pub fn cost(&self, b0: f64, theta: f64, f: [f64; 2]) -> Result<f64> {
        let tr = self.transitions(b0.abs(), theta.abs())?;
        let fmax = f[0].max(f[1]);
        let fmin = f[0].min(f[1]);
        Ok((tr.plus - fmax).powi(2) + (tr.minus - fmin).powi(2))
    }

    /// Estimate the field from two measured transition frequencies, in either
    /// order, using the default minimizer.
    pub fn estimate(&self, f: [f64; 2]) -> Result<FieldEstimate> {
        self.estimate_with(f, &NelderMead::default())
    }

    /// Estimate the field from two measured transition frequencies, in either
    /// order, starting the minimizer at zero field.
    ///
    /// Fails if either frequency is not finite.
    pub fn estimate_with(&self, f: [f64; 2], minimizer: &NelderMead)
        -> Result<FieldEstimate>
    {
        if !f.iter().all(|fk| fk.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "non-finite transition frequencies {:?}", f)));
        }
        // eigvalsh on a 3x3 Hermitian matrix won't fail for finite inputs, but
        // guard against non-finite trial points anyway
        let costfn = |x: &nd::Array1<f64>| -> f64 {
            self.cost(x[0], x[1], f).unwrap_or(f64::INFINITY)
        };
        let min = minimizer.minimize(costfn, &array![0.0, 0.0])?;
        Ok(FieldEstimate {
            b0: min.x[0].abs(),
            theta: min.x[1].abs(),
            cost: min.fun,
            converged: min.converged,
        })
    }
}

/// Estimate the field from two measured transition frequencies using default
/// NV parameters.
pub fn estimate_field(f: [f64; 2]) -> Result<FieldEstimate> {
    NvGroundState::default().estimate(f)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_field_spectrum() {
        let nv = NvGroundState::default();
        let tr = nv.transitions(0.0, 0.0).unwrap();
        assert!((tr.plus - ZFS).abs() < 1e-9);
        assert!((tr.minus - ZFS).abs() < 1e-9);
    }

    #[test]
    fn axial_field_splitting() {
        let nv = NvGroundState::default();
        let tr = nv.transitions(10.0, 0.0).unwrap();
        assert!((tr.plus - (ZFS + 28.0)).abs() < 1e-9);
        assert!((tr.minus - (ZFS - 28.0)).abs() < 1e-9);
    }

    #[test]
    fn zero_field_recovered() {
        let est = estimate_field([ZFS, ZFS]).unwrap();
        assert!(est.b0 < 1e-3);
        assert!(est.cost < 1e-6);
    }

    #[test]
    fn small_splitting_gives_weak_field() {
        for x in [0.01, 0.1] {
            let est = estimate_field([ZFS + x, ZFS - x]).unwrap();
            assert!(est.converged);
            assert!((est.b0 - x / GAMMA).abs() < 1e-3);
            assert!(est.cost < 1e-8);
        }
    }

    #[test]
    fn axial_field_recovered() {
        let x = 28.0;
        let est = estimate_field([ZFS + x, ZFS - x]).unwrap();
        assert!((est.b0 - 10.0).abs() < 0.1);
        assert!(est.cost < 1e-2);
        let swapped = estimate_field([ZFS - x, ZFS + x]).unwrap();
        assert_eq!(est, swapped);
    }

    #[test]
    fn off_axis_field_reproduces_frequencies() {
        let nv = NvGroundState::default();
        let tr = nv.transitions(30.0, 40.0).unwrap();
        let minimizer = NelderMead::default()
            .with_xtol(1e-8)
            .with_ftol(1e-12)
            .with_maxiter(2000);
        let minimizer = NelderMead { maxfev: Some(4000), ..minimizer };
        let est = nv.estimate_with([tr.plus, tr.minus], &minimizer).unwrap();
        let fit = nv.transitions(est.b0, est.theta).unwrap();
        assert!((fit.plus - tr.plus).abs() < 1e-2);
        assert!((fit.minus - tr.minus).abs() < 1e-2);
    }

    #[test]
    fn non_finite_input_fails() {
        assert!(estimate_field([f64::NAN, ZFS]).is_err());
    }
}
