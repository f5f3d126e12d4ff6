//! Stepwise unitary evolution of a driven two-level spin.
//!
//! Where unspecified, the last index of a 2D or 3D array corresponds to time,
//! drive amplitudes and detunings are in units of angular frequency, and the
//! state of the spin is a 2x2 density-matrix-like operator.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    error::{ Error, Result },
    spin::{ Pauli, trace },
};

pub mod rotation;
pub use rotation::{
    step_rotation,
    conjugate,
    evolve,
    evolve_reduced,
    evolve_final,
    bloch_trajectory,
    detuning_sweep,
    SweepResult,
};

/// Compute the expectation value `Re tr(σ ρ)` of a Pauli operator.
pub fn expectation<S>(rho: &nd::ArrayBase<S, nd::Ix2>, op: Pauli) -> f64
where S: nd::Data<Elem = C64>
{
    trace(&op.matrix().dot(rho)).re
}

/// Compute the Bloch vector `(⟨σx⟩, ⟨σy⟩, ⟨σz⟩)` of a state.
pub fn bloch_vector<S>(rho: &nd::ArrayBase<S, nd::Ix2>) -> [f64; 3]
where S: nd::Data<Elem = C64>
{
    [
        expectation(rho, Pauli::X),
        expectation(rho, Pauli::Y),
        expectation(rho, Pauli::Z),
    ]
}

pub(crate) fn check_state(rho0: &nd::Array2<C64>) -> Result<()> {
    if rho0.shape() != [2, 2] {
        return Err(Error::InvalidInput(format!(
            "initial state must be 2x2, but has shape {:?}", rho0.shape()
        )));
    }
    Ok(())
}

pub(crate) fn check_drive(
    amplitude: &nd::Array1<f64>,
    detuning: &nd::Array1<f64>,
) -> Result<()>
{
    if amplitude.len() != detuning.len() {
        return Err(Error::InvalidInput(format!(
            "amplitude and detuning sequences have unequal lengths ({} != {})",
            amplitude.len(), detuning.len(),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spin::{ proj_up, proj_dn, eye };

    #[test]
    fn pure_state_bloch_vectors() {
        assert_eq!(bloch_vector(&proj_up()), [0.0, 0.0, 1.0]);
        assert_eq!(bloch_vector(&proj_dn()), [0.0, 0.0, -1.0]);
        let mixed = eye(2) / 2.0;
        assert_eq!(bloch_vector(&mixed), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn shape_checks() {
        assert!(check_state(&eye(3)).is_err());
        assert!(check_state(&eye(2)).is_ok());
        let a = nd::Array1::zeros(3);
        let d = nd::Array1::zeros(4);
        assert!(matches!(check_drive(&a, &d), Err(Error::InvalidInput(_))));
    }
}
