//! Mechanically dressed spin states of an NV center.
//!
//! Only the `m_I = +1` subspace of the ¹⁴N hyperfine manifold is considered.
//! A mechanical drive couples the `m_s = +1` and `m_s = -1` states of the
//! electronic triplet with Rabi frequency `Ω_m`, and the electron spin is also
//! coupled to a nearby spin-1/2 (e.g. a ¹³C nucleus) through a hyperfine
//! tensor `A`. The total Hamiltonian acts on the 6-dimensional space
//! `(spin-1) ⊗ (spin-1/2)`.
//!
//! Frequencies are in MHz and fields in Gauss.

use itertools::Itertools;
use ndarray::{ self as nd, s };
use ndarray_linalg::{ EigValsh, UPLO };
use num_complex::Complex64 as C64;
use crate::{
    c,
    error::{ Error, Result },
    spin::{
        eye,
        spin1_x, spin1_y, spin1_z, spin1_z2,
        spin_half_x, spin_half_y, spin_half_z,
        tensor,
    },
};

/// Physical parameters of the dressed-state model.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DressedParams {
    /// Zero-field splitting `D` (MHz)
    pub zfs: f64,
    /// Gyromagnetic ratio `γ` (MHz/G)
    pub gamma: f64,
    /// Static magnetic field (G)
    pub field: [f64; 3],
    /// Hyperfine coupling to the nearby spin-1/2, `(Ax, Ay, Az)` (MHz)
    pub hyperfine: [f64; 3],
    /// Frequency of the mechanical drive (MHz)
    pub drive: f64,
}

impl Default for DressedParams {
    fn default() -> Self {
        Self {
            zfs: 2876.0,
            gamma: 2.8,
            field: [0.0, 0.0, 0.9425],
            hyperfine: [0.0, 0.0, 0.150],
            drive: 5.278,
        }
    }
}

/// Coupling between `m_s = +1` and `m_s = -1` induced by the mechanical drive.
pub fn mechanical_coupling() -> nd::Array2<C64> {
    nd::array![
        [c!(0), c!(0), c!(1)],
        [c!(0), c!(0), c!(0)],
        [c!(1), c!(0), c!(0)],
    ] / 2.0
}

impl DressedParams {
    /// Detuning of the mechanical drive from the `+1 ↔ -1` transition at the
    /// configured field, `drive - 2 γ Bz`.
    pub fn working_detuning(&self) -> f64 {
        self.drive - 2.0 * self.gamma * self.field[2]
    }

    /// Electron-spin Hamiltonian in the frame of the mechanical drive, for
    /// detuning `delta` and mechanical Rabi frequency `om`:
    /// ```text
    /// H = D Sz^2 + γ (Bx Sx + By Sy) - δ/2 Sz + Ω_m M
    /// ```
    pub fn spin_hamiltonian(&self, delta: f64, om: f64) -> nd::Array2<C64> {
        let [bx, by, _] = self.field;
        spin1_z2() * self.zfs
            + (spin1_x() * bx + spin1_y() * by) * self.gamma
            - spin1_z() * (delta / 2.0)
            + mechanical_coupling() * om
    }

    /// Hyperfine interaction with the nearby spin-1/2,
    /// `Ax Sx⊗Ix + Ay Sy⊗Iy + Az Sz⊗Iz`.
    pub fn hyperfine_hamiltonian(&self) -> nd::Array2<C64> {
        let [ax, ay, az] = self.hyperfine;
        tensor(&spin1_x(), &spin_half_x()) * ax
            + tensor(&spin1_y(), &spin_half_y()) * ay
            + tensor(&spin1_z(), &spin_half_z()) * az
    }

    /// Full 6x6 Hamiltonian, `H ⊗ I + H_hf`.
    pub fn total_hamiltonian(&self, delta: f64, om: f64) -> nd::Array2<C64> {
        tensor(&self.spin_hamiltonian(delta, om), &eye(2))
            + self.hyperfine_hamiltonian()
    }

    /// Eigenvalues of the full Hamiltonian in ascending order.
    pub fn energies(&self, delta: f64, om: f64) -> Result<nd::Array1<f64>> {
        Ok(self.total_hamiltonian(delta, om).eigvalsh(UPLO::Lower)?)
    }

    /// Compute the four dressed-state branches over a range of field values
    /// relative to the mechanical resonance, with detuning `γ B` at each
    /// point.
    ///
    /// Energies are taken relative to the lowest eigenvalue. Where the
    /// detuning is positive the upper four eigenvalues are labeled, from the
    /// top, down-plus, up-plus, up-minus, down-minus; otherwise, up-plus,
    /// down-plus, down-minus, up-minus. This keeps each branch continuous
    /// across the avoided crossing at zero detuning for the default
    /// parameters, and should be checked before use elsewhere.
    pub fn sweep_field(&self, om: f64, field: &nd::Array1<f64>)
        -> Result<DressedBranches>
    {
        let n = field.len();
        let mut up_plus: nd::Array1<f64> = nd::Array1::zeros(n);
        let mut up_minus: nd::Array1<f64> = nd::Array1::zeros(n);
        let mut down_plus: nd::Array1<f64> = nd::Array1::zeros(n);
        let mut down_minus: nd::Array1<f64> = nd::Array1::zeros(n);
        for (k, &b) in field.iter().enumerate() {
            let delta = self.gamma * b;
            let E = self.energies(delta, om)?;
            let E = E.slice(s![2..]).mapv(|e| e - E[0]);
            let (up_p, dn_p, up_m, dn_m)
                = if delta > 0.0 {
                    (E[2], E[3], E[1], E[0])
                } else {
                    (E[3], E[2], E[0], E[1])
                };
            up_plus[k] = up_p;
            down_plus[k] = dn_p;
            up_minus[k] = up_m;
            down_minus[k] = dn_m;
        }
        Ok(DressedBranches {
            field: field.clone(),
            up_plus,
            up_minus,
            down_plus,
            down_minus,
        })
    }
}

/// Dressed-state energies over a field sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct DressedBranches {
    /// Field values relative to the mechanical resonance (G)
    pub field: nd::Array1<f64>,
    /// Up-plus branch (MHz)
    pub up_plus: nd::Array1<f64>,
    /// Up-minus branch (MHz)
    pub up_minus: nd::Array1<f64>,
    /// Down-plus branch (MHz)
    pub down_plus: nd::Array1<f64>,
    /// Down-minus branch (MHz)
    pub down_minus: nd::Array1<f64>,
}

impl DressedBranches {
    /// Field derivatives of the up-plus and down-plus branches.
    pub fn plus_slopes(&self) -> Result<(nd::Array1<f64>, nd::Array1<f64>)> {
        Ok((
            slopes(&self.up_plus, &self.field)?,
            slopes(&self.down_plus, &self.field)?,
        ))
    }
}

/// Finite-difference derivative `Δy / Δx`, of length one less than the input.
///
/// Fails if the arrays have unequal lengths or fewer than two elements.
pub fn slopes(y: &nd::Array1<f64>, x: &nd::Array1<f64>)
    -> Result<nd::Array1<f64>>
{
    if y.len() != x.len() || y.len() < 2 {
        return Err(Error::InvalidInput(format!(
            "slopes need two equal-length arrays of at least two points \
            (got {} and {})",
            y.len(), x.len(),
        )));
    }
    Ok(
        y.iter().tuple_windows()
            .zip(x.iter().tuple_windows())
            .map(|((yk, ykp1), (xk, xkp1))| (ykp1 - yk) / (xkp1 - xk))
            .collect()
    )
}

/// Mark where a branch is protected from field noise, i.e. where
/// `|slope| < threshold`.
pub fn protected_mask(slope: &nd::Array1<f64>, threshold: f64)
    -> nd::Array1<bool>
{
    slope.mapv(|m| m.abs() < threshold)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spin::{ approx_eq, dagger };

    fn bare() -> DressedParams {
        DressedParams {
            hyperfine: [0.0; 3],
            ..DressedParams::default()
        }
    }

    #[test]
    fn hamiltonian_is_hermitian() {
        let params = DressedParams {
            field: [0.3, -0.2, 0.9],
            hyperfine: [0.05, 0.07, 0.15],
            ..DressedParams::default()
        };
        let h = params.total_hamiltonian(1.3, 2.0);
        assert_eq!(h.shape(), &[6, 6]);
        assert!(approx_eq(&h, &dagger(&h), 1e-12));
    }

    #[test]
    fn undressed_spectrum() {
        let params = bare();
        let E = params.energies(4.0, 0.0).unwrap();
        let D = params.zfs;
        let expected = [0.0, 0.0, D - 2.0, D - 2.0, D + 2.0, D + 2.0];
        for (e, x) in E.iter().zip(expected) {
            assert!((e - x).abs() < 1e-9);
        }
    }

    #[test]
    fn resonant_dressing_splits_by_rabi() {
        let params = bare();
        let E = params.energies(0.0, 2.0).unwrap();
        let D = params.zfs;
        assert!((E[2] - (D - 1.0)).abs() < 1e-9);
        assert!((E[5] - (D + 1.0)).abs() < 1e-9);
    }

    #[test]
    fn branch_labels_follow_detuning_sign() {
        let params = DressedParams::default();
        let field = nd::array![-0.5, 0.5];
        let br = params.sweep_field(2.0, &field).unwrap();
        let neg = params.energies(params.gamma * -0.5, 2.0).unwrap();
        let pos = params.energies(params.gamma * 0.5, 2.0).unwrap();
        assert!((br.up_plus[0] - (neg[5] - neg[0])).abs() < 1e-12);
        assert!((br.down_plus[0] - (neg[4] - neg[0])).abs() < 1e-12);
        assert!((br.down_minus[0] - (neg[3] - neg[0])).abs() < 1e-12);
        assert!((br.up_minus[0] - (neg[2] - neg[0])).abs() < 1e-12);
        assert!((br.down_plus[1] - (pos[5] - pos[0])).abs() < 1e-12);
        assert!((br.up_plus[1] - (pos[4] - pos[0])).abs() < 1e-12);
        assert!((br.up_minus[1] - (pos[3] - pos[0])).abs() < 1e-12);
        assert!((br.down_minus[1] - (pos[2] - pos[0])).abs() < 1e-12);
    }

    #[test]
    fn slopes_and_mask() {
        let x = nd::Array1::linspace(-1.0, 1.0, 11);
        let y = x.mapv(|xk| 3.0 * xk * xk);
        let m = slopes(&y, &x).unwrap();
        assert_eq!(m.len(), 10);
        assert!((m[0] + 5.4).abs() < 1e-9);
        assert!((m[9] - 5.4).abs() < 1e-9);
        let mask = protected_mask(&m, 0.7);
        assert_eq!(mask.iter().filter(|p| **p).count(), 2);
        assert!(slopes(&y, &x.slice(s![..5]).to_owned()).is_err());
    }

    #[test]
    fn dressed_branches_flatten_near_resonance() {
        let params = DressedParams::default();
        let field = nd::Array1::linspace(-2.0, 2.0, 1000);
        let br = params.sweep_field(2.0, &field).unwrap();
        let (m_up, m_dn) = br.plus_slopes().unwrap();
        assert_eq!(m_up.len(), 999);
        // far from resonance the branches move at ±γ/2 per Gauss
        assert!((m_up[0].abs() - params.gamma / 2.0).abs() < 0.2);
        assert!(protected_mask(&m_up, 0.5).iter().any(|p| *p));
        assert!(protected_mask(&m_dn, 0.5).iter().any(|p| *p));
    }
}
