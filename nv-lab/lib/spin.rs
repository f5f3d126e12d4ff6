//! Matrix representations of spin operators and a few small operator
//! utilities.
//!
//! All spin-1 operators are written in the `(m = +1, 0, -1)` basis, and all
//! spin-1/2 operators in the `(up, down)` basis.

use ndarray::{ self as nd, linalg::kron };
use num_complex::Complex64 as C64;
use crate::c;

/// Names one of the three Pauli operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pauli {
    X,
    Y,
    Z,
}

impl Pauli {
    /// Return the 2x2 matrix representation.
    pub fn matrix(&self) -> nd::Array2<C64> {
        match *self {
            Self::X => sigma_x(),
            Self::Y => sigma_y(),
            Self::Z => sigma_z(),
        }
    }

    /// Iterate over `X`, `Y`, `Z` in order.
    pub fn all() -> [Self; 3] { [Self::X, Self::Y, Self::Z] }
}

/// Pauli X.
pub fn sigma_x() -> nd::Array2<C64> {
    nd::array![
        [c!(0), c!(1)],
        [c!(1), c!(0)],
    ]
}

/// Pauli Y.
pub fn sigma_y() -> nd::Array2<C64> {
    nd::array![
        [c!(0),     c!(0, -1)],
        [c!(0, 1),  c!(0)    ],
    ]
}

/// Pauli Z.
pub fn sigma_z() -> nd::Array2<C64> {
    nd::array![
        [c!(1), c!(0) ],
        [c!(0), c!(-1)],
    ]
}

/// Projector onto the upper (`σz = +1`) state.
pub fn proj_up() -> nd::Array2<C64> {
    nd::array![
        [c!(1), c!(0)],
        [c!(0), c!(0)],
    ]
}

/// Projector onto the lower (`σz = -1`) state.
pub fn proj_dn() -> nd::Array2<C64> {
    nd::array![
        [c!(0), c!(0)],
        [c!(0), c!(1)],
    ]
}

/// Complex identity matrix of size `n`.
pub fn eye(n: usize) -> nd::Array2<C64> { nd::Array2::eye(n) }

/// Spin-1/2 X operator, `σx / 2`.
pub fn spin_half_x() -> nd::Array2<C64> { sigma_x() / 2.0 }

/// Spin-1/2 Y operator, `σy / 2`.
pub fn spin_half_y() -> nd::Array2<C64> { sigma_y() / 2.0 }

/// Spin-1/2 Z operator, `σz / 2`.
pub fn spin_half_z() -> nd::Array2<C64> { sigma_z() / 2.0 }

/// Spin-1 X operator.
pub fn spin1_x() -> nd::Array2<C64> {
    nd::array![
        [c!(0), c!(1), c!(0)],
        [c!(1), c!(0), c!(1)],
        [c!(0), c!(1), c!(0)],
    ] / 2.0_f64.sqrt()
}

/// Spin-1 Y operator.
pub fn spin1_y() -> nd::Array2<C64> {
    nd::array![
        [c!(0),    c!(0, -1), c!(0)    ],
        [c!(0, 1), c!(0),     c!(0, -1)],
        [c!(0),    c!(0, 1),  c!(0)    ],
    ] / 2.0_f64.sqrt()
}

/// Spin-1 Z operator.
pub fn spin1_z() -> nd::Array2<C64> {
    nd::array![
        [c!(1), c!(0), c!(0) ],
        [c!(0), c!(0), c!(0) ],
        [c!(0), c!(0), c!(-1)],
    ]
}

/// Square of the spin-1 Z operator.
pub fn spin1_z2() -> nd::Array2<C64> {
    nd::array![
        [c!(1), c!(0), c!(0)],
        [c!(0), c!(0), c!(0)],
        [c!(0), c!(0), c!(1)],
    ]
}

/// Compute the commutator `[A, B] = A B - B A`.
pub fn commutator<SA, SB>(
    A: &nd::ArrayBase<SA, nd::Ix2>,
    B: &nd::ArrayBase<SB, nd::Ix2>,
) -> nd::Array2<C64>
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    A.dot(B) - B.dot(A)
}

/// Compute the trace of a square matrix.
pub fn trace<S>(A: &nd::ArrayBase<S, nd::Ix2>) -> C64
where S: nd::Data<Elem = C64>
{
    A.diag().iter().copied().sum()
}

/// Compute the conjugate transpose of a matrix.
pub fn dagger<S>(A: &nd::ArrayBase<S, nd::Ix2>) -> nd::Array2<C64>
where S: nd::Data<Elem = C64>
{
    A.t().mapv(|a| a.conj())
}

/// Tensor product of two operators, `A ⊗ B`.
pub fn tensor(A: &nd::Array2<C64>, B: &nd::Array2<C64>) -> nd::Array2<C64> {
    kron(A, B)
}

/// Return `true` if two matrices agree elementwise to within `tol`.
pub fn approx_eq<SA, SB>(
    A: &nd::ArrayBase<SA, nd::Ix2>,
    B: &nd::ArrayBase<SB, nd::Ix2>,
    tol: f64,
) -> bool
where
    SA: nd::Data<Elem = C64>,
    SB: nd::Data<Elem = C64>,
{
    A.shape() == B.shape()
        && A.iter().zip(B.iter()).all(|(a, b)| (*a - *b).norm() <= tol)
}
