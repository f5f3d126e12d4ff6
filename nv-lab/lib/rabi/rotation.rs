//! Piecewise-constant rotation integrator.
//!
//! At each time step the drive is treated as constant, so that the exact
//! single-step propagator is a rotation about the instantaneous effective
//! field `(Ω, 0, δ)` by angle `|(Ω, δ)| dt`.

use ndarray::{ self as nd, s };
use num_complex::Complex64 as C64;
use rayon::iter::{ IntoParallelIterator, ParallelIterator };
use crate::{
    error::Result,
    spin::{ Pauli, dagger, eye },
};
use super::{ bloch_vector, check_drive, check_state, expectation };

/// Compute the single-step rotation operator
/// ```text
/// R = cos(θ/2) I - i sin(θ/2) (Ω/W σx + δ/W σz)
/// ```
/// where `W = sqrt(Ω^2 + δ^2)` and `θ = W dt`.
///
/// If `W` is exactly zero, the step is the identity.
pub fn step_rotation(amplitude: f64, detuning: f64, dt: f64)
    -> nd::Array2<C64>
{
    let W = amplitude.hypot(detuning);
    if W == 0.0 { return eye(2); }
    let (sin, cos) = (W * dt / 2.0).sin_cos();
    let nx = amplitude / W;
    let nz = detuning / W;
    nd::array![
        [C64::new(cos, -sin * nz), C64::new(0.0, -sin * nx)],
        [C64::new(0.0, -sin * nx), C64::new(cos,  sin * nz)],
    ]
}

/// Conjugate a state by a rotation: `R† ρ R`.
pub fn conjugate<S>(
    rho: &nd::ArrayBase<S, nd::Ix2>,
    R: &nd::Array2<C64>,
) -> nd::Array2<C64>
where S: nd::Data<Elem = C64>
{
    dagger(R).dot(rho).dot(R)
}

// apply all steps in time order, handing each new state to `x`
fn do_evolve<I, X>(rho0: &nd::Array2<C64>, drive: I, dt: f64, mut x: X)
    -> nd::Array2<C64>
where
    I: IntoIterator<Item = (f64, f64)>,
    X: FnMut(&nd::Array2<C64>),
{
    let mut rho: nd::Array2<C64> = rho0.clone();
    for (a, d) in drive.into_iter() {
        if a == 0.0 && d == 0.0 {
            x(&rho);
            continue;
        }
        rho = conjugate(&rho, &step_rotation(a, d, dt));
        x(&rho);
    }
    rho
}

/// Evolve the initial state `rho0` through a sequence of drive amplitudes and
/// detunings sampled at uniform step size `dt`.
///
/// The returned array has shape `(2, 2, n)`, with the `k`-th slice along the
/// last axis holding the state after the `k`-th step.
///
/// Fails if `rho0` is not 2x2 or the drive sequences have unequal lengths.
pub fn evolve(
    rho0: &nd::Array2<C64>,
    amplitude: &nd::Array1<f64>,
    detuning: &nd::Array1<f64>,
    dt: f64,
) -> Result<nd::Array3<C64>>
{
    check_state(rho0)?;
    check_drive(amplitude, detuning)?;
    let mut rho_t: nd::Array3<C64> = nd::Array3::zeros((2, 2, amplitude.len()));
    let mut k: usize = 0;
    let drive = amplitude.iter().copied().zip(detuning.iter().copied());
    do_evolve(rho0, drive, dt, |rho| {
        rho_t.slice_mut(s![.., .., k]).assign(rho);
        k += 1;
    });
    Ok(rho_t)
}

/// Like [`evolve`], but return only the output of `x` applied to the state
/// after each step.
pub fn evolve_reduced<X, T>(
    rho0: &nd::Array2<C64>,
    amplitude: &nd::Array1<f64>,
    detuning: &nd::Array1<f64>,
    dt: f64,
    x: X,
) -> Result<Vec<T>>
where X: Fn(&nd::Array2<C64>) -> T
{
    check_state(rho0)?;
    check_drive(amplitude, detuning)?;
    let mut x_t: Vec<T> = Vec::with_capacity(amplitude.len());
    let drive = amplitude.iter().copied().zip(detuning.iter().copied());
    do_evolve(rho0, drive, dt, |rho| x_t.push(x(rho)));
    Ok(x_t)
}

/// Like [`evolve`], but return only the final state.
///
/// An empty drive sequence returns `rho0` unchanged.
pub fn evolve_final(
    rho0: &nd::Array2<C64>,
    amplitude: &nd::Array1<f64>,
    detuning: &nd::Array1<f64>,
    dt: f64,
) -> Result<nd::Array2<C64>>
{
    check_state(rho0)?;
    check_drive(amplitude, detuning)?;
    let drive = amplitude.iter().copied().zip(detuning.iter().copied());
    Ok(do_evolve(rho0, drive, dt, |_| { }))
}

/// Compute the Bloch vector after each step.
///
/// The returned array has shape `(3, n)`, with rows holding `⟨σx⟩`, `⟨σy⟩`,
/// and `⟨σz⟩`.
pub fn bloch_trajectory(
    rho0: &nd::Array2<C64>,
    amplitude: &nd::Array1<f64>,
    detuning: &nd::Array1<f64>,
    dt: f64,
) -> Result<nd::Array2<f64>>
{
    let xyz: Vec<[f64; 3]>
        = evolve_reduced(
            rho0, amplitude, detuning, dt,
            |rho: &nd::Array2<C64>| bloch_vector(rho),
        )?;
    Ok(nd::Array2::from_shape_fn((3, xyz.len()), |(i, k)| xyz[k][i]))
}

/// Final-state observables for a sweep over constant detuning offsets.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepResult {
    /// Detuning offsets (radians)
    pub offsets: nd::Array1<f64>,
    /// Final `⟨σz⟩` for each offset
    pub population: nd::Array1<f64>,
    /// Final `⟨σx⟩` for each offset
    pub dispersion: nd::Array1<f64>,
}

/// For each constant offset in `offsets`, add it uniformly to the detuning
/// sequence, evolve `rho0`, and record the final population (`⟨σz⟩`) and
/// dispersion (`⟨σx⟩`).
///
/// Sweep points are independent and are computed in parallel.
pub fn detuning_sweep(
    rho0: &nd::Array2<C64>,
    amplitude: &nd::Array1<f64>,
    detuning: &nd::Array1<f64>,
    dt: f64,
    offsets: &nd::Array1<f64>,
) -> Result<SweepResult>
{
    check_state(rho0)?;
    check_drive(amplitude, detuning)?;
    let finals: Vec<(f64, f64)>
        = offsets.to_vec()
        .into_par_iter()
        .map(|offs| {
            let drive
                = amplitude.iter().copied()
                .zip(detuning.iter().map(|d| *d + offs));
            let rho = do_evolve(rho0, drive, dt, |_| { });
            (expectation(&rho, Pauli::Z), expectation(&rho, Pauli::X))
        })
        .collect();
    let (population, dispersion): (Vec<f64>, Vec<f64>)
        = finals.into_iter().unzip();
    Ok(SweepResult {
        offsets: offsets.clone(),
        population: population.into(),
        dispersion: dispersion.into(),
    })
}

#[cfg(test)]
mod test {
    use std::f64::consts::{ PI, TAU };
    use rand::Rng;
    use crate::{
        c,
        error::Error,
        pulse::{ PulseShape, time_grid },
        spin::{ approx_eq, proj_up, trace },
    };
    use super::*;

    fn mixed_state() -> nd::Array2<C64> {
        nd::array![
            [c!(0.7),       c!(0.2, -0.1)],
            [c!(0.2, 0.1),  c!(0.3)      ],
        ]
    }

    fn random_drive(n: usize) -> (nd::Array1<f64>, nd::Array1<f64>) {
        let mut rng = rand::thread_rng();
        let amp: nd::Array1<f64>
            = (0..n).map(|_| rng.gen_range(0.0..TAU * 1e-3)).collect();
        let det: nd::Array1<f64>
            = (0..n).map(|_| rng.gen_range(-TAU * 1e-3..TAU * 1e-3)).collect();
        (amp, det)
    }

    #[test]
    fn zero_drive_is_identity() {
        let rho0 = mixed_state();
        let zeros = nd::Array1::zeros(200);
        let rho = evolve_final(&rho0, &zeros, &zeros, 100.0).unwrap();
        assert_eq!(rho, rho0);
        assert_eq!(step_rotation(0.0, 0.0, 100.0), eye(2));
    }

    #[test]
    fn step_rotation_is_unitary() {
        let (amp, det) = random_drive(500);
        for (a, d) in amp.iter().zip(det.iter()) {
            let R = step_rotation(*a, *d, 100.0);
            assert!(approx_eq(&dagger(&R).dot(&R), &eye(2), 1e-10));
        }
        let R = step_rotation(-3.0, 0.5, 0.7);
        assert!(approx_eq(&dagger(&R).dot(&R), &eye(2), 1e-10));
    }

    #[test]
    fn trace_is_preserved() {
        let (amp, det) = random_drive(500);
        let rho_t = evolve(&mixed_state(), &amp, &det, 100.0).unwrap();
        assert_eq!(rho_t.shape(), &[2, 2, 500]);
        for rho in rho_t.axis_iter(nd::Axis(2)) {
            assert!((trace(&rho) - c!(1)).norm() < 1e-10);
        }
    }

    #[test]
    fn pi_pulse_flips_population() {
        const N: usize = 50;
        let rabi = TAU * 0.01;
        let dt = PI / (N as f64 * rabi);
        let amp = nd::Array1::from_elem(N, rabi);
        let det = nd::Array1::zeros(N);
        let z: Vec<f64>
            = evolve_reduced(&proj_up(), &amp, &det, dt,
                |rho| expectation(rho, Pauli::Z))
            .unwrap();
        assert!((expectation(&proj_up(), Pauli::Z) - 1.0).abs() < 1e-15);
        assert!((z[N - 1] + 1.0).abs() < 1e-10);
        // halfway through, the spin lies on the equator
        assert!(z[N / 2 - 1].abs() < 1e-10);
    }

    #[test]
    fn zero_field_step_is_skipped() {
        let (mut amp, mut det) = random_drive(20);
        amp[7] = 0.0;
        det[7] = 0.0;
        let rho_t = evolve(&mixed_state(), &amp, &det, 100.0).unwrap();
        let before = rho_t.slice(s![.., .., 6]);
        let after = rho_t.slice(s![.., .., 7]);
        assert_eq!(before, after);
        assert!(rho_t.iter().all(|a| a.re.is_finite() && a.im.is_finite()));
    }

    #[test]
    fn bloch_trajectory_stays_on_sphere() {
        let (amp, det) = random_drive(300);
        let xyz = bloch_trajectory(&proj_up(), &amp, &det, 100.0).unwrap();
        assert_eq!(xyz.shape(), &[3, 300]);
        for v in xyz.axis_iter(nd::Axis(1)) {
            let r2 = v.iter().map(|c| c * c).sum::<f64>();
            assert!((r2 - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn adiabatic_passage_inverts() {
        let pulse = PulseShape::new_sech(TAU * 0.32e-3, TAU * 0.5e-3, 0.2e-3);
        let time = time_grid(5.0 / 0.2e-3, 100.0);
        let (amp, det) = pulse.gen_time_dep(&time);
        let rho = evolve_final(&proj_up(), &amp, &det, 100.0).unwrap();
        assert!(expectation(&rho, Pauli::Z) < -0.999);

        let offsets = nd::array![-TAU * 2e-3, 0.0, TAU * 2e-3];
        let sweep = detuning_sweep(&proj_up(), &amp, &det, 100.0, &offsets)
            .unwrap();
        assert!(sweep.population[0] > 0.999);
        assert!(sweep.population[1] < -0.999);
        assert!(sweep.population[2] > 0.999);
    }

    #[test]
    fn sweep_matches_sequential() {
        let (amp, det) = random_drive(100);
        let offsets: nd::Array1<f64>
            = nd::Array1::linspace(-TAU * 1e-3, TAU * 1e-3, 9);
        let sweep
            = detuning_sweep(&mixed_state(), &amp, &det, 50.0, &offsets)
            .unwrap();
        for (k, offs) in offsets.iter().enumerate() {
            let rho = evolve_final(
                &mixed_state(), &amp, &det.mapv(|d| d + offs), 50.0).unwrap();
            assert!(
                (sweep.population[k] - expectation(&rho, Pauli::Z)).abs()
                    < 1e-12
            );
            assert!(
                (sweep.dispersion[k] - expectation(&rho, Pauli::X)).abs()
                    < 1e-12
            );
        }
    }

    #[test]
    fn mismatched_drive_fails() {
        let amp = nd::Array1::zeros(10);
        let det = nd::Array1::zeros(11);
        assert!(matches!(
            evolve(&proj_up(), &amp, &det, 1.0),
            Err(Error::InvalidInput(_))
        ));
        assert!(detuning_sweep(&eye(3), &amp, &amp, 1.0, &amp).is_err());
    }
}
