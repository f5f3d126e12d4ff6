//! General-purpose derivative-free minimization and nonlinear least-squares
//! fitting.

use ndarray::{ self as nd, s };
use ndarray_linalg::{ Inverse, Solve };
use crate::error::{ Error, Result };

/* Nelder-Mead ****************************************************************/

/// Downhill simplex minimizer for a scalar function of several variables.
///
/// Uses the conventional reflection, expansion, contraction, and shrink
/// coefficients (1, 2, 1/2, 1/2).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NelderMead {
    /// Absolute tolerance on the spread of the simplex vertices.
    pub xtol: f64,
    /// Absolute tolerance on the spread of function values over the simplex.
    pub ftol: f64,
    /// Maximum number of iterations; `None` means `200 * n`.
    pub maxiter: Option<usize>,
    /// Maximum number of function evaluations; `None` means `200 * n`.
    pub maxfev: Option<usize>,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self { xtol: 1e-4, ftol: 1e-4, maxiter: None, maxfev: None }
    }
}

/// Result of a minimization.
#[derive(Clone, Debug, PartialEq)]
pub struct Minimum {
    /// Location of the minimum.
    pub x: nd::Array1<f64>,
    /// Function value at the minimum.
    pub fun: f64,
    /// Number of iterations performed.
    pub iterations: usize,
    /// Number of function evaluations performed.
    pub evaluations: usize,
    /// `false` if an iteration or evaluation budget ran out before the
    /// tolerances were met.
    pub converged: bool,
}

const RHO: f64 = 1.0;
const CHI: f64 = 2.0;
const PSI: f64 = 0.5;
const SIGMA: f64 = 0.5;
const NONZDELT: f64 = 0.05;
const ZDELT: f64 = 0.00025;

impl NelderMead {
    /// Set `xtol`.
    pub fn with_xtol(mut self, xtol: f64) -> Self { self.xtol = xtol; self }

    /// Set `ftol`.
    pub fn with_ftol(mut self, ftol: f64) -> Self { self.ftol = ftol; self }

    /// Set the iteration budget.
    pub fn with_maxiter(mut self, maxiter: usize) -> Self {
        self.maxiter = Some(maxiter);
        self
    }

    /// Minimize `f` starting from `x0`.
    ///
    /// The initial simplex is formed by perturbing each coordinate of `x0` in
    /// turn, by 5% if it is nonzero or by 0.00025 otherwise.
    ///
    /// Fails if `x0` is empty.
    pub fn minimize<F>(&self, f: F, x0: &nd::Array1<f64>) -> Result<Minimum>
    where F: Fn(&nd::Array1<f64>) -> f64
    {
        let n = x0.len();
        if n == 0 {
            return Err(Error::InvalidInput(
                "cannot minimize over zero parameters".into()));
        }
        let maxiter = self.maxiter.unwrap_or(200 * n);
        let maxfev = self.maxfev.unwrap_or(200 * n);

        let mut sim: Vec<nd::Array1<f64>> = Vec::with_capacity(n + 1);
        sim.push(x0.clone());
        for k in 0..n {
            let mut y = x0.clone();
            if y[k] != 0.0 { y[k] *= 1.0 + NONZDELT; } else { y[k] = ZDELT; }
            sim.push(y);
        }
        let mut fsim: Vec<f64> = sim.iter().map(&f).collect();
        let mut evaluations: usize = n + 1;
        let mut iterations: usize = 1;
        sort_simplex(&mut sim, &mut fsim);

        let mut converged = false;
        while evaluations < maxfev && iterations < maxiter {
            let xspread
                = sim.iter().skip(1)
                .flat_map(|v| v.iter().zip(sim[0].iter()).map(|(a, b)| (a - b).abs()))
                .fold(0.0, f64::max);
            let fspread
                = fsim.iter().skip(1)
                .map(|fk| (fk - fsim[0]).abs())
                .fold(0.0, f64::max);
            if xspread <= self.xtol && fspread <= self.ftol {
                converged = true;
                break;
            }

            let xbar: nd::Array1<f64>
                = sim.iter().take(n)
                .fold(nd::Array1::zeros(n), |acc, v| acc + v)
                / n as f64;
            let worst = sim[n].clone();
            let xr: nd::Array1<f64> = &xbar * (1.0 + RHO) - &worst * RHO;
            let fxr = f(&xr);
            evaluations += 1;
            let mut do_shrink = false;

            if fxr < fsim[0] {
                let xe: nd::Array1<f64>
                    = &xbar * (1.0 + RHO * CHI) - &worst * (RHO * CHI);
                let fxe = f(&xe);
                evaluations += 1;
                if fxe < fxr {
                    sim[n] = xe;
                    fsim[n] = fxe;
                } else {
                    sim[n] = xr;
                    fsim[n] = fxr;
                }
            } else if fxr < fsim[n - 1] {
                sim[n] = xr;
                fsim[n] = fxr;
            } else if fxr < fsim[n] {
                // outside contraction
                let xc: nd::Array1<f64>
                    = &xbar * (1.0 + PSI * RHO) - &worst * (PSI * RHO);
                let fxc = f(&xc);
                evaluations += 1;
                if fxc <= fxr {
                    sim[n] = xc;
                    fsim[n] = fxc;
                } else {
                    do_shrink = true;
                }
            } else {
                // inside contraction
                let xcc: nd::Array1<f64>
                    = &xbar * (1.0 - PSI) + &worst * PSI;
                let fxcc = f(&xcc);
                evaluations += 1;
                if fxcc < fsim[n] {
                    sim[n] = xcc;
                    fsim[n] = fxcc;
                } else {
                    do_shrink = true;
                }
            }

            if do_shrink {
                let best = sim[0].clone();
                for j in 1..=n {
                    sim[j] = &best + &((&sim[j] - &best) * SIGMA);
                    fsim[j] = f(&sim[j]);
                }
                evaluations += n;
            }
            sort_simplex(&mut sim, &mut fsim);
            iterations += 1;
        }

        Ok(Minimum {
            x: sim[0].clone(),
            fun: fsim[0],
            iterations,
            evaluations,
            converged,
        })
    }
}

fn sort_simplex(sim: &mut Vec<nd::Array1<f64>>, fsim: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..fsim.len()).collect();
    order.sort_by(|&a, &b| fsim[a].total_cmp(&fsim[b]));
    *sim = order.iter().map(|&k| sim[k].clone()).collect();
    *fsim = order.iter().map(|&k| fsim[k]).collect();
}

/* Levenberg-Marquardt ********************************************************/

/// Damped Gauss-Newton nonlinear least-squares fitter.
///
/// The Jacobian is estimated by forward differences.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LevenbergMarquardt {
    /// Relative tolerance on the change in the sum of squared residuals.
    pub ftol: f64,
    /// Relative tolerance on the parameter step.
    pub xtol: f64,
    /// Maximum number of model evaluations.
    pub maxfev: usize,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self { ftol: 1.49012e-8, xtol: 1.49012e-8, maxfev: 100_000 }
    }
}

/// Result of a least-squares fit.
#[derive(Clone, Debug, PartialEq)]
pub struct LeastSquaresFit {
    /// Best-fit parameters.
    pub params: nd::Array1<f64>,
    /// Estimated parameter covariance, scaled by the residual variance.
    ///
    /// All elements are infinite if there are no more data points than
    /// parameters.
    pub covariance: nd::Array2<f64>,
    /// Sum of squared residuals at the best fit.
    pub residual_ss: f64,
    /// Number of model evaluations performed.
    pub evaluations: usize,
}

impl LeastSquaresFit {
    /// Return one-standard-deviation parameter uncertainties.
    pub fn std_errors(&self) -> nd::Array1<f64> {
        self.covariance.diag().mapv(f64::sqrt)
    }
}

const DAMP_INIT: f64 = 1e-3;
const DAMP_MAX: f64 = 1e10;
const GTOL: f64 = 1e-6;

impl LevenbergMarquardt {
    /// Set the model evaluation budget.
    pub fn with_maxfev(mut self, maxfev: usize) -> Self {
        self.maxfev = maxfev;
        self
    }

    /// Fit `model` to `ydata`, starting from parameters `p0`.
    ///
    /// `model` maps a parameter vector to predictions for every data point.
    ///
    /// Fails if the model evaluation budget is exhausted, if no step can reduce
    /// the residual away from a stationary point, if the model output length
    /// differs from that of `ydata`, or on a linear algebra error.
    pub fn fit<F>(
        &self,
        model: F,
        ydata: &nd::Array1<f64>,
        p0: &nd::Array1<f64>,
    ) -> Result<LeastSquaresFit>
    where F: Fn(&nd::Array1<f64>) -> nd::Array1<f64>
    {
        let npar = p0.len();
        let ndata = ydata.len();
        if npar == 0 || ndata == 0 {
            return Err(Error::InvalidInput(
                "least-squares fit needs at least one parameter and one data \
                point".into()));
        }
        let mut evaluations: usize = 0;
        let residuals = |p: &nd::Array1<f64>, evals: &mut usize|
            -> Result<nd::Array1<f64>>
        {
            *evals += 1;
            let y = model(p);
            if y.len() != ndata {
                return Err(Error::InvalidInput(format!(
                    "model produced {} values for {} data points",
                    y.len(), ndata,
                )));
            }
            Ok(ydata - &y)
        };

        let mut p: nd::Array1<f64> = p0.clone();
        let mut r: nd::Array1<f64> = residuals(&p, &mut evaluations)?;
        let mut ssr: f64 = r.dot(&r);
        let mut jac: nd::Array2<f64> = self.jacobian(&residuals, &p, &r, &mut evaluations)?;
        let mut damping: f64 = DAMP_INIT;
        loop {
            if evaluations > self.maxfev {
                return Err(Error::FitFailed { maxfev: self.maxfev });
            }
            // residuals are y - f, so the model Jacobian is -jac
            let jtj: nd::Array2<f64> = jac.t().dot(&jac);
            let grad: nd::Array1<f64> = -jac.t().dot(&r);
            let mut a = jtj.clone();
            for k in 0..npar {
                a[[k, k]] += damping * jtj[[k, k]].max(f64::EPSILON);
            }
            let step: nd::Array1<f64> = a.solve(&grad)?;
            let p_new: nd::Array1<f64> = &p + &step;
            let r_new = residuals(&p_new, &mut evaluations)?;
            let ssr_new = r_new.dot(&r_new);

            if ssr_new.is_finite() && ssr_new <= ssr {
                let df = (ssr - ssr_new).abs();
                let pnorm = p.dot(&p).sqrt();
                let snorm = step.dot(&step).sqrt();
                p = p_new;
                r = r_new;
                ssr = ssr_new;
                damping = (damping / 10.0).max(1e-12);
                if df <= self.ftol * ssr || snorm <= self.xtol * (pnorm + self.xtol) {
                    break;
                }
                jac = self.jacobian(&residuals, &p, &r, &mut evaluations)?;
            } else {
                damping *= 10.0;
                if damping > DAMP_MAX {
                    // no downhill step left; only accept if the residual is at
                    // roundoff level or orthogonal to every Jacobian column
                    if ssr <= f64::EPSILON * ydata.dot(ydata)
                        || gradient_cosine(&jac, &r) <= GTOL
                    {
                        break;
                    }
                    return Err(Error::FitStalled { evaluations });
                }
            }
        }

        let covariance: nd::Array2<f64>
            = if ndata > npar {
                let jac = self.jacobian(&residuals, &p, &r, &mut evaluations)?;
                let jtj: nd::Array2<f64> = jac.t().dot(&jac);
                jtj.inv()? * (ssr / (ndata - npar) as f64)
            } else {
                nd::Array2::from_elem((npar, npar), f64::INFINITY)
            };
        Ok(LeastSquaresFit { params: p, covariance, residual_ss: ssr, evaluations })
    }

    // forward-difference Jacobian of the residual vector
    fn jacobian<R>(
        &self,
        residuals: &R,
        p: &nd::Array1<f64>,
        r: &nd::Array1<f64>,
        evaluations: &mut usize,
    ) -> Result<nd::Array2<f64>>
    where R: Fn(&nd::Array1<f64>, &mut usize) -> Result<nd::Array1<f64>>
    {
        let eps = f64::EPSILON.sqrt();
        let mut jac: nd::Array2<f64> = nd::Array2::zeros((r.len(), p.len()));
        for k in 0..p.len() {
            let h = if p[k] == 0.0 { eps } else { eps * p[k].abs() };
            let mut pk = p.clone();
            pk[k] += h;
            let rk = residuals(&pk, evaluations)?;
            jac.slice_mut(s![.., k]).assign(&((&rk - r) / h));
        }
        Ok(jac)
    }
}

// largest |cos| of the angle between the residual and a Jacobian column
fn gradient_cosine(jac: &nd::Array2<f64>, r: &nd::Array1<f64>) -> f64 {
    let rnorm = r.dot(r).sqrt();
    if rnorm == 0.0 { return 0.0; }
    jac.columns().into_iter()
        .map(|col| {
            let cnorm = col.dot(&col).sqrt();
            if cnorm == 0.0 { 0.0 } else { (col.dot(r) / (cnorm * rnorm)).abs() }
        })
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rosenbrock_minimum() {
        let rosen = |x: &nd::Array1<f64>| {
            (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2)
        };
        let min = NelderMead::default()
            .with_xtol(1e-8)
            .with_ftol(1e-10)
            .with_maxiter(2000);
        let min = NelderMead { maxfev: Some(4000), ..min }
            .minimize(rosen, &nd::array![-1.2, 1.0])
            .unwrap();
        assert!(min.converged);
        assert!((min.x[0] - 1.0).abs() < 1e-4);
        assert!((min.x[1] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn quadratic_from_zero() {
        let f = |x: &nd::Array1<f64>| (x[0] - 3.0).powi(2) + (x[1] + 0.5).powi(2);
        let min = NelderMead::default()
            .minimize(f, &nd::array![0.0, 0.0])
            .unwrap();
        assert!(min.converged);
        assert!((min.x[0] - 3.0).abs() < 1e-2);
        assert!((min.x[1] + 0.5).abs() < 1e-2);
        assert!(NelderMead::default().minimize(f, &nd::Array1::zeros(0)).is_err());
    }

    #[test]
    fn exponential_decay_fit() {
        let t: nd::Array1<f64> = nd::Array1::linspace(0.0, 5.0, 50);
        let y: nd::Array1<f64>
            = t.iter().enumerate()
            .map(|(k, tk)| {
                let noise = if k % 2 == 0 { 1e-3 } else { -1e-3 };
                2.5 * (-1.3 * tk).exp() + 0.2 + noise
            })
            .collect();
        let model = |p: &nd::Array1<f64>| t.mapv(|tk| p[0] * (-p[1] * tk).exp() + p[2]);
        let fit = LevenbergMarquardt::default()
            .fit(model, &y, &nd::array![1.0, 1.0, 0.0])
            .unwrap();
        assert!((fit.params[0] - 2.5).abs() < 1e-2);
        assert!((fit.params[1] - 1.3).abs() < 1e-2);
        assert!((fit.params[2] - 0.2).abs() < 1e-2);
        let err = fit.std_errors();
        assert!(err.iter().all(|e| e.is_finite() && *e > 0.0 && *e < 1e-2));
    }

    #[test]
    fn stalled_fit_is_an_error() {
        // |p| has a kink at the start point, so every step goes uphill
        let y = nd::array![1.0];
        let model = |p: &nd::Array1<f64>| nd::array![-p[0].abs()];
        let res = LevenbergMarquardt::default()
            .fit(model, &y, &nd::array![0.0]);
        assert!(matches!(res, Err(Error::FitStalled { .. })));
    }

    #[test]
    fn exact_data_converges() {
        let t: nd::Array1<f64> = nd::Array1::linspace(0.0, 1.0, 20);
        let y = t.mapv(|tk| 2.0 * tk - 0.5);
        let model = |p: &nd::Array1<f64>| t.mapv(|tk| p[0] * tk + p[1]);
        let fit = LevenbergMarquardt::default()
            .fit(model, &y, &nd::array![0.0, 0.0])
            .unwrap();
        assert!((fit.params[0] - 2.0).abs() < 1e-6);
        assert!((fit.params[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn fit_budget_exhausted() {
        let t: nd::Array1<f64> = nd::Array1::linspace(0.0, 5.0, 50);
        let y = t.mapv(|tk| (3.0 * tk).sin());
        let model = |p: &nd::Array1<f64>| t.mapv(|tk| (p[0] * tk).sin());
        let res = LevenbergMarquardt::default()
            .with_maxfev(3)
            .fit(model, &y, &nd::array![1.0]);
        assert!(matches!(res, Err(Error::FitFailed { maxfev: 3 })));
    }
}
