//! Step-size-controlled integrators behind the trajectory simulator.
//!
//! Explicit Runge–Kutta pairs (Dormand–Prince 5(4), Bogacki–Shampine 3(2))
//! and an implicit backward Euler with Newton iteration. Step control follows
//! the usual scheme: RMS error norm against `atol + rtol·|y|`, safety factor
//! 0.9, growth clamped to [0.2, 10].
//!
//! Every accepted step leaves a continuous extension behind, so samples
//! between step endpoints cost no extra steps.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::dynamics::VectorField;
use crate::error::{ModelError, Result};
use crate::state::VariableIndex;
use crate::trajectory::{Method, Simulation};

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
const NEWTON_MAXITER: usize = 4;

/// Butcher tableau of an embedded explicit pair. `e` has one more entry than
/// `b`: the last weight applies to `f(t + h, y_new)`. `p` maps the stages
/// (including that last one) onto the interpolant's powers of `x`.
struct Tableau {
    c: &'static [f64],
    a: &'static [&'static [f64]],
    b: &'static [f64],
    e: &'static [f64],
    p: &'static [&'static [f64]],
    error_order: f64,
}

static DORMAND_PRINCE: Tableau = Tableau {
    c: &[0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0],
    a: &[
        &[],
        &[1.0 / 5.0],
        &[3.0 / 40.0, 9.0 / 40.0],
        &[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
        &[19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0],
        &[
            9017.0 / 3168.0,
            -355.0 / 33.0,
            46732.0 / 5247.0,
            49.0 / 176.0,
            -5103.0 / 18656.0,
        ],
    ],
    b: &[
        35.0 / 384.0,
        0.0,
        500.0 / 1113.0,
        125.0 / 192.0,
        -2187.0 / 6784.0,
        11.0 / 84.0,
    ],
    e: &[
        -71.0 / 57600.0,
        0.0,
        71.0 / 16695.0,
        -71.0 / 1920.0,
        17253.0 / 339200.0,
        -22.0 / 525.0,
        1.0 / 40.0,
    ],
    p: &[
        &[
            1.0,
            -8048581381.0 / 2820520608.0,
            8663915743.0 / 2820520608.0,
            -12715105075.0 / 11282082432.0,
        ],
        &[0.0, 0.0, 0.0, 0.0],
        &[
            0.0,
            131558114200.0 / 32700410799.0,
            -68118460800.0 / 10900136933.0,
            87487479700.0 / 32700410799.0,
        ],
        &[
            0.0,
            -1754552775.0 / 470086768.0,
            14199869525.0 / 1410260304.0,
            -10690763975.0 / 1880347072.0,
        ],
        &[
            0.0,
            127303824393.0 / 49829197408.0,
            -318862633887.0 / 49829197408.0,
            701980252875.0 / 199316789632.0,
        ],
        &[
            0.0,
            -282668133.0 / 205662961.0,
            2019193451.0 / 616988883.0,
            -1453857185.0 / 822651844.0,
        ],
        &[
            0.0,
            40617522.0 / 29380423.0,
            -110615467.0 / 29380423.0,
            69997945.0 / 29380423.0,
        ],
    ],
    error_order: 4.0,
};

static BOGACKI_SHAMPINE: Tableau = Tableau {
    c: &[0.0, 1.0 / 2.0, 3.0 / 4.0],
    a: &[&[], &[1.0 / 2.0], &[0.0, 3.0 / 4.0]],
    b: &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0],
    e: &[5.0 / 72.0, -1.0 / 12.0, -1.0 / 9.0, 1.0 / 8.0],
    p: &[
        &[1.0, -4.0 / 3.0, 5.0 / 9.0],
        &[0.0, 1.0, -2.0 / 3.0],
        &[0.0, 4.0 / 3.0, -8.0 / 9.0],
        &[0.0, -1.0, 1.0],
    ],
    error_order: 2.0,
};

/// Step accounting for one integration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    pub accepted: usize,
    pub rejected: usize,
    /// Vector field evaluations, including those spent on Jacobians.
    pub evaluations: usize,
    pub jacobians: usize,
}

impl StepStats {
    pub fn attempts(&self) -> usize {
        self.accepted + self.rejected
    }
}

/// Polynomial over the last accepted step:
/// `y(t_old + x·h) = y_old + h·Q·[x, x², …]` for `x` in [0, 1].
struct Dense {
    t_old: f64,
    h: f64,
    y_old: DVector<f64>,
    q: DMatrix<f64>,
}

impl Dense {
    fn eval(&self, t: f64) -> Vec<f64> {
        let x = (t - self.t_old) / self.h;
        let m = self.q.ncols();
        let powers =
            DVector::from_iterator(m, std::iter::successors(Some(x), |p| Some(p * x)).take(m));
        let y = &self.y_old + (&self.q * powers) * self.h;
        y.as_slice().to_vec()
    }
}

enum Attempt {
    Accepted {
        y_new: Vec<f64>,
        f_new: Vec<f64>,
        q: DMatrix<f64>,
        factor: f64,
    },
    Rejected {
        factor: f64,
    },
    NewtonFailed,
}

fn rms(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v * v, n + 1));
    if n == 0 { 0.0 } else { (sum / n as f64).sqrt() }
}

/// Smallest step that still moves `t`.
fn min_step(t: f64) -> f64 {
    10.0 * (t.abs() * f64::EPSILON).max(f64::MIN_POSITIVE)
}

/// Accept/reject decision and the next step-size factor.
fn control(error_norm: f64, error_order: f64, rejected_before: bool) -> (bool, f64) {
    let exponent = -1.0 / (error_order + 1.0);
    if error_norm < 1.0 {
        let mut factor = if error_norm == 0.0 {
            MAX_FACTOR
        } else {
            MAX_FACTOR.min(SAFETY * error_norm.powf(exponent))
        };
        if rejected_before {
            factor = factor.min(1.0);
        }
        (true, factor)
    } else {
        (false, MIN_FACTOR.max(SAFETY * error_norm.powf(exponent)))
    }
}

/// Integration state between accepted steps.
pub(crate) struct Solver<'a, F: VectorField> {
    field: &'a F,
    index: &'a VariableIndex,
    method: Method,
    rtol: f64,
    atol: f64,
    max_steps: usize,
    t: f64,
    y: Vec<f64>,
    f: Vec<f64>,
    h: f64,
    dense: Option<Dense>,
    stats: StepStats,
}

impl<'a, F: VectorField> Solver<'a, F> {
    pub(crate) fn new(
        field: &'a F,
        index: &'a VariableIndex,
        options: &Simulation,
        y0: Vec<f64>,
    ) -> Result<Self> {
        let mut solver = Self {
            field,
            index,
            method: options.method,
            rtol: options.rtol,
            atol: options.atol,
            max_steps: options.max_steps,
            t: options.t0,
            f: Vec::new(),
            y: Vec::new(),
            h: 0.0,
            dense: None,
            stats: StepStats::default(),
        };
        let mut f0 = vec![0.0; y0.len()];
        solver.eval(options.t0, &y0, &mut f0)?;
        solver.y = y0;
        solver.f = f0;
        solver.h = solver.initial_step(options.t1 - options.t0)?;
        Ok(solver)
    }

    pub(crate) fn t(&self) -> f64 {
        self.t
    }

    pub(crate) fn y(&self) -> &[f64] {
        &self.y
    }

    pub(crate) fn stats(&self) -> StepStats {
        self.stats
    }

    /// State at `t` within the last accepted step, `t_old <= t <= self.t()`.
    pub(crate) fn dense_output(&self, t: f64) -> Vec<f64> {
        match &self.dense {
            Some(dense) if t < self.t => dense.eval(t),
            _ => self.y.clone(),
        }
    }

    fn error_order(&self) -> f64 {
        match self.method {
            Method::Rk45 => DORMAND_PRINCE.error_order,
            Method::Rk23 => BOGACKI_SHAMPINE.error_order,
            Method::Bdf1 => 1.0,
        }
    }

    fn eval(&mut self, t: f64, y: &[f64], out: &mut [f64]) -> Result<()> {
        self.field.derivative(t, y, out);
        self.stats.evaluations += 1;
        match out.iter().position(|v| !v.is_finite()) {
            Some(i) => Err(ModelError::NonFiniteDerivative {
                t,
                variable: self.index.name(i).unwrap_or("?").to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Starting step from the scale of `y0`, `f0` and a trial Euler step.
    fn initial_step(&mut self, span: f64) -> Result<f64> {
        let (rtol, atol) = (self.rtol, self.atol);
        let y0 = self.y.clone();
        let f0 = self.f.clone();
        let scale: Vec<f64> = y0.iter().map(|v| atol + v.abs() * rtol).collect();

        let d0 = rms(y0.iter().zip(&scale).map(|(v, s)| v / s));
        let d1 = rms(f0.iter().zip(&scale).map(|(v, s)| v / s));
        let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
        let h0 = h0.min(span);

        let y1: Vec<f64> = y0.iter().zip(&f0).map(|(y, f)| y + h0 * f).collect();
        let mut f1 = vec![0.0; y0.len()];
        self.eval(self.t + h0, &y1, &mut f1)?;
        let d2 = rms(f1.iter().zip(&f0).zip(&scale).map(|((a, b), s)| (a - b) / s)) / h0;

        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            1e-6f64.max(h0 * 1e-3)
        } else {
            (0.01 / d1.max(d2)).powf(1.0 / (self.error_order() + 1.0))
        };

        Ok((100.0 * h0).min(h1).min(span).max(min_step(self.t)))
    }

    /// Take one accepted step without passing `bound`. A step that would
    /// reach or cross `bound` is clipped to land on it exactly.
    pub(crate) fn step(&mut self, bound: f64) -> Result<()> {
        let mut rejected = false;
        loop {
            if self.stats.attempts() >= self.max_steps {
                return Err(ModelError::StepBudgetExhausted {
                    t: self.t,
                    steps: self.stats.attempts(),
                });
            }
            let min_h = min_step(self.t);
            if self.h < min_h {
                return Err(ModelError::StepSizeUnderflow {
                    t: self.t,
                    h: self.h,
                });
            }

            let remaining = bound - self.t;
            let clipped = self.h >= remaining;
            let h = if clipped { remaining } else { self.h };
            let t_new = if clipped { bound } else { self.t + h };

            let attempt = match self.method {
                Method::Rk45 => self.rk_attempt(&DORMAND_PRINCE, h, t_new, rejected)?,
                Method::Rk23 => self.rk_attempt(&BOGACKI_SHAMPINE, h, t_new, rejected)?,
                Method::Bdf1 => self.bdf_attempt(h, t_new, rejected)?,
            };

            match attempt {
                Attempt::Accepted {
                    y_new,
                    f_new,
                    q,
                    factor,
                } => {
                    self.stats.accepted += 1;
                    self.dense = Some(Dense {
                        t_old: self.t,
                        h,
                        y_old: DVector::from_column_slice(&self.y),
                        q,
                    });
                    self.t = t_new;
                    self.y = y_new;
                    self.f = f_new;
                    let next = h * factor;
                    // A clip says nothing about the achievable step.
                    self.h = if clipped && factor >= 1.0 {
                        self.h.max(next)
                    } else {
                        next
                    };
                    return Ok(());
                }
                Attempt::Rejected { factor } => {
                    self.stats.rejected += 1;
                    self.h = h * factor;
                    rejected = true;
                }
                Attempt::NewtonFailed => {
                    self.stats.rejected += 1;
                    if h * 0.5 < min_h {
                        return Err(ModelError::NewtonDiverged { t: self.t });
                    }
                    self.h = h * 0.5;
                    rejected = true;
                }
            }
        }
    }

    fn rk_attempt(
        &mut self,
        tableau: &Tableau,
        h: f64,
        t_new: f64,
        rejected: bool,
    ) -> Result<Attempt> {
        let n = self.y.len();
        let stages = tableau.b.len();
        let mut k: Vec<Vec<f64>> = Vec::with_capacity(stages + 1);
        k.push(self.f.clone());

        for s in 1..stages {
            let ys: Vec<f64> = (0..n)
                .map(|j| {
                    let dy: f64 = tableau.a[s].iter().zip(&k).map(|(a, ks)| a * ks[j]).sum();
                    self.y[j] + dy * h
                })
                .collect();
            let mut ks = vec![0.0; n];
            self.eval(self.t + tableau.c[s] * h, &ys, &mut ks)?;
            k.push(ks);
        }

        let y_new: Vec<f64> = (0..n)
            .map(|j| {
                let dy: f64 = tableau.b.iter().zip(&k).map(|(b, ks)| b * ks[j]).sum();
                self.y[j] + h * dy
            })
            .collect();
        let mut f_new = vec![0.0; n];
        self.eval(t_new, &y_new, &mut f_new)?;
        k.push(f_new);

        let error_norm = rms((0..n).map(|j| {
            let err: f64 = tableau.e.iter().zip(&k).map(|(e, ks)| e * ks[j]).sum::<f64>() * h;
            let scale = self.atol + self.y[j].abs().max(y_new[j].abs()) * self.rtol;
            err / scale
        }));

        let (accepted, factor) = control(error_norm, tableau.error_order, rejected);
        if !accepted {
            return Ok(Attempt::Rejected { factor });
        }

        let stage_matrix = DMatrix::from_fn(n, k.len(), |j, i| k[i][j]);
        let powers = tableau.p.first().map_or(0, |row| row.len());
        let p = DMatrix::from_fn(tableau.p.len(), powers, |i, c| tableau.p[i][c]);
        let q = stage_matrix * p;

        let f_new = k.pop().unwrap_or_default();
        Ok(Attempt::Accepted {
            y_new,
            f_new,
            q,
            factor,
        })
    }

    /// Forward-difference Jacobian, `J[(i, j)] = ∂f_i/∂y_j`.
    fn jacobian(&mut self, t: f64, z: &[f64]) -> Result<DMatrix<f64>> {
        let n = z.len();
        let mut f0 = vec![0.0; n];
        self.eval(t, z, &mut f0)?;

        let mut jac = DMatrix::zeros(n, n);
        let mut zp = z.to_vec();
        let mut fj = vec![0.0; n];
        for j in 0..n {
            let step = f64::EPSILON.sqrt() * z[j].abs().max(1.0);
            zp[j] = z[j] + step;
            let step = zp[j] - z[j];
            self.eval(t, &zp, &mut fj)?;
            zp[j] = z[j];
            for i in 0..n {
                jac[(i, j)] = (fj[i] - f0[i]) / step;
            }
        }
        self.stats.jacobians += 1;
        Ok(jac)
    }

    /// Backward Euler: solve `z = y + h·f(t + h, z)` by Newton from an
    /// explicit Euler predictor. Local error `h/2·(f_new - f)`; the dense
    /// output is the cubic Hermite through both endpoints.
    fn bdf_attempt(&mut self, h: f64, t_new: f64, rejected: bool) -> Result<Attempt> {
        let n = self.y.len();
        let mut z: Vec<f64> = self.y.iter().zip(&self.f).map(|(y, f)| y + h * f).collect();

        let jac = self.jacobian(t_new, &z)?;
        let lu = (DMatrix::<f64>::identity(n, n) - jac * h).lu();

        let scale: Vec<f64> = self.y.iter().map(|v| self.atol + v.abs() * self.rtol).collect();
        let newton_tol = (10.0 * f64::EPSILON / self.rtol).max(0.03f64.min(self.rtol.sqrt()));

        let mut fz = vec![0.0; n];
        let mut converged = false;
        for _ in 0..NEWTON_MAXITER {
            self.eval(t_new, &z, &mut fz)?;
            let residual =
                DVector::from_iterator(n, (0..n).map(|j| -(z[j] - self.y[j] - h * fz[j])));
            // Singular iteration matrix
            let Some(dz) = lu.solve(&residual) else {
                return Ok(Attempt::NewtonFailed);
            };
            let dz_norm = rms(dz.iter().zip(&scale).map(|(d, s)| d / s));
            for (zj, dj) in z.iter_mut().zip(dz.iter()) {
                *zj += dj;
            }
            if !dz_norm.is_finite() {
                break;
            }
            if dz_norm < newton_tol {
                converged = true;
                break;
            }
        }
        if !converged {
            return Ok(Attempt::NewtonFailed);
        }

        let mut f_new = vec![0.0; n];
        self.eval(t_new, &z, &mut f_new)?;
        let error_norm = rms((0..n).map(|j| {
            let err = 0.5 * h * (f_new[j] - self.f[j]);
            let scale = self.atol + self.y[j].abs().max(z[j].abs()) * self.rtol;
            err / scale
        }));

        let (accepted, factor) = control(error_norm, 1.0, rejected);
        if !accepted {
            return Ok(Attempt::Rejected { factor });
        }

        let q = DMatrix::from_fn(n, 3, |j, c| {
            let (f0, f1) = (self.f[j], f_new[j]);
            let slope = (z[j] - self.y[j]) / h;
            match c {
                0 => f0,
                1 => 3.0 * slope - 2.0 * f0 - f1,
                _ => f0 + f1 - 2.0 * slope,
            }
        });
        Ok(Attempt::Accepted {
            y_new: z,
            f_new,
            q,
            factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// `dy/dt = -k·y` on a single variable.
    struct Decay(f64);

    impl VectorField for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn derivative(&self, _t: f64, y: &[f64], dy: &mut [f64]) {
            dy[0] = -self.0 * y[0];
        }
    }

    /// Fast `y0` slaved to slow `y1`: `y0' = -1000·y0 + y1`, `y1' = -y1`.
    struct Coupled;

    impl VectorField for Coupled {
        fn dimension(&self) -> usize {
            2
        }

        fn derivative(&self, _t: f64, y: &[f64], dy: &mut [f64]) {
            dy[0] = -1000.0 * y[0] + y[1];
            dy[1] = -y[1];
        }
    }

    fn options(method: Method, rtol: f64, atol: f64) -> Simulation {
        Simulation {
            method,
            rtol,
            atol,
            ..Simulation::default()
        }
    }

    fn integrate<F: VectorField>(solver: &mut Solver<'_, F>, t1: f64) {
        while solver.t() < t1 {
            solver.step(t1).unwrap();
        }
        assert_eq!(solver.t(), t1);
    }

    fn run(method: Method, k: f64, rtol: f64, atol: f64) -> (f64, StepStats) {
        let index = VariableIndex::new(&["X"]);
        let field = Decay(k);
        let opts = options(method, rtol, atol);
        let mut solver = Solver::new(&field, &index, &opts, vec![1.0]).unwrap();
        integrate(&mut solver, 1.0);
        (solver.y()[0], solver.stats())
    }

    #[test]
    fn test_explicit_pairs_track_exponential() {
        let (y, stats) = run(Method::Rk45, 1.0, 1e-6, 1e-9);
        assert_relative_eq!(y, (-1.0f64).exp(), max_relative = 1e-5);
        assert!(stats.accepted > 0);

        let (y, _) = run(Method::Rk23, 1.0, 1e-6, 1e-9);
        assert_relative_eq!(y, (-1.0f64).exp(), max_relative = 1e-4);
    }

    #[test]
    fn test_backward_euler_tracks_exponential() {
        let (y, stats) = run(Method::Bdf1, 1.0, 1e-6, 1e-9);
        assert_relative_eq!(y, (-1.0f64).exp(), max_relative = 1e-2);
        assert!(stats.jacobians > 0);
    }

    #[test]
    fn test_backward_euler_handles_stiff_decay() {
        // Explicit steps are capped near 2.8/k; backward Euler is not.
        let (y, stats) = run(Method::Bdf1, 1000.0, 1e-3, 1e-6);
        assert!(y.abs() < 1e-3);
        assert!(stats.accepted < 5_000);
    }

    #[test]
    fn test_backward_euler_coupled_system() {
        let index = VariableIndex::new(&["Fast", "Slow"]);
        let opts = options(Method::Bdf1, 1e-4, 1e-8);
        let mut solver = Solver::new(&Coupled, &index, &opts, vec![1.0, 1.0]).unwrap();
        integrate(&mut solver, 1.0);

        let slow = (-1.0f64).exp();
        assert_relative_eq!(solver.y()[1], slow, max_relative = 1e-2);
        // Fast variable settles onto y1/999
        assert_relative_eq!(solver.y()[0], slow / 999.0, max_relative = 5e-2);
        assert!(solver.stats().jacobians > 0);
    }

    #[test]
    fn test_dense_output_between_steps() {
        let index = VariableIndex::new(&["X"]);
        let field = Decay(1.0);
        for (method, tol) in [(Method::Rk45, 1e-6), (Method::Rk23, 1e-5), (Method::Bdf1, 1e-3)] {
            let opts = options(method, 1e-8, 1e-10);
            let mut solver = Solver::new(&field, &index, &opts, vec![1.0]).unwrap();
            for _ in 0..4 {
                solver.step(1.0).unwrap();
            }
            let t_prev = solver.t();
            solver.step(1.0).unwrap();
            let y_prev = solver.dense_output(t_prev)[0];
            assert_relative_eq!(y_prev, (-t_prev).exp(), max_relative = tol);

            let t_mid = 0.5 * (t_prev + solver.t());
            assert_relative_eq!(solver.dense_output(t_mid)[0], (-t_mid).exp(), max_relative = tol);
            assert_eq!(solver.dense_output(solver.t()), solver.y());
        }
    }

    #[test]
    fn test_step_budget_exhausted() {
        let index = VariableIndex::new(&["X"]);
        let field = Decay(1.0);
        let opts = Simulation {
            max_steps: 3,
            ..options(Method::Rk45, 1e-10, 1e-12)
        };
        let mut solver = Solver::new(&field, &index, &opts, vec![1.0]).unwrap();
        let err = (0..10).try_for_each(|_| solver.step(10.0)).unwrap_err();
        assert!(matches!(err, ModelError::StepBudgetExhausted { steps: 3, .. }));
    }

    #[test]
    fn test_non_finite_derivative_names_variable() {
        struct Blowup;
        impl VectorField for Blowup {
            fn dimension(&self) -> usize {
                1
            }
            fn derivative(&self, _t: f64, _y: &[f64], dy: &mut [f64]) {
                dy[0] = f64::NAN;
            }
        }
        let index = VariableIndex::new(&["X"]);
        let err = Solver::new(&Blowup, &index, &Simulation::default(), vec![0.5])
            .err()
            .unwrap();
        assert_eq!(
            err,
            ModelError::NonFiniteDerivative {
                t: 0.0,
                variable: "X".into()
            }
        );
    }

    #[test]
    fn test_interpolant_hits_step_endpoint() {
        // Each stage set must reproduce y_new at x = 1.
        for tableau in [&DORMAND_PRINCE, &BOGACKI_SHAMPINE] {
            for (row, b) in tableau.p.iter().zip(tableau.b.iter().chain([&0.0])) {
                assert_relative_eq!(row.iter().sum::<f64>(), *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_control_bounds() {
        assert_eq!(control(0.0, 4.0, false), (true, MAX_FACTOR));
        assert_eq!(control(0.0, 4.0, true), (true, 1.0));
        let (ok, f) = control(1e6, 4.0, false);
        assert!(!ok);
        assert_eq!(f, MIN_FACTOR);
        let (ok, f) = control(f64::NAN, 4.0, false);
        assert!(!ok);
        assert_eq!(f, MIN_FACTOR);
    }
}
