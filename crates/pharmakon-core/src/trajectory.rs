//! Forward simulation of a state record under a vector field.
//!
//! Integration runs on the raw vector; every reported sample is clamped to
//! [0, 1]. The first sample is the initial record exactly, and even sampling
//! lands on `t1` exactly.

use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::composite::CompositeWeights;
use crate::dynamics::{PharmakonField, VectorField};
use crate::error::{ModelError, Result};
use crate::solver::{Solver, StepStats};
use crate::state::{StateRecord, clamp_unit};

/// Integration method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// Dormand–Prince 5(4).
    #[default]
    #[serde(rename = "RK45")]
    Rk45,
    /// Bogacki–Shampine 3(2).
    #[serde(rename = "RK23")]
    Rk23,
    /// Adaptive backward Euler. Implicit; handles stiff fields.
    #[serde(rename = "BDF1", alias = "BDF")]
    Bdf1,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Rk45 => "RK45",
            Method::Rk23 => "RK23",
            Method::Bdf1 => "BDF1",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RK45" => Ok(Method::Rk45),
            "RK23" => Ok(Method::Rk23),
            "BDF1" | "BDF" => Ok(Method::Bdf1),
            _ => Err(ModelError::UnknownMethod(s.to_string())),
        }
    }
}

/// Which times are reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// `n` evenly spaced times on `[t0, t1]`, both ends included.
    Even(usize),
    /// Every accepted integrator step.
    Adaptive,
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling::Even(100)
    }
}

/// Simulation options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Simulation {
    pub t0: f64,
    pub t1: f64,
    pub sampling: Sampling,
    pub method: Method,
    pub rtol: f64,
    pub atol: f64,
    /// Upper bound on attempted steps, accepted or rejected. Samples do not
    /// count against it.
    pub max_steps: usize,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t1: 10.0,
            sampling: Sampling::default(),
            method: Method::default(),
            rtol: 1e-3,
            atol: 1e-6,
            max_steps: 50_000,
        }
    }
}

impl Simulation {
    pub fn span(mut self, t0: f64, t1: f64) -> Self {
        self.t0 = t0;
        self.t1 = t1;
        self
    }

    pub fn points(mut self, n: usize) -> Self {
        self.sampling = Sampling::Even(n);
        self
    }

    pub fn adaptive(mut self) -> Self {
        self.sampling = Sampling::Adaptive;
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.t0.is_finite() || !self.t1.is_finite() || self.t1 <= self.t0 {
            return Err(ModelError::InvalidSpan {
                t0: self.t0,
                t1: self.t1,
            });
        }
        if let Sampling::Even(n) = self.sampling
            && n < 2
        {
            return Err(ModelError::InvalidSampleCount(n));
        }
        for (name, tol) in [("rtol", self.rtol), ("atol", self.atol)] {
            if !tol.is_finite() || tol <= 0.0 {
                return Err(ModelError::InvalidData(format!(
                    "{name} must be positive and finite, got {tol}"
                )));
            }
        }
        if self.max_steps == 0 {
            return Err(ModelError::InvalidData("max_steps must be at least 1".into()));
        }
        Ok(())
    }
}

/// Sampled solution. Sample vectors follow the shape's `VariableIndex`.
#[derive(Clone, Debug, PartialEq)]
pub struct Trajectory<S> {
    method: Method,
    times: Vec<f64>,
    samples: Vec<Vec<f64>>,
    stats: StepStats,
    shape: PhantomData<fn() -> S>,
}

impl<S: StateRecord> Trajectory<S> {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn stats(&self) -> StepStats {
        self.stats
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Variable names in sample-vector order.
    pub fn names(&self) -> &'static [&'static str] {
        S::index().names()
    }

    pub fn values(&self, i: usize) -> Result<&[f64]> {
        self.samples
            .get(i)
            .map(Vec::as_slice)
            .ok_or(ModelError::SampleOutOfRange {
                index: i,
                len: self.len(),
            })
    }

    /// One variable across all samples.
    pub fn series(&self, name: &str) -> Option<Vec<f64>> {
        let k = S::index().ordinal(name)?;
        Some(self.samples.iter().map(|v| v[k]).collect())
    }

    pub fn state_at(&self, i: usize) -> Result<S> {
        S::from_values(self.values(i)?)
    }

    pub fn final_state(&self) -> Result<S> {
        self.state_at(self.len().saturating_sub(1))
    }

    pub fn states(&self) -> Result<Vec<S>> {
        self.samples.iter().map(|v| S::from_values(v)).collect()
    }

    /// Apply `f` to every `(time, state)` sample, e.g. to reclassify or
    /// recompute composites along the path.
    pub fn evaluate<T>(&self, mut f: impl FnMut(f64, &S) -> T) -> Result<Vec<T>> {
        self.times
            .iter()
            .zip(&self.samples)
            .map(|(t, v)| Ok(f(*t, &S::from_values(v)?)))
            .collect()
    }
}

/// Simulate under the built-in rules and weights.
///
/// The rules act on the raw, unclamped vector, and several of them feed back
/// on themselves. Strongly driven states (high rumination with high
/// lucidity, say) can grow without bound in finite time, and over long
/// spans the integration then stops with
/// [`ModelError::StepSizeUnderflow`]. The acute-stress pattern does so near
/// `t = 48`. Keep spans short or check the error.
pub fn simulate_trajectory<S: StateRecord>(
    initial: &S,
    options: &Simulation,
) -> Result<Trajectory<S>> {
    simulate_with_weights(initial, CompositeWeights::builtin(), options)
}

/// Simulate under the built-in rules with custom composite weights.
pub fn simulate_with_weights<S: StateRecord>(
    initial: &S,
    weights: &CompositeWeights,
    options: &Simulation,
) -> Result<Trajectory<S>> {
    let field = PharmakonField::new(S::index(), weights);
    simulate_with(initial, &field, options)
}

/// Simulate under an arbitrary vector field over the shape's index.
pub fn simulate_with<S: StateRecord, F: VectorField>(
    initial: &S,
    field: &F,
    options: &Simulation,
) -> Result<Trajectory<S>> {
    options.validate()?;
    let index = S::index();
    if field.dimension() != index.len() {
        return Err(ModelError::LengthMismatch {
            expected: index.len(),
            got: field.dimension(),
        });
    }

    let y0 = initial.to_values();
    let mut solver = Solver::new(field, index, options, y0.clone())?;
    let clamped = |y: &[f64]| y.iter().map(|v| clamp_unit(*v)).collect::<Vec<f64>>();

    let mut times = vec![options.t0];
    let mut samples = vec![y0];
    match options.sampling {
        Sampling::Even(n) => {
            let step = (options.t1 - options.t0) / (n - 1) as f64;
            let target = |i: usize| {
                if i == n - 1 {
                    options.t1
                } else {
                    options.t0 + i as f64 * step
                }
            };
            // Steps follow the dynamics; samples are read off the interpolant.
            let mut next = 1;
            while next < n {
                solver.step(options.t1)?;
                while next < n && target(next) <= solver.t() {
                    times.push(target(next));
                    samples.push(clamped(&solver.dense_output(target(next))));
                    next += 1;
                }
            }
        }
        Sampling::Adaptive => {
            while solver.t() < options.t1 {
                solver.step(options.t1)?;
                times.push(solver.t());
                samples.push(clamped(solver.y()));
            }
        }
    }

    let stats = solver.stats();
    debug!(
        shape = S::SHAPE.as_str(),
        method = %options.method,
        samples = times.len(),
        accepted = stats.accepted,
        rejected = stats.rejected,
        evaluations = stats.evaluations,
        "trajectory integrated"
    );

    Ok(Trajectory {
        method: options.method,
        times,
        samples,
        stats,
        shape: PhantomData,
    })
}
