use std::fmt;

/// Everything the core can refuse or fail at.
///
/// Construction errors are raised immediately; derived computations are total.
/// Only the trajectory simulator fails at call time.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// A state field was given NaN or an infinity.
    NonFinite { variable: String, value: f64 },
    /// A name outside the state shape's key set.
    UnknownVariable(String),
    /// A value vector whose length does not match the shape.
    LengthMismatch { expected: usize, got: usize },
    /// Weight table rejected (negative, non-finite, bad sum, unknown name).
    InvalidWeights(String),
    /// Time span not finite or not increasing.
    InvalidSpan { t0: f64, t1: f64 },
    /// Fewer than two evenly spaced samples requested.
    InvalidSampleCount(usize),
    /// Method identifier outside the supported set.
    UnknownMethod(String),
    /// The vector field produced NaN or an infinity.
    NonFiniteDerivative { t: f64, variable: String },
    /// Adaptive step shrank below the representable minimum.
    StepSizeUnderflow { t: f64, h: f64 },
    /// The step budget ran out before reaching the end of the span.
    StepBudgetExhausted { t: f64, steps: usize },
    /// Implicit solve did not converge even at the minimum step.
    NewtonDiverged { t: f64 },
    /// Sample index past the end of a trajectory.
    SampleOutOfRange { index: usize, len: usize },
    /// Malformed serialized state.
    InvalidData(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::NonFinite { variable, value } => {
                write!(f, "non-finite value {value} for {variable}")
            }
            ModelError::UnknownVariable(name) => write!(f, "unknown variable: {name}"),
            ModelError::LengthMismatch { expected, got } => {
                write!(f, "expected {expected} values, got {got}")
            }
            ModelError::InvalidWeights(msg) => write!(f, "invalid weights: {msg}"),
            ModelError::InvalidSpan { t0, t1 } => {
                write!(f, "invalid time span [{t0}, {t1}]: need finite t0 < t1")
            }
            ModelError::InvalidSampleCount(n) => {
                write!(f, "need at least 2 sample points, got {n}")
            }
            ModelError::UnknownMethod(name) => write!(f, "unknown integration method: {name}"),
            ModelError::NonFiniteDerivative { t, variable } => {
                write!(f, "non-finite derivative for {variable} at t={t}")
            }
            ModelError::StepSizeUnderflow { t, h } => {
                write!(f, "step size {h:e} underflowed at t={t}")
            }
            ModelError::StepBudgetExhausted { t, steps } => {
                write!(f, "integration stopped at t={t} after {steps} steps")
            }
            ModelError::NewtonDiverged { t } => {
                write!(f, "implicit solve failed to converge at t={t}")
            }
            ModelError::SampleOutOfRange { index, len } => {
                write!(f, "sample {index} out of range for trajectory of {len}")
            }
            ModelError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::InvalidData(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
