//! State records: the minimal (S, H, B) and refined (S, H_somatic,
//! H_cognitive, B) shapes, plus the machinery every shape shares.
//!
//! Every field is clamped into [0, 1] on construction. Out-of-range input is
//! corrected silently; non-finite input is rejected.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::constants::{AMPLIFICATION_H_COGNITIVE, EPSILON};
use crate::error::{ModelError, Result};

/// `max(0, min(1, v))`.
pub fn clamp_unit(v: f64) -> f64 {
    v.min(1.0).max(0.0)
}

/// Reject non-finite input, clamp everything else.
pub fn checked_unit(variable: &str, v: f64) -> Result<f64> {
    if !v.is_finite() {
        return Err(ModelError::NonFinite {
            variable: variable.to_string(),
            value: v,
        });
    }
    Ok(clamp_unit(v))
}

/// Which record layout a value vector belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateShape {
    Minimal,
    Refined,
    MultiDomain,
}

impl StateShape {
    pub fn as_str(self) -> &'static str {
        match self {
            StateShape::Minimal => "minimal",
            StateShape::Refined => "refined",
            StateShape::MultiDomain => "multi_domain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minimal" => Some(StateShape::Minimal),
            "refined" => Some(StateShape::Refined),
            "multi_domain" | "multi-domain" | "multi" => Some(StateShape::MultiDomain),
            _ => None,
        }
    }
}

/// Injective name → ordinal mapping for one state shape.
///
/// Names are kept in lexicographic order, so ordinal `i` always refers to the
/// same variable for a given shape. Built once per shape and shared by the
/// integrator and by trajectory decoding.
#[derive(Debug)]
pub struct VariableIndex {
    names: Vec<&'static str>,
    ordinals: HashMap<&'static str, usize>,
}

impl VariableIndex {
    pub fn new(names: &[&'static str]) -> Self {
        let mut names = names.to_vec();
        names.sort_unstable();
        names.dedup();
        let ordinals = names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        Self { names, ordinals }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.ordinals.get(name).copied()
    }

    pub fn name(&self, ordinal: usize) -> Option<&'static str> {
        self.names.get(ordinal).copied()
    }

    /// Validate a raw vector against this index: length, finiteness, clamping.
    pub fn validate(&self, values: &[f64]) -> Result<Vec<f64>> {
        if values.len() != self.len() {
            return Err(ModelError::LengthMismatch {
                expected: self.len(),
                got: values.len(),
            });
        }
        self.names
            .iter()
            .zip(values)
            .map(|(name, v)| checked_unit(name, *v))
            .collect()
    }
}

/// Common interface of all state shapes.
///
/// A record flattens to a value vector ordered by its shape's
/// [`VariableIndex`], and rebuilds from one with the clamping rule applied.
pub trait StateRecord: Clone + Default + Sized {
    const SHAPE: StateShape;

    fn index() -> &'static VariableIndex;

    /// Values in index order.
    fn to_values(&self) -> Vec<f64>;

    /// Rebuild from values in index order. Clamps; rejects non-finite values.
    fn from_values(values: &[f64]) -> Result<Self>;

    fn get(&self, name: &str) -> Option<f64> {
        let i = Self::index().ordinal(name)?;
        self.to_values().get(i).copied()
    }

    /// Flat name → value map.
    fn to_map(&self) -> BTreeMap<String, f64> {
        Self::index()
            .names()
            .iter()
            .zip(self.to_values())
            .map(|(n, v)| (n.to_string(), v))
            .collect()
    }

    /// Build from a partial map: absent names take the shape default,
    /// unknown names are rejected.
    fn from_map(map: &BTreeMap<String, f64>) -> Result<Self> {
        let index = Self::index();
        let mut values = Self::default().to_values();
        for (name, value) in map {
            let i = index
                .ordinal(name)
                .ok_or_else(|| ModelError::UnknownVariable(name.clone()))?;
            values[i] = *value;
        }
        Self::from_values(&values)
    }
}

// ---------------------------------------------------------------------------
// Minimal state
// ---------------------------------------------------------------------------

/// Three-variable state.
///
/// - `S` self/identity: 0 = dissolution, 1 = rigidly bounded identity
/// - `H` energy: 0 = depleted, 1 = abundant
/// - `B` bias: 0 = belief matches reality, 1 = severe distortion
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, f64>",
    into = "BTreeMap<String, f64>"
)]
pub struct MinimalState {
    s: f64,
    h: f64,
    b: f64,
}

impl MinimalState {
    pub fn new(s: f64, h: f64, b: f64) -> Result<Self> {
        Ok(Self {
            s: checked_unit("S", s)?,
            h: checked_unit("H", h)?,
            b: checked_unit("B", b)?,
        })
    }

    pub fn s(&self) -> f64 {
        self.s
    }

    pub fn h(&self) -> f64 {
        self.h
    }

    pub fn b(&self) -> f64 {
        self.b
    }
}

impl Default for MinimalState {
    fn default() -> Self {
        Self {
            s: 0.5,
            h: 0.8,
            b: 0.4,
        }
    }
}

impl StateRecord for MinimalState {
    const SHAPE: StateShape = StateShape::Minimal;

    fn index() -> &'static VariableIndex {
        static INDEX: OnceLock<VariableIndex> = OnceLock::new();
        INDEX.get_or_init(|| VariableIndex::new(&["S", "H", "B"]))
    }

    fn to_values(&self) -> Vec<f64> {
        Self::index()
            .names()
            .iter()
            .map(|name| match *name {
                "S" => self.s,
                "H" => self.h,
                _ => self.b,
            })
            .collect()
    }

    fn from_values(values: &[f64]) -> Result<Self> {
        let index = Self::index();
        let v = index.validate(values)?;
        let at = |name: &str| index.ordinal(name).map(|i| v[i]).unwrap_or_default();
        Ok(Self {
            s: at("S"),
            h: at("H"),
            b: at("B"),
        })
    }
}

impl TryFrom<BTreeMap<String, f64>> for MinimalState {
    type Error = ModelError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        Self::from_map(&map)
    }
}

impl From<MinimalState> for BTreeMap<String, f64> {
    fn from(state: MinimalState) -> Self {
        state.to_map()
    }
}

// ---------------------------------------------------------------------------
// Refined state
// ---------------------------------------------------------------------------

/// Four-variable state: `H` split into somatic (arousal) and cognitive
/// (executive) capacity.
///
/// When somatic capacity outruns a collapsing cognitive capacity, baseline
/// bias is amplified; see [`RefinedState::amplified_bias`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, f64>",
    into = "BTreeMap<String, f64>"
)]
pub struct RefinedState {
    s: f64,
    h_somatic: f64,
    h_cognitive: f64,
    b: f64,
}

impl RefinedState {
    pub fn new(s: f64, h_somatic: f64, h_cognitive: f64, b: f64) -> Result<Self> {
        Ok(Self {
            s: checked_unit("S", s)?,
            h_somatic: checked_unit("H_somatic", h_somatic)?,
            h_cognitive: checked_unit("H_cognitive", h_cognitive)?,
            b: checked_unit("B", b)?,
        })
    }

    pub fn s(&self) -> f64 {
        self.s
    }

    pub fn h_somatic(&self) -> f64 {
        self.h_somatic
    }

    pub fn h_cognitive(&self) -> f64 {
        self.h_cognitive
    }

    /// Baseline (unamplified) bias.
    pub fn b(&self) -> f64 {
        self.b
    }

    /// `max(0, H_somatic - H_cognitive)`.
    pub fn energy_mismatch(&self) -> f64 {
        (self.h_somatic - self.h_cognitive).max(0.0)
    }

    /// Whether cognitive capacity is below the amplification trigger
    /// (strict: `H_cognitive = 0.3` does not amplify).
    pub fn is_amplified(&self) -> bool {
        self.h_cognitive < AMPLIFICATION_H_COGNITIVE
    }

    /// Bias after somatic/cognitive amplification, in [0, 1].
    ///
    /// Active only below the trigger:
    /// `min(B * (H_somatic / H_cognitive) * (1 - S), 1)`.
    /// A zero cognitive capacity saturates to 1.0 rather than dividing.
    pub fn amplified_bias(&self) -> f64 {
        if !self.is_amplified() {
            return self.b;
        }
        if self.h_cognitive < EPSILON {
            // Saturates only when something is being amplified.
            let numerator = self.b * self.h_somatic * (1.0 - self.s);
            return if numerator > 0.0 { 1.0 } else { 0.0 };
        }
        let amplification = (self.h_somatic / self.h_cognitive) * (1.0 - self.s);
        (self.b * amplification).min(1.0)
    }

    /// Collapse to the minimal shape: `H = min(H_somatic, H_cognitive)`,
    /// `B = amplified_bias`.
    pub fn reduced(&self) -> MinimalState {
        MinimalState {
            s: self.s,
            h: self.h_somatic.min(self.h_cognitive),
            b: self.amplified_bias(),
        }
    }
}

impl Default for RefinedState {
    fn default() -> Self {
        Self {
            s: 0.5,
            h_somatic: 0.8,
            h_cognitive: 0.6,
            b: 0.4,
        }
    }
}

impl StateRecord for RefinedState {
    const SHAPE: StateShape = StateShape::Refined;

    fn index() -> &'static VariableIndex {
        static INDEX: OnceLock<VariableIndex> = OnceLock::new();
        INDEX.get_or_init(|| VariableIndex::new(&["S", "H_somatic", "H_cognitive", "B"]))
    }

    fn to_values(&self) -> Vec<f64> {
        Self::index()
            .names()
            .iter()
            .map(|name| match *name {
                "S" => self.s,
                "H_somatic" => self.h_somatic,
                "H_cognitive" => self.h_cognitive,
                _ => self.b,
            })
            .collect()
    }

    fn from_values(values: &[f64]) -> Result<Self> {
        let index = Self::index();
        let v = index.validate(values)?;
        let at = |name: &str| index.ordinal(name).map(|i| v[i]).unwrap_or_default();
        Ok(Self {
            s: at("S"),
            h_somatic: at("H_somatic"),
            h_cognitive: at("H_cognitive"),
            b: at("B"),
        })
    }
}

impl TryFrom<BTreeMap<String, f64>> for RefinedState {
    type Error = ModelError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        Self::from_map(&map)
    }
}

impl From<RefinedState> for BTreeMap<String, f64> {
    fn from(state: RefinedState) -> Self {
        state.to_map()
    }
}
