//! Weighted composites over named variables, and the boolean risk flags
//! built on top of them.
//!
//! A composite is a fixed non-negative weighted sum. Terms are summed in
//! declared order with no renormalisation, so results are reproducible to the
//! bit for a given weight table.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::WEIGHT_SUM_RTOL;
use crate::domains::MultiDomainState;
use crate::error::{ModelError, Result};
use crate::state::StateRecord;

/// The fixed set of composites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composite {
    Stress,
    Positive,
    BiasCascade,
}

impl Composite {
    pub const ALL: [Composite; 3] = [Composite::Stress, Composite::Positive, Composite::BiasCascade];

    pub fn as_str(self) -> &'static str {
        match self {
            Composite::Stress => "stress",
            Composite::Positive => "positive",
            Composite::BiasCascade => "bias_cascade",
        }
    }
}

impl fmt::Display for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered (variable, weight) terms of one composite.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightVector {
    terms: Vec<(String, f64)>,
}

impl WeightVector {
    /// Weights must be finite and non-negative; names must be unique.
    pub fn new(terms: Vec<(String, f64)>) -> Result<Self> {
        for (i, (name, w)) in terms.iter().enumerate() {
            if !w.is_finite() || *w < 0.0 {
                return Err(ModelError::InvalidWeights(format!(
                    "weight for {name} must be finite and non-negative, got {w}"
                )));
            }
            if terms[..i].iter().any(|(other, _)| other == name) {
                return Err(ModelError::InvalidWeights(format!("duplicate term {name}")));
            }
        }
        Ok(Self { terms })
    }

    fn from_static(terms: &[(&str, f64)]) -> Self {
        Self {
            terms: terms.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
        }
    }

    pub fn terms(&self) -> &[(String, f64)] {
        &self.terms
    }

    /// Sum of weights: the upper bound of the composite for inputs in [0, 1].
    pub fn total(&self) -> f64 {
        self.terms.iter().map(|(_, w)| w).sum()
    }

    /// Weighted sum; names the lookup does not know contribute 0.
    pub fn evaluate(&self, lookup: impl Fn(&str) -> Option<f64>) -> f64 {
        self.terms
            .iter()
            .map(|(name, w)| lookup(name).unwrap_or(0.0) * w)
            .sum()
    }
}

impl Serialize for WeightVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.terms.len()))?;
        for (name, w) in &self.terms {
            map.serialize_entry(name, w)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WeightVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct TermsVisitor;

        impl<'de> Visitor<'de> for TermsVisitor {
            type Value = Vec<(String, f64)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of variable name to weight")
            }

            // Keeps document order so summation order matches the file.
            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut terms = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, w)) = access.next_entry::<String, f64>()? {
                    terms.push((name, w));
                }
                Ok(terms)
            }
        }

        let terms = deserializer.deserialize_map(TermsVisitor)?;
        WeightVector::new(terms).map_err(de::Error::custom)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawWeights {
    stress: WeightVector,
    positive: WeightVector,
    bias_cascade: WeightVector,
}

/// The three composite weight tables.
///
/// Each table must name only multi-domain variables and sum to 1.0 within a
/// relative tolerance of 1e-3.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWeights")]
pub struct CompositeWeights {
    stress: WeightVector,
    positive: WeightVector,
    bias_cascade: WeightVector,
}

impl CompositeWeights {
    pub fn new(
        stress: WeightVector,
        positive: WeightVector,
        bias_cascade: WeightVector,
    ) -> Result<Self> {
        let weights = Self {
            stress,
            positive,
            bias_cascade,
        };
        for composite in Composite::ALL {
            let vector = weights.get(composite);
            let sum = vector.total();
            if (sum - 1.0).abs() > WEIGHT_SUM_RTOL * sum.abs().max(1.0) {
                return Err(ModelError::InvalidWeights(format!(
                    "weights for {composite} sum to {sum}, expected 1.0"
                )));
            }
            let index = MultiDomainState::index();
            if let Some((name, _)) = vector.terms().iter().find(|(n, _)| index.ordinal(n).is_none()) {
                return Err(ModelError::InvalidWeights(format!(
                    "{composite} references unknown variable {name}"
                )));
            }
        }
        Ok(weights)
    }

    /// Parse a weights file in the legacy layout:
    /// `{"stress": {"Fear": 0.3, ...}, "positive": {...}, "bias_cascade": {...}}`.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Shared instance of the built-in tables.
    pub fn builtin() -> &'static CompositeWeights {
        static BUILTIN: OnceLock<CompositeWeights> = OnceLock::new();
        BUILTIN.get_or_init(CompositeWeights::default)
    }

    pub fn get(&self, composite: Composite) -> &WeightVector {
        match composite {
            Composite::Stress => &self.stress,
            Composite::Positive => &self.positive,
            Composite::BiasCascade => &self.bias_cascade,
        }
    }

    pub fn evaluate(&self, composite: Composite, state: &MultiDomainState) -> f64 {
        self.get(composite).evaluate(|name| state.value(name))
    }

    /// Every composite for one state.
    pub fn evaluate_all(&self, state: &MultiDomainState) -> BTreeMap<Composite, f64> {
        Composite::ALL
            .into_iter()
            .map(|c| (c, self.evaluate(c, state)))
            .collect()
    }
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            stress: WeightVector::from_static(&[
                ("Fear", 0.30),
                ("Anger", 0.20),
                ("Cortisol", 0.25),
                ("Sympathetic_Surge", 0.25),
            ]),
            positive: WeightVector::from_static(&[
                ("Joy", 0.30),
                ("Love", 0.20),
                ("Gratitude", 0.20),
                ("Contentment", 0.15),
                ("Hope", 0.15),
            ]),
            bias_cascade: WeightVector::from_static(&[
                ("Confirmation", 0.35),
                ("Dunning_Kruger", 0.30),
                ("Overconfidence", 0.25),
                ("Hindsight", 0.10),
            ]),
        }
    }
}

impl TryFrom<RawWeights> for CompositeWeights {
    type Error = ModelError;

    fn try_from(raw: RawWeights) -> Result<Self> {
        Self::new(raw.stress, raw.positive, raw.bias_cascade)
    }
}

/// Composite with the built-in weights.
pub fn compute_composite(composite: Composite, state: &MultiDomainState) -> f64 {
    CompositeWeights::builtin().evaluate(composite, state)
}

/// `1 - (0.4·Coherence + 0.3·Continuity + 0.3·Arc)`.
pub fn narrative_risk(state: &MultiDomainState) -> f64 {
    let n = state.narrative();
    1.0 - (0.4 * n.coherence + 0.3 * n.continuity + 0.3 * n.arc)
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Thresholds for pattern detection. All comparisons are strict `>`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlagThresholds {
    pub bias_cluster: f64,
    pub delusionality: f64,
    pub ego_osc: f64,
    pub overthink: f64,
    pub dogma: f64,
    pub protagonist: f64,
    pub narrative_collapse: f64,
}

impl Default for FlagThresholds {
    fn default() -> Self {
        Self {
            bias_cluster: 0.6,
            delusionality: 0.4,
            ego_osc: 0.6,
            overthink: 0.7,
            dogma: 0.7,
            protagonist: 0.7,
            narrative_collapse: 0.7,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Flag {
    #[serde(rename = "Bias_Cascade")]
    BiasCascade,
    #[serde(rename = "Narrative_Collapse")]
    NarrativeCollapse,
    #[serde(rename = "Moral_Rigidity")]
    MoralRigidity,
    #[serde(rename = "Ego_Instability")]
    EgoInstability,
    #[serde(rename = "Recursive_Rumination")]
    RecursiveRumination,
}

impl Flag {
    pub const ALL: [Flag; 5] = [
        Flag::BiasCascade,
        Flag::NarrativeCollapse,
        Flag::MoralRigidity,
        Flag::EgoInstability,
        Flag::RecursiveRumination,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Flag::BiasCascade => "Bias_Cascade",
            Flag::NarrativeCollapse => "Narrative_Collapse",
            Flag::MoralRigidity => "Moral_Rigidity",
            Flag::EgoInstability => "Ego_Instability",
            Flag::RecursiveRumination => "Recursive_Rumination",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one flag pass. Recomputed from scratch on every call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub bias_cascade: bool,
    pub narrative_collapse: bool,
    pub moral_rigidity: bool,
    pub ego_instability: bool,
    pub recursive_rumination: bool,
}

impl Flags {
    pub fn is_raised(&self, flag: Flag) -> bool {
        match flag {
            Flag::BiasCascade => self.bias_cascade,
            Flag::NarrativeCollapse => self.narrative_collapse,
            Flag::MoralRigidity => self.moral_rigidity,
            Flag::EgoInstability => self.ego_instability,
            Flag::RecursiveRumination => self.recursive_rumination,
        }
    }

    /// Every flag with its status, in fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (Flag, bool)> + '_ {
        Flag::ALL.into_iter().map(|f| (f, self.is_raised(f)))
    }

    pub fn raised(&self) -> Vec<Flag> {
        self.iter().filter(|(_, on)| *on).map(|(f, _)| f).collect()
    }

    pub fn any(&self) -> bool {
        self.iter().any(|(_, on)| on)
    }
}

pub fn detect_flags(
    state: &MultiDomainState,
    weights: &CompositeWeights,
    thresholds: &FlagThresholds,
) -> Flags {
    let bias_cluster = weights.evaluate(Composite::BiasCascade, state);
    let cognitive = state.cognitive();

    Flags {
        bias_cascade: bias_cluster > thresholds.bias_cluster
            && state.delusionality() > thresholds.delusionality,
        narrative_collapse: narrative_risk(state) > thresholds.narrative_collapse,
        moral_rigidity: state.dogma_fixation() > thresholds.dogma
            && state.narrative().protagonist > thresholds.protagonist,
        ego_instability: cognitive.ego_oscillation > thresholds.ego_osc,
        recursive_rumination: cognitive.recursive_overthinking > thresholds.overthink,
    }
}
