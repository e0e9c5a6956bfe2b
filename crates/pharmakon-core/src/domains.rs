//! Multi-domain state: five fixed domain groups plus free-standing scalars,
//! flattened into one deterministic key space.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::state::{StateRecord, StateShape, VariableIndex, checked_unit};

/// Declares a domain group: a plain struct of raw slider inputs with
/// documented defaults, serialized under the variable names.
macro_rules! sliders {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $key:literal = $default:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct $name {
            $( $(#[$fmeta])* #[serde(rename = $key)] pub $field: f64, )+
        }

        impl Default for $name {
            fn default() -> Self {
                Self { $( $field: $default, )+ }
            }
        }

        impl $name {
            /// Variable names in declaration order.
            pub const NAMES: &'static [&'static str] = &[ $( $key ),+ ];

            /// (name, value) pairs in declaration order.
            pub fn entries(&self) -> Vec<(&'static str, f64)> {
                vec![ $( ($key, self.$field) ),+ ]
            }

            pub fn get(&self, name: &str) -> Option<f64> {
                match name {
                    $( $key => Some(self.$field), )+
                    _ => None,
                }
            }

            fn set(&mut self, name: &str, value: f64) -> bool {
                match name {
                    $( $key => { self.$field = value; true } )+
                    _ => false,
                }
            }

            /// Copy with every field clamped into [0, 1].
            pub fn validated(&self) -> Result<Self> {
                Ok(Self { $( $field: checked_unit($key, self.$field)?, )+ })
            }
        }
    };
}

sliders! {
    /// Physiological / somatic variables.
    BodySliders {
        /// Acute fight-or-flight activation.
        sympathetic_surge: "Sympathetic_Surge" = 0.0,
        /// Tonic muscle tension.
        motor_rigidity: "Motor_Rigidity" = 0.0,
        thermal_overload: "Thermal_Overload" = 0.0,
        cortisol: "Cortisol" = 0.0,
        heart_rate: "Heart_Rate" = 0.5,
    }
}

sliders! {
    /// Primary emotions.
    AffectSliders {
        fear: "Fear" = 0.0,
        joy: "Joy" = 0.0,
        love: "Love" = 0.0,
        gratitude: "Gratitude" = 0.0,
        contentment: "Contentment" = 0.0,
        hope: "Hope" = 0.0,
        sadness: "Sadness" = 0.0,
        anger: "Anger" = 0.0,
    }
}

sliders! {
    /// Higher-order cognitive processing.
    CognitiveSliders {
        /// Rumination intensity.
        recursive_overthinking: "Recursive_Overthinking" = 0.0,
        metaphoric_fusion: "Metaphoric_Fusion" = 0.0,
        /// Reality-testing capacity.
        lucidity: "Lucidity" = 1.0,
        /// Self-coherence instability.
        ego_oscillation: "Ego_Oscillation" = 0.0,
        meta_cognition: "Meta_Cognition" = 0.5,
    }
}

sliders! {
    /// Cognitive bias parameters.
    BiasSliders {
        confirmation: "Confirmation" = 0.4,
        dunning_kruger: "Dunning_Kruger" = 0.3,
        overconfidence: "Overconfidence" = 0.3,
        negativity: "Negativity" = 0.4,
        hindsight: "Hindsight" = 0.4,
        availability: "Availability" = 0.5,
    }
}

sliders! {
    /// Life-story coherence and identity continuity.
    NarrativeSliders {
        coherence: "Coherence" = 0.7,
        continuity: "Continuity" = 0.7,
        arc: "Arc" = 0.5,
        /// "Main character" feeling.
        protagonist: "Protagonist" = 0.6,
        meaning: "Meaning" = 0.5,
    }
}

sliders! {
    /// Scalars that belong to no domain group.
    ExtraScalars {
        delusionality: "Delusionality" = 0.0,
        dogma_fixation: "Dogma_Fixation" = 0.0,
    }
}

/// The named sub-groups of a [`MultiDomainState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Domain {
    Body,
    Affect,
    Cognitive,
    Bias,
    Narrative,
    Extra,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Body,
        Domain::Affect,
        Domain::Cognitive,
        Domain::Bias,
        Domain::Narrative,
        Domain::Extra,
    ];

    pub fn names(self) -> &'static [&'static str] {
        match self {
            Domain::Body => BodySliders::NAMES,
            Domain::Affect => AffectSliders::NAMES,
            Domain::Cognitive => CognitiveSliders::NAMES,
            Domain::Bias => BiasSliders::NAMES,
            Domain::Narrative => NarrativeSliders::NAMES,
            Domain::Extra => ExtraScalars::NAMES,
        }
    }

    /// Which group a variable name belongs to.
    pub fn of(name: &str) -> Option<Domain> {
        Domain::ALL
            .into_iter()
            .find(|d| d.names().iter().any(|n| *n == name))
    }
}

/// Full multi-domain state. Immutable once built; every value in [0, 1].
///
/// Flattened iteration and the value vector follow [`VariableIndex`] order
/// (lexicographic by variable name).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, f64>",
    into = "BTreeMap<String, f64>"
)]
pub struct MultiDomainState {
    body: BodySliders,
    affect: AffectSliders,
    cognitive: CognitiveSliders,
    bias: BiasSliders,
    narrative: NarrativeSliders,
    extras: ExtraScalars,
}

impl MultiDomainState {
    pub fn new(
        body: BodySliders,
        affect: AffectSliders,
        cognitive: CognitiveSliders,
        bias: BiasSliders,
        narrative: NarrativeSliders,
        extras: ExtraScalars,
    ) -> Result<Self> {
        Ok(Self {
            body: body.validated()?,
            affect: affect.validated()?,
            cognitive: cognitive.validated()?,
            bias: bias.validated()?,
            narrative: narrative.validated()?,
            extras: extras.validated()?,
        })
    }

    pub fn builder() -> MultiDomainBuilder {
        MultiDomainBuilder::default()
    }

    pub fn body(&self) -> &BodySliders {
        &self.body
    }

    pub fn affect(&self) -> &AffectSliders {
        &self.affect
    }

    pub fn cognitive(&self) -> &CognitiveSliders {
        &self.cognitive
    }

    pub fn bias(&self) -> &BiasSliders {
        &self.bias
    }

    pub fn narrative(&self) -> &NarrativeSliders {
        &self.narrative
    }

    pub fn extras(&self) -> &ExtraScalars {
        &self.extras
    }

    pub fn delusionality(&self) -> f64 {
        self.extras.delusionality
    }

    pub fn dogma_fixation(&self) -> f64 {
        self.extras.dogma_fixation
    }

    /// Look up any variable by name.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.body
            .get(name)
            .or_else(|| self.affect.get(name))
            .or_else(|| self.cognitive.get(name))
            .or_else(|| self.bias.get(name))
            .or_else(|| self.narrative.get(name))
            .or_else(|| self.extras.get(name))
    }

    /// (name, value) pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        Self::index()
            .names()
            .iter()
            .map(|n| (*n, self.value(n).unwrap_or_default()))
    }

    fn set_raw(&mut self, name: &str, value: f64) -> bool {
        self.body.set(name, value)
            || self.affect.set(name, value)
            || self.cognitive.set(name, value)
            || self.bias.set(name, value)
            || self.narrative.set(name, value)
            || self.extras.set(name, value)
    }
}

impl StateRecord for MultiDomainState {
    const SHAPE: StateShape = StateShape::MultiDomain;

    fn index() -> &'static VariableIndex {
        static INDEX: OnceLock<VariableIndex> = OnceLock::new();
        INDEX.get_or_init(|| {
            let names: Vec<&'static str> = Domain::ALL
                .into_iter()
                .flat_map(|d| d.names().iter().copied())
                .collect();
            VariableIndex::new(&names)
        })
    }

    fn to_values(&self) -> Vec<f64> {
        self.iter().map(|(_, v)| v).collect()
    }

    fn from_values(values: &[f64]) -> Result<Self> {
        let index = Self::index();
        let values = index.validate(values)?;
        let mut state = Self::default();
        for (name, v) in index.names().iter().zip(values) {
            state.set_raw(name, v);
        }
        Ok(state)
    }

    fn get(&self, name: &str) -> Option<f64> {
        self.value(name)
    }
}

impl TryFrom<BTreeMap<String, f64>> for MultiDomainState {
    type Error = ModelError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        Self::from_map(&map)
    }
}

impl From<MultiDomainState> for BTreeMap<String, f64> {
    fn from(state: MultiDomainState) -> Self {
        state.to_map()
    }
}

/// Assembles a [`MultiDomainState`] group by group or variable by variable.
/// Validation happens once, in [`MultiDomainBuilder::build`].
#[derive(Clone, Debug, Default)]
pub struct MultiDomainBuilder {
    raw: MultiDomainState,
    unknown: Option<String>,
}

impl MultiDomainBuilder {
    pub fn body(mut self, body: BodySliders) -> Self {
        self.raw.body = body;
        self
    }

    pub fn affect(mut self, affect: AffectSliders) -> Self {
        self.raw.affect = affect;
        self
    }

    pub fn cognitive(mut self, cognitive: CognitiveSliders) -> Self {
        self.raw.cognitive = cognitive;
        self
    }

    pub fn bias(mut self, bias: BiasSliders) -> Self {
        self.raw.bias = bias;
        self
    }

    pub fn narrative(mut self, narrative: NarrativeSliders) -> Self {
        self.raw.narrative = narrative;
        self
    }

    pub fn delusionality(mut self, v: f64) -> Self {
        self.raw.extras.delusionality = v;
        self
    }

    pub fn dogma_fixation(mut self, v: f64) -> Self {
        self.raw.extras.dogma_fixation = v;
        self
    }

    /// Set a single variable by name. Unknown names fail at `build`.
    pub fn set(mut self, name: &str, value: f64) -> Self {
        if !self.raw.set_raw(name, value) && self.unknown.is_none() {
            self.unknown = Some(name.to_string());
        }
        self
    }

    pub fn build(self) -> Result<MultiDomainState> {
        if let Some(name) = self.unknown {
            return Err(ModelError::UnknownVariable(name));
        }
        let r = self.raw;
        MultiDomainState::new(r.body, r.affect, r.cognitive, r.bias, r.narrative, r.extras)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_set_is_union_of_domains() {
        let index = MultiDomainState::index();
        assert_eq!(index.len(), 31);
        for d in Domain::ALL {
            for name in d.names() {
                assert!(index.ordinal(name).is_some(), "missing {name}");
                assert_eq!(Domain::of(name), Some(d));
            }
        }
    }

    #[test]
    fn test_index_sorted_and_stable() {
        let names = MultiDomainState::index().names();
        let mut sorted = names.to_vec();
        sorted.sort_unstable();
        assert_eq!(names, sorted.as_slice());
        assert_eq!(names[0], "Anger");
        // Same ordinal every time
        let a = MultiDomainState::index().ordinal("Fear");
        let b = MultiDomainState::index().ordinal("Fear");
        assert_eq!(a, b);
    }

    #[test]
    fn test_defaults_are_documented_values() {
        let st = MultiDomainState::default();
        assert_eq!(st.value("Heart_Rate"), Some(0.5));
        assert_eq!(st.value("Lucidity"), Some(1.0));
        assert_eq!(st.value("Meta_Cognition"), Some(0.5));
        assert_eq!(st.value("Confirmation"), Some(0.4));
        assert_eq!(st.value("Coherence"), Some(0.7));
        assert_eq!(st.value("Protagonist"), Some(0.6));
        assert_eq!(st.delusionality(), 0.0);
    }

    #[test]
    fn test_defaults_are_not_shared() {
        let mut a = BodySliders::default();
        a.cortisol = 0.9;
        assert_ne!(a, BodySliders::default());
        assert_eq!(BodySliders::default().cortisol, 0.0);
    }

    #[test]
    fn test_builder_clamps_and_rejects() {
        let st = MultiDomainState::builder()
            .set("Fear", 1.4)
            .set("Joy", -0.2)
            .delusionality(0.3)
            .build()
            .unwrap();
        assert_eq!(st.affect().fear, 1.0);
        assert_eq!(st.affect().joy, 0.0);
        assert_eq!(st.delusionality(), 0.3);

        let err = MultiDomainState::builder().set("Nope", 0.1).build().unwrap_err();
        assert_eq!(err, ModelError::UnknownVariable("Nope".to_string()));

        let err = MultiDomainState::builder()
            .set("Cortisol", f64::NAN)
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelError::NonFinite { .. }));
    }

    #[test]
    fn test_values_roundtrip_through_index() {
        let st = MultiDomainState::builder()
            .set("Fear", 0.8)
            .set("Arc", 0.3)
            .build()
            .unwrap();
        let values = st.to_values();
        let fear = MultiDomainState::index().ordinal("Fear").unwrap();
        assert_eq!(values[fear], 0.8);
        assert_eq!(MultiDomainState::from_values(&values).unwrap(), st);
    }

    #[test]
    fn test_iter_matches_index() {
        let st = MultiDomainState::default();
        let names: Vec<&str> = st.iter().map(|(n, _)| n).collect();
        assert_eq!(names, MultiDomainState::index().names());
    }

    #[test]
    fn test_serde_flat_map() {
        let json = r#"{"Fear": 0.75, "Delusionality": 0.1}"#;
        let st: MultiDomainState = serde_json::from_str(json).unwrap();
        assert_eq!(st.affect().fear, 0.75);
        assert_eq!(st.cognitive().lucidity, 1.0);

        let out = serde_json::to_value(&st).unwrap();
        assert_eq!(out.as_object().unwrap().len(), 31);
    }

    #[test]
    fn test_domain_sliders_deserialize_with_defaults() {
        let body: BodySliders = serde_json::from_str(r#"{"Cortisol": 0.6}"#).unwrap();
        assert_eq!(body.cortisol, 0.6);
        assert_eq!(body.heart_rate, 0.5);
    }
}
