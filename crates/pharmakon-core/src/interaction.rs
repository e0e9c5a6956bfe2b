//! Nonlinear interaction metrics over the minimal and refined shapes.
//!
//! All metrics are total: a metric whose trigger condition does not hold is
//! reported as 0.0, so every key is always present.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{BIAS_MEANINGLESS_S, DELUSIONAL_DEFENSE_B};
use crate::state::{MinimalState, RefinedState};

/// Interaction metrics of a minimal state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interactions {
    /// `1 - H`
    #[serde(rename = "Energy_Stress")]
    pub energy_stress: f64,
    /// `S × B`: confident and wrong.
    #[serde(rename = "Arrogance_Risk")]
    pub arrogance_risk: f64,
    /// `S × H × (1 - B)`
    #[serde(rename = "Stability")]
    pub stability: f64,
    /// `1 - S` below the identity floor, else 0.
    #[serde(rename = "Bias_Meaningless")]
    pub bias_meaningless: f64,
    /// `B × S` above the delusion bias line, else 0.
    #[serde(rename = "Delusional_Defense")]
    pub delusional_defense: f64,
}

impl Interactions {
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("Energy_Stress", self.energy_stress),
            ("Arrogance_Risk", self.arrogance_risk),
            ("Stability", self.stability),
            ("Bias_Meaningless", self.bias_meaningless),
            ("Delusional_Defense", self.delusional_defense),
        ])
    }
}

/// Interaction metrics of a refined state, plus the two derived quantities
/// that feed them.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RefinedInteractions {
    #[serde(flatten)]
    pub base: Interactions,
    #[serde(rename = "Energy_Mismatch")]
    pub energy_mismatch: f64,
    #[serde(rename = "Amplified_Bias")]
    pub amplified_bias: f64,
}

impl RefinedInteractions {
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        let mut map = self.base.to_map();
        map.insert("Energy_Mismatch", self.energy_mismatch);
        map.insert("Amplified_Bias", self.amplified_bias);
        map
    }
}

pub fn compute_interactions(state: &MinimalState) -> Interactions {
    let (s, h, b) = (state.s(), state.h(), state.b());

    let bias_meaningless = if s < BIAS_MEANINGLESS_S { 1.0 - s } else { 0.0 };
    let delusional_defense = if b > DELUSIONAL_DEFENSE_B { b * s } else { 0.0 };

    Interactions {
        energy_stress: 1.0 - h,
        arrogance_risk: s * b,
        stability: s * h * (1.0 - b),
        bias_meaningless,
        delusional_defense,
    }
}

/// Minimal metrics on the reduced state (`H = min(H_somatic, H_cognitive)`,
/// `B = amplified bias`), except `Energy_Stress`, which reads `1 - H_somatic`.
pub fn compute_refined_interactions(state: &RefinedState) -> RefinedInteractions {
    let reduced = state.reduced();
    let mut base = compute_interactions(&reduced);
    base.energy_stress = 1.0 - state.h_somatic();

    RefinedInteractions {
        base,
        energy_mismatch: state.energy_mismatch(),
        amplified_bias: reduced.b(),
    }
}
