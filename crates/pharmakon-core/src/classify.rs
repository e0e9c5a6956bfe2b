//! Ordered threshold rules mapping a minimal or refined state to an epistemic
//! position. First match wins; every input gets a label.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ARROGANCE_B, COGNITIVE_COLLAPSE_H, COMPETENCE_B, DELUSIONAL_B, EGO_DISSOLUTION_S,
    ENERGY_COLLAPSE_H, HIGH_H, HIGH_S, META_AWARENESS_B, META_AWARENESS_S, STRESS_MISMATCH,
};
use crate::state::{MinimalState, RefinedState};

/// The closed set of position labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "Ego_Dissolution")]
    EgoDissolution,
    #[serde(rename = "Energy_Collapse")]
    EnergyCollapse,
    #[serde(rename = "Delusional_Defense")]
    DelusionalDefense,
    #[serde(rename = "Position_1_Epistemic_Arrogance")]
    EpistemicArrogance,
    #[serde(rename = "Position_2_Meta_Awareness_Trap")]
    MetaAwarenessTrap,
    #[serde(rename = "Position_3_Integrated_Competence")]
    IntegratedCompetence,
    #[serde(rename = "Transitional_State")]
    Transitional,
    #[serde(rename = "Cognitive_Collapse")]
    CognitiveCollapse,
    #[serde(rename = "Stress_Amplification")]
    StressAmplification,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Position::EgoDissolution => "Ego_Dissolution",
            Position::EnergyCollapse => "Energy_Collapse",
            Position::DelusionalDefense => "Delusional_Defense",
            Position::EpistemicArrogance => "Position_1_Epistemic_Arrogance",
            Position::MetaAwarenessTrap => "Position_2_Meta_Awareness_Trap",
            Position::IntegratedCompetence => "Position_3_Integrated_Competence",
            Position::Transitional => "Transitional_State",
            Position::CognitiveCollapse => "Cognitive_Collapse",
            Position::StressAmplification => "Stress_Amplification",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A label plus its human-readable explanation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub position: Position,
    pub description: String,
}

/// Rules 1-7 on (S, H, B). Shared by both classifiers.
fn minimal_rule(s: f64, h: f64, b: f64) -> Position {
    if s < EGO_DISSOLUTION_S {
        Position::EgoDissolution
    } else if h < ENERGY_COLLAPSE_H {
        Position::EnergyCollapse
    } else if b > DELUSIONAL_B {
        Position::DelusionalDefense
    } else if s > HIGH_S && h > HIGH_H && b > ARROGANCE_B {
        Position::EpistemicArrogance
    } else if s > HIGH_S && h > HIGH_H && b < COMPETENCE_B {
        Position::IntegratedCompetence
    } else if s > META_AWARENESS_S && b > META_AWARENESS_B.0 && b < META_AWARENESS_B.1 {
        Position::MetaAwarenessTrap
    } else {
        Position::Transitional
    }
}

fn describe(position: Position, s: f64, h: f64, b: f64) -> String {
    match position {
        Position::EgoDissolution => {
            "S → 0: identity dissolution. Bias is meaningless with no self to be biased.".into()
        }
        Position::EnergyCollapse => format!(
            "H → 0: energy depleted (H={h:.2}). Arrogance and competence both collapse under stress."
        ),
        Position::DelusionalDefense => format!(
            "B → 1: severe bias (B={b:.2}). The self (S={s:.2}) now defends a false model of reality."
        ),
        Position::EpistemicArrogance => format!(
            "Strong identity + high energy + high bias (B={b:.2}). Confident but wrong."
        ),
        Position::IntegratedCompetence => format!(
            "Strong identity + high energy + low bias (B={b:.2}). Calibrated awareness."
        ),
        Position::MetaAwarenessTrap => format!(
            "Strong identity + moderate bias (B={b:.2}). Aware of biases but struggling to manage them."
        ),
        Position::Transitional => format!(
            "Mixed profile: S={s:.2}, H={h:.2}, B={b:.2}. Position unclear, may be in transition."
        ),
        // Refined-only labels are described by the refined classifier.
        Position::CognitiveCollapse | Position::StressAmplification => String::new(),
    }
}

pub fn classify_position(state: &MinimalState) -> Classification {
    let (s, h, b) = (state.s(), state.h(), state.b());
    let position = minimal_rule(s, h, b);
    Classification {
        position,
        description: describe(position, s, h, b),
    }
}

/// Cognitive collapse and stress amplification first, then the minimal rules
/// on `(S, min(H_somatic, H_cognitive), amplified bias)`.
pub fn classify_refined_position(state: &RefinedState) -> Classification {
    let hs = state.h_somatic();
    let hc = state.h_cognitive();
    let amplified = state.amplified_bias();

    if hc < COGNITIVE_COLLAPSE_H {
        return Classification {
            position: Position::CognitiveCollapse,
            description: format!(
                "H_cognitive → 0: executive function collapsed. Bias amplified to {amplified:.2}. \
                 Physical arousal ({hs:.2}) outpacing cognition."
            ),
        };
    }

    if state.energy_mismatch() > STRESS_MISMATCH {
        return Classification {
            position: Position::StressAmplification,
            description: format!(
                "H_somatic ({hs:.2}) >> H_cognitive ({hc:.2}): physical arousal outpaces cognition. \
                 Bias amplified to {amplified:.2}."
            ),
        };
    }

    let reduced = state.reduced();
    let (s, h, b) = (reduced.s(), reduced.h(), reduced.b());
    let position = minimal_rule(s, h, b);
    let description = match position {
        Position::Transitional => format!(
            "Mixed profile: S={s:.2}, H_somatic={hs:.2}, H_cognitive={hc:.2}, B_amplified={b:.2}."
        ),
        _ => describe(position, s, h, b),
    };
    Classification {
        position,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn label(s: f64, h: f64, b: f64) -> Position {
        classify_position(&MinimalState::new(s, h, b).unwrap()).position
    }

    fn refined_label(s: f64, hs: f64, hc: f64, b: f64) -> Position {
        classify_refined_position(&RefinedState::new(s, hs, hc, b).unwrap()).position
    }

    #[test]
    fn test_confident_and_wrong_worked_example() {
        // The worked example labels (0.85, 0.75, 0.85) as position 1, but
        // B > 0.8 fires rule 3 first.
        assert_eq!(label(0.85, 0.75, 0.85), Position::DelusionalDefense);
        assert_ne!(label(0.85, 0.75, 0.85), Position::EpistemicArrogance);
        assert_eq!(label(0.85, 0.75, 0.8), Position::EpistemicArrogance);
    }

    #[test]
    fn test_ego_dissolution_precedes_everything() {
        assert_eq!(label(0.1, 0.9, 0.9), Position::EgoDissolution);
        assert_eq!(label(0.1, 0.1, 0.9), Position::EgoDissolution);
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(label(0.5, 0.1, 0.9), Position::EnergyCollapse);
        assert_eq!(label(0.5, 0.5, 0.9), Position::DelusionalDefense);
        assert_eq!(label(0.8, 0.9, 0.2), Position::IntegratedCompetence);
        assert_eq!(label(0.6, 0.5, 0.5), Position::MetaAwarenessTrap);
        assert_eq!(label(0.5, 0.8, 0.4), Position::Transitional);
    }

    #[test]
    fn test_boundaries_are_strict() {
        // 0.2
        assert_eq!(label(0.2, 0.9, 0.5), Position::Transitional);
        assert_eq!(label(0.19, 0.9, 0.5), Position::EgoDissolution);
        assert_eq!(label(0.5, 0.2, 0.1), Position::Transitional);
        assert_eq!(label(0.5, 0.19, 0.1), Position::EnergyCollapse);
        // 0.8
        assert_eq!(label(0.5, 0.5, 0.8), Position::Transitional);
        assert_eq!(label(0.5, 0.5, 0.81), Position::DelusionalDefense);
        // 0.7 on S
        assert_eq!(label(0.7, 0.9, 0.65), Position::MetaAwarenessTrap);
        assert_eq!(label(0.71, 0.9, 0.65), Position::EpistemicArrogance);
        // 0.6 on H and B
        assert_eq!(label(0.8, 0.6, 0.65), Position::MetaAwarenessTrap);
        assert_eq!(label(0.8, 0.9, 0.6), Position::MetaAwarenessTrap);
        // 0.4 on B
        assert_eq!(label(0.8, 0.9, 0.4), Position::Transitional);
        assert_eq!(label(0.8, 0.9, 0.39), Position::IntegratedCompetence);
        // 0.5 on S
        assert_eq!(label(0.5, 0.5, 0.5), Position::Transitional);
        assert_eq!(label(0.51, 0.5, 0.5), Position::MetaAwarenessTrap);
        // 0.7 on B, upper edge of the trap band
        assert_eq!(label(0.8, 0.5, 0.7), Position::Transitional);
        assert_eq!(label(0.8, 0.5, 0.69), Position::MetaAwarenessTrap);
    }

    #[test]
    fn test_descriptions_interpolate_values() {
        let c = classify_position(&MinimalState::new(0.5, 0.8, 0.4).unwrap());
        assert!(c.description.contains("S=0.50"));
        assert!(c.description.contains("B=0.40"));
    }

    #[test]
    fn test_refined_cognitive_collapse_first() {
        assert_eq!(refined_label(0.7, 0.6, 0.1, 0.5), Position::CognitiveCollapse);
        // Even with S below the dissolution line
        assert_eq!(refined_label(0.1, 0.6, 0.1, 0.5), Position::CognitiveCollapse);
        // 0.2 is not collapsed
        assert_ne!(refined_label(0.7, 0.6, 0.2, 0.5), Position::CognitiveCollapse);
    }

    #[test]
    fn test_refined_stress_amplification() {
        let c = classify_refined_position(&RefinedState::new(0.8, 0.9, 0.3, 0.4).unwrap());
        assert_eq!(c.position, Position::StressAmplification);
        assert!(c.description.contains("0.90"));
        assert!(c.description.contains("0.30"));
    }

    #[test]
    fn test_refined_stress_precedes_minimal_rules() {
        // S = 0.1 alone would be ego dissolution.
        assert_eq!(label(0.1, 0.5, 0.5), Position::EgoDissolution);
        assert_eq!(refined_label(0.1, 1.0, 0.5, 0.5), Position::StressAmplification);
    }

    #[test]
    fn test_refined_falls_through_to_reduced_state() {
        // Balanced energies: H = 0.7, B = 0.3
        assert_eq!(
            refined_label(0.8, 0.7, 0.7, 0.3),
            Position::IntegratedCompetence
        );
        // min() picks the weaker energy, so H = 0.5 blocks positions 1 and 3
        assert_eq!(refined_label(0.8, 0.5, 0.9, 0.3), Position::Transitional);
        let c = classify_refined_position(&RefinedState::new(0.8, 0.5, 0.9, 0.3).unwrap());
        assert!(c.description.contains("H_somatic=0.50"));
    }

    #[test]
    fn test_refined_amplified_bias_drives_rules() {
        // Hc = 0.25 amplifies 0.5 by (0.6 / 0.25) * 0.4 = 0.96 → 0.48
        assert_eq!(
            refined_label(0.6, 0.6, 0.25, 0.5),
            Position::MetaAwarenessTrap
        );
    }

    #[test]
    fn test_labels_serialize_as_names() {
        let json = serde_json::to_string(&Position::EpistemicArrogance).unwrap();
        assert_eq!(json, "\"Position_1_Epistemic_Arrogance\"");
        assert_eq!(Position::Transitional.to_string(), "Transitional_State");
    }

    proptest! {
        #[test]
        fn prop_classifier_is_total(s in -1.0f64..2.0, h in -1.0f64..2.0, b in -1.0f64..2.0) {
            let c = classify_position(&MinimalState::new(s, h, b).unwrap());
            prop_assert!(!c.description.is_empty());
            prop_assert!(!matches!(
                c.position,
                Position::CognitiveCollapse | Position::StressAmplification
            ));
        }

        #[test]
        fn prop_low_identity_always_dissolves(s in 0.0f64..0.2, h in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            prop_assert_eq!(
                classify_position(&MinimalState::new(s, h, b).unwrap()).position,
                Position::EgoDissolution
            );
        }
    }
}
