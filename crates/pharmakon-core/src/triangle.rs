//! Multi-domain "triangle" classifier and the debiasing recommender.
//!
//! The three positions are scored as weighted sums of cognitive and bias
//! variables; the highest score wins and every score is returned for audit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::Position;
use crate::composite::{Composite, CompositeWeights, FlagThresholds};
use crate::constants::{BAND_HIGH, BAND_MEDIUM};
use crate::domains::MultiDomainState;

/// Coarse reading of a score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    High,
    Medium,
    Low,
}

impl Band {
    /// High ≥ 0.6, Medium ≥ 0.4, otherwise Low.
    pub fn of(score: f64) -> Band {
        if score >= BAND_HIGH {
            Band::High
        } else if score >= BAND_MEDIUM {
            Band::Medium
        } else {
            Band::Low
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Band::High => "high",
            Band::Medium => "medium",
            Band::Low => "low",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredBand {
    pub score: f64,
    pub band: Band,
}

impl ScoredBand {
    fn new(score: f64) -> Self {
        Self {
            score,
            band: Band::of(score),
        }
    }
}

/// Winning label plus every intermediate score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrianglePosition {
    pub position: Position,
    pub bias_cascade: ScoredBand,
    pub position_1: ScoredBand,
    pub position_2: ScoredBand,
    pub position_3: ScoredBand,
}

impl TrianglePosition {
    /// (label, score) for the three positions, in tie-break order.
    pub fn scores(&self) -> [(Position, f64); 3] {
        [
            (Position::EpistemicArrogance, self.position_1.score),
            (Position::MetaAwarenessTrap, self.position_2.score),
            (Position::IntegratedCompetence, self.position_3.score),
        ]
    }
}

/// Argmax; ties go to the earlier position.
fn highest(p1: f64, p2: f64, p3: f64) -> Position {
    let mut position = Position::EpistemicArrogance;
    let mut best = p1;
    if p2 > best {
        position = Position::MetaAwarenessTrap;
        best = p2;
    }
    if p3 > best {
        position = Position::IntegratedCompetence;
    }
    position
}

pub fn classify_triangle_position(
    state: &MultiDomainState,
    weights: &CompositeWeights,
) -> TrianglePosition {
    let c = state.cognitive();
    let b = state.bias();
    let (dk, oc) = (b.dunning_kruger, b.overconfidence);
    let (mc, lu) = (c.meta_cognition, c.lucidity);
    let (ro, eo) = (c.recursive_overthinking, c.ego_oscillation);
    let bias_cascade = weights.evaluate(Composite::BiasCascade, state);

    // Arrogance: inflated competence, little self-monitoring or reality testing
    let p1 = 0.4 * (dk + oc) / 2.0 + 0.3 * (1.0 - mc) + 0.3 * (1.0 - lu);
    // Trap: aware, but ruminating and still carrying the biases
    let p2 = 0.3 * mc + 0.3 * lu + 0.2 * ro + 0.2 * bias_cascade;
    // Competence: aware and settled
    let p3 = 0.3 * mc + 0.3 * lu + 0.2 * (1.0 - ro) + 0.2 * (1.0 - eo);

    TrianglePosition {
        position: highest(p1, p2, p3),
        bias_cascade: ScoredBand::new(bias_cascade),
        position_1: ScoredBand::new(p1),
        position_2: ScoredBand::new(p2),
        position_3: ScoredBand::new(p3),
    }
}

/// Ordered intervention lines for a triangle position. Labels outside the
/// triangle get only the cross-cutting warning, if any.
pub fn recommend_debiasing(
    position: Position,
    state: &MultiDomainState,
    weights: &CompositeWeights,
    thresholds: &FlagThresholds,
) -> Vec<String> {
    let lines: &[&str] = match position {
        Position::EpistemicArrogance => &[
            "1. Scientific Method Training",
            "   - Focus on base rates and cause-absent evidence",
            "   - Evidence: d ≈ 1.0, lasts 6+ months",
            "   - Target: Build awareness of biases",
            "2. Cognitive Debiasing Training",
            "   - Mnemonics and Bayesian tools",
            "   - Awareness of cognitive pitfalls",
            "   - Evidence: Significant error reduction (p < .001)",
        ],
        Position::MetaAwarenessTrap => &[
            "1. Metacognitive Monitoring Practice",
            "   - Ongoing self-correction exercises",
            "   - Real-life applicability training",
            "   - Evidence: Sustained improvement with practice",
            "2. Reduce Recursive Overthinking",
            "   - Structured problem-solving frameworks",
            "   - Set limits on rumination cycles",
        ],
        Position::IntegratedCompetence => &[
            "1. Maintenance Practice",
            "   - Regular bias calibration exercises",
            "   - Position 3 is unstable: practice prevents regression",
            "2. Monitor Ego Oscillation",
            "   - Maintain stable self-coherence",
            "   - Regular reality-testing check-ins",
        ],
        _ => &[],
    };

    let mut recommendations: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    if weights.evaluate(Composite::BiasCascade, state) > thresholds.bias_cluster {
        recommendations
            .push("Warning: high bias cascade detected. Consider a structured debiasing program.".into());
    }
    recommendations
}
