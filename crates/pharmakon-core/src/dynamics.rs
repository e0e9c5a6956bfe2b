//! Autonomous vector field over a state vector.
//!
//! Variables are addressed by ordinal through the shape's `VariableIndex`.
//! A rule whose variables are absent from the shape is inactive, so for the
//! minimal and refined shapes the field is identically zero.

use crate::composite::{Composite, CompositeWeights};
use crate::constants::{
    CONFIRMATION_EROSION, EGO_LUCIDITY_DAMPING, EGO_OVERTHINK_GAIN, FEAR_DECAY, JOY_DECAY,
    JOY_GAIN, META_AWARENESS_GAIN,
};
use crate::state::VariableIndex;

/// `dy/dt = f(t, y)`.
pub trait VectorField {
    fn dimension(&self) -> usize;

    /// Write `f(t, y)` into `dy`. Both slices have length `dimension()`.
    fn derivative(&self, t: f64, y: &[f64], dy: &mut [f64]);
}

/// A composite with its names resolved to ordinals. Unresolved terms drop out.
#[derive(Clone, Debug)]
struct ResolvedComposite {
    terms: Vec<(Option<usize>, f64)>,
}

impl ResolvedComposite {
    fn new(index: &VariableIndex, weights: &CompositeWeights, composite: Composite) -> Self {
        let terms = weights
            .get(composite)
            .terms()
            .iter()
            .map(|(name, w)| (index.ordinal(name), *w))
            .collect();
        Self { terms }
    }

    fn evaluate(&self, y: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(i, w)| i.map_or(0.0, |i| y[i]) * w)
            .sum()
    }
}

/// Decay and feedback rules:
///
/// - `dFear = -0.1·Fear`
/// - `dJoy = 0.05·positive - 0.02·Joy`
/// - `dEgo_Oscillation = 0.1·Recursive_Overthinking - 0.05·Lucidity`
/// - `awareness = Meta_Cognition·(1 - bias_cascade)`,
///   `dMeta_Cognition = 0.1·awareness`, `dConfirmation = -0.05·awareness`
#[derive(Clone, Debug)]
pub struct PharmakonField {
    dimension: usize,
    fear: Option<usize>,
    joy: Option<usize>,
    ego_oscillation: Option<usize>,
    lucidity: Option<usize>,
    recursive_overthinking: Option<usize>,
    meta_cognition: Option<usize>,
    confirmation: Option<usize>,
    positive: ResolvedComposite,
    bias_cascade: ResolvedComposite,
}

impl PharmakonField {
    pub fn new(index: &VariableIndex, weights: &CompositeWeights) -> Self {
        Self {
            dimension: index.len(),
            fear: index.ordinal("Fear"),
            joy: index.ordinal("Joy"),
            ego_oscillation: index.ordinal("Ego_Oscillation"),
            lucidity: index.ordinal("Lucidity"),
            recursive_overthinking: index.ordinal("Recursive_Overthinking"),
            meta_cognition: index.ordinal("Meta_Cognition"),
            confirmation: index.ordinal("Confirmation"),
            positive: ResolvedComposite::new(index, weights, Composite::Positive),
            bias_cascade: ResolvedComposite::new(index, weights, Composite::BiasCascade),
        }
    }

    /// True when no rule applies to this shape.
    pub fn is_inert(&self) -> bool {
        self.fear.is_none()
            && self.joy.is_none()
            && (self.ego_oscillation.is_none() || self.lucidity.is_none())
            && (self.meta_cognition.is_none() || self.confirmation.is_none())
    }
}

impl VectorField for PharmakonField {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn derivative(&self, _t: f64, y: &[f64], dy: &mut [f64]) {
        dy.fill(0.0);

        if let Some(fear) = self.fear {
            dy[fear] = -FEAR_DECAY * y[fear];
        }

        if let Some(joy) = self.joy {
            dy[joy] = JOY_GAIN * self.positive.evaluate(y) - JOY_DECAY * y[joy];
        }

        if let (Some(ego), Some(lucidity)) = (self.ego_oscillation, self.lucidity) {
            let overthinking = self.recursive_overthinking.map_or(0.0, |i| y[i]);
            dy[ego] = EGO_OVERTHINK_GAIN * overthinking - EGO_LUCIDITY_DAMPING * y[lucidity];
        }

        if let (Some(mc), Some(confirmation)) = (self.meta_cognition, self.confirmation) {
            let awareness = y[mc] * (1.0 - self.bias_cascade.evaluate(y));
            dy[mc] = META_AWARENESS_GAIN * awareness;
            dy[confirmation] = -CONFIRMATION_EROSION * awareness;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::MultiDomainState;
    use crate::state::{MinimalState, RefinedState, StateRecord};
    use approx::assert_relative_eq;

    fn field_for<S: StateRecord>() -> PharmakonField {
        PharmakonField::new(S::index(), &CompositeWeights::default())
    }

    fn eval(state: &MultiDomainState) -> Vec<f64> {
        let field = field_for::<MultiDomainState>();
        let y = state.to_values();
        let mut dy = vec![f64::NAN; y.len()];
        field.derivative(0.0, &y, &mut dy);
        dy
    }

    fn at(dy: &[f64], name: &str) -> f64 {
        dy[MultiDomainState::index().ordinal(name).unwrap()]
    }

    #[test]
    fn test_rules_on_multi_domain() {
        let st = MultiDomainState::builder()
            .set("Fear", 0.8)
            .set("Joy", 0.1)
            .set("Love", 0.5)
            .set("Recursive_Overthinking", 0.8)
            .set("Lucidity", 0.8)
            .set("Meta_Cognition", 0.6)
            .set("Confirmation", 0.7)
            .set("Dunning_Kruger", 0.6)
            .set("Overconfidence", 0.7)
            .build()
            .unwrap();
        let dy = eval(&st);

        assert_relative_eq!(at(&dy, "Fear"), -0.08, epsilon = 1e-12);
        // positive = 0.3*0.1 + 0.2*0.5 = 0.13
        assert_relative_eq!(at(&dy, "Joy"), 0.05 * 0.13 - 0.02 * 0.1, epsilon = 1e-12);
        assert_relative_eq!(at(&dy, "Ego_Oscillation"), 0.08 - 0.04, epsilon = 1e-12);
        // cascade = 0.64, awareness = 0.6 * 0.36
        let awareness = 0.6 * 0.36;
        assert_relative_eq!(at(&dy, "Meta_Cognition"), 0.1 * awareness, epsilon = 1e-12);
        assert_relative_eq!(at(&dy, "Confirmation"), -0.05 * awareness, epsilon = 1e-12);
        // Everything else is untouched
        assert_eq!(at(&dy, "Cortisol"), 0.0);
        assert_eq!(at(&dy, "Hope"), 0.0);
    }

    #[test]
    fn test_field_is_autonomous() {
        let field = field_for::<MultiDomainState>();
        let y = MultiDomainState::default().to_values();
        let mut a = vec![0.0; y.len()];
        let mut b = vec![0.0; y.len()];
        field.derivative(0.0, &y, &mut a);
        field.derivative(123.0, &y, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn test_small_shapes_are_inert() {
        assert!(field_for::<MinimalState>().is_inert());
        assert!(field_for::<RefinedState>().is_inert());
        assert!(!field_for::<MultiDomainState>().is_inert());

        let field = field_for::<RefinedState>();
        let mut dy = vec![1.0; 4];
        field.derivative(0.0, &RefinedState::default().to_values(), &mut dy);
        assert_eq!(dy, vec![0.0; 4]);
    }

    #[test]
    fn test_partial_index_drops_inactive_rules() {
        // Ego rule needs Lucidity; Joy rule reads whatever positive terms exist.
        let index = VariableIndex::new(&["Ego_Oscillation", "Joy", "Recursive_Overthinking"]);
        let field = PharmakonField::new(&index, &CompositeWeights::default());
        let y = [0.5, 0.4, 0.9];
        let mut dy = [0.0; 3];
        field.derivative(0.0, &y, &mut dy);
        assert_eq!(dy[0], 0.0);
        assert_relative_eq!(dy[1], 0.05 * 0.3 * 0.4 - 0.02 * 0.4, epsilon = 1e-12);
        assert_eq!(dy[2], 0.0);
    }
}
