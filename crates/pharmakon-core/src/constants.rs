//! Fixed thresholds and rates. All comparisons against these are strict.

/// Ego dissolution: S below this overrides every other reading.
pub const EGO_DISSOLUTION_S: f64 = 0.2;

/// Energy collapse: H below this.
pub const ENERGY_COLLAPSE_H: f64 = 0.2;

/// Delusional defense: B above this.
pub const DELUSIONAL_B: f64 = 0.8;

/// Strong identity band for positions 1 and 3.
pub const HIGH_S: f64 = 0.7;

/// High energy band for positions 1 and 3.
pub const HIGH_H: f64 = 0.6;

/// Position 1 needs bias above this.
pub const ARROGANCE_B: f64 = 0.6;

/// Position 3 needs bias below this.
pub const COMPETENCE_B: f64 = 0.4;

/// Position 2 identity floor.
pub const META_AWARENESS_S: f64 = 0.5;

/// Position 2 open bias band (lower, upper).
pub const META_AWARENESS_B: (f64, f64) = (0.4, 0.7);

/// Below this S, bias is reported as meaningless.
pub const BIAS_MEANINGLESS_S: f64 = 0.3;

/// Above this B, the self is reported as defending a false model.
pub const DELUSIONAL_DEFENSE_B: f64 = 0.7;

/// Bias amplification trigger on H_cognitive.
pub const AMPLIFICATION_H_COGNITIVE: f64 = 0.3;

/// Cognitive collapse: H_cognitive below this.
pub const COGNITIVE_COLLAPSE_H: f64 = 0.2;

/// Stress amplification: somatic/cognitive mismatch above this.
pub const STRESS_MISMATCH: f64 = 0.4;

/// Triangle score bands.
pub const BAND_HIGH: f64 = 0.6;
pub const BAND_MEDIUM: f64 = 0.4;

/// Fear decay rate.
pub const FEAR_DECAY: f64 = 0.1;

/// Joy gain from the positive composite, and its self-decay.
pub const JOY_GAIN: f64 = 0.05;
pub const JOY_DECAY: f64 = 0.02;

/// Ego oscillation driven by overthinking, damped by lucidity.
pub const EGO_OVERTHINK_GAIN: f64 = 0.1;
pub const EGO_LUCIDITY_DAMPING: f64 = 0.05;

/// Bias awareness feeds meta-cognition and erodes confirmation bias.
pub const META_AWARENESS_GAIN: f64 = 0.1;
pub const CONFIRMATION_EROSION: f64 = 0.05;

/// Numerical epsilon for near-zero divisors.
pub const EPSILON: f64 = 1e-12;

/// Relative tolerance on weight table sums.
pub const WEIGHT_SUM_RTOL: f64 = 1e-3;
