//! PHARMAKON epistemic state model.
//!
//! Maps a small set of [0, 1] indicator variables onto a discrete epistemic
//! position, nonlinear interaction metrics, weighted composites and risk flags,
//! and integrates them forward in time under simple decay/feedback dynamics.
//! Deterministic functions of the inputs only; no diagnostic meaning.
//!
//! Zero I/O: persistence and transport live in other crates.

pub mod classify;
pub mod composite;
pub mod constants;
pub mod domains;
pub mod dynamics;
pub mod error;
pub mod interaction;
pub mod serde_compat;
mod solver;
pub mod state;
pub mod trajectory;
pub mod triangle;

pub use classify::{Classification, Position, classify_position, classify_refined_position};
pub use composite::{
    Composite, CompositeWeights, Flag, FlagThresholds, Flags, WeightVector, compute_composite,
    detect_flags, narrative_risk,
};
pub use domains::{
    AffectSliders, BiasSliders, BodySliders, CognitiveSliders, Domain, ExtraScalars,
    MultiDomainBuilder, MultiDomainState, NarrativeSliders,
};
pub use dynamics::{PharmakonField, VectorField};
pub use error::{ModelError, Result};
pub use interaction::{
    Interactions, RefinedInteractions, compute_interactions, compute_refined_interactions,
};
pub use serde_compat::{AnyState, export_json, import_any, import_json};
pub use solver::StepStats;
pub use state::{
    MinimalState, RefinedState, StateRecord, StateShape, VariableIndex, checked_unit, clamp_unit,
};
pub use trajectory::{
    Method, Sampling, Simulation, Trajectory, simulate_trajectory, simulate_with,
    simulate_with_weights,
};
pub use triangle::{Band, ScoredBand, TrianglePosition, classify_triangle_position, recommend_debiasing};
