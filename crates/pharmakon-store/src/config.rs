//! Model configuration: composite weights, flag thresholds and simulation
//! settings, read from TOML. Every section is optional.
//!
//! ```toml
//! [weights.stress]
//! Fear = 0.4
//! Anger = 0.1
//! Cortisol = 0.25
//! Sympathetic_Surge = 0.25
//!
//! [flags]
//! protagonist = 0.8
//!
//! [simulation]
//! t1 = 20.0
//! method = "RK23"
//! ```
//!
//! A `.json` path is read as a bare weights file with `stress`, `positive`
//! and `bias_cascade` tables.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use pharmakon_core::{Composite, CompositeWeights, FlagThresholds, Simulation, WeightVector};

use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    weights: WeightsSection,
    #[serde(default)]
    flags: FlagThresholds,
    #[serde(default)]
    simulation: Simulation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeightsSection {
    stress: Option<WeightVector>,
    positive: Option<WeightVector>,
    bias_cascade: Option<WeightVector>,
}

impl WeightsSection {
    /// Missing tables fall back to the built-in ones.
    fn resolve(self) -> Result<CompositeWeights> {
        let builtin = CompositeWeights::builtin();
        let pick = |table: Option<WeightVector>, c: Composite| {
            table.unwrap_or_else(|| builtin.get(c).clone())
        };
        CompositeWeights::new(
            pick(self.stress, Composite::Stress),
            pick(self.positive, Composite::Positive),
            pick(self.bias_cascade, Composite::BiasCascade),
        )
        .map_err(|e| StoreError::Config(e.to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub weights: CompositeWeights,
    pub flags: FlagThresholds,
    pub simulation: Simulation,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: ConfigFile = toml::from_str(text)?;
        raw.simulation
            .validate()
            .map_err(|e| StoreError::Config(format!("[simulation]: {e}")))?;
        Ok(Self {
            weights: raw.weights.resolve()?,
            flags: raw.flags,
            simulation: raw.simulation,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = if path.extension().is_some_and(|ext| ext == "json") {
            let weights = CompositeWeights::from_json(&text)
                .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
            Self {
                weights,
                ..Self::default()
            }
        } else {
            Self::from_toml_str(&text)?
        };
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }
}
