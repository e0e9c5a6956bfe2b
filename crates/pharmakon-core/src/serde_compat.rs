//! JSON layout for persisted state records.
//!
//! A flat object of variable name → number plus a `"version"` string:
//! `"0.1"` for the minimal and refined shapes, `"10.0"` for multi-domain.
//! Floats round-trip exactly.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::domains::MultiDomainState;
use crate::error::{ModelError, Result};
use crate::state::{MinimalState, RefinedState, StateRecord, StateShape};

pub const VERSION_KEY: &str = "version";
pub const SMALL_SHAPE_VERSION: &str = "0.1";
pub const MULTI_DOMAIN_VERSION: &str = "10.0";

pub fn format_version(shape: StateShape) -> &'static str {
    match shape {
        StateShape::Minimal | StateShape::Refined => SMALL_SHAPE_VERSION,
        StateShape::MultiDomain => MULTI_DOMAIN_VERSION,
    }
}

pub fn to_json_value<S: StateRecord>(state: &S) -> Value {
    let mut map: Map<String, Value> = state
        .to_map()
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect();
    map.insert(
        VERSION_KEY.to_string(),
        Value::String(format_version(S::SHAPE).to_string()),
    );
    Value::Object(map)
}

/// Pretty-printed persisted form.
pub fn export_json<S: StateRecord>(state: &S) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json_value(state))?)
}

/// Split a persisted object into its version tag and variable map.
fn split(value: Value) -> Result<(Option<String>, BTreeMap<String, f64>)> {
    let Value::Object(obj) = value else {
        return Err(ModelError::InvalidData("expected a JSON object".into()));
    };
    let mut version = None;
    let mut vars = BTreeMap::new();
    for (key, v) in obj {
        if key == VERSION_KEY {
            match v {
                Value::String(s) => version = Some(s),
                other => {
                    return Err(ModelError::InvalidData(format!(
                        "version must be a string, got {other}"
                    )));
                }
            }
            continue;
        }
        let x = v
            .as_f64()
            .ok_or_else(|| ModelError::InvalidData(format!("{key} is not a number: {v}")))?;
        vars.insert(key, x);
    }
    Ok((version, vars))
}

pub fn from_json_value<S: StateRecord>(value: Value) -> Result<S> {
    let (version, vars) = split(value)?;
    let expected = format_version(S::SHAPE);
    if let Some(v) = version
        && v != expected
    {
        return Err(ModelError::InvalidData(format!(
            "version {v} does not match {} state (expected {expected})",
            S::SHAPE.as_str()
        )));
    }
    S::from_map(&vars)
}

/// Parse a persisted record of a known shape. A missing version is accepted;
/// absent variables take their defaults.
pub fn import_json<S: StateRecord>(json: &str) -> Result<S> {
    from_json_value(serde_json::from_str(json)?)
}

/// A record of any shape, for callers that learn the shape from the data.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyState {
    Minimal(MinimalState),
    Refined(RefinedState),
    MultiDomain(MultiDomainState),
}

impl AnyState {
    pub fn shape(&self) -> StateShape {
        match self {
            AnyState::Minimal(_) => StateShape::Minimal,
            AnyState::Refined(_) => StateShape::Refined,
            AnyState::MultiDomain(_) => StateShape::MultiDomain,
        }
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        match self {
            AnyState::Minimal(s) => s.to_map(),
            AnyState::Refined(s) => s.to_map(),
            AnyState::MultiDomain(s) => s.to_map(),
        }
    }

    pub fn to_json_value(&self) -> Value {
        match self {
            AnyState::Minimal(s) => to_json_value(s),
            AnyState::Refined(s) => to_json_value(s),
            AnyState::MultiDomain(s) => to_json_value(s),
        }
    }

    /// Rebuild from a flat map of a known shape.
    pub fn from_map(shape: StateShape, map: &BTreeMap<String, f64>) -> Result<Self> {
        Ok(match shape {
            StateShape::Minimal => AnyState::Minimal(MinimalState::from_map(map)?),
            StateShape::Refined => AnyState::Refined(RefinedState::from_map(map)?),
            StateShape::MultiDomain => AnyState::MultiDomain(MultiDomainState::from_map(map)?),
        })
    }
}

/// Infer the shape of a persisted record: version `"10.0"` or any
/// multi-domain name means multi-domain; `H_somatic`/`H_cognitive` means
/// refined; anything else is minimal.
pub fn detect_shape(vars: &BTreeMap<String, f64>, version: Option<&str>) -> StateShape {
    if version == Some(MULTI_DOMAIN_VERSION)
        || vars
            .keys()
            .any(|k| MultiDomainState::index().ordinal(k).is_some())
    {
        StateShape::MultiDomain
    } else if vars.contains_key("H_somatic") || vars.contains_key("H_cognitive") {
        StateShape::Refined
    } else {
        StateShape::Minimal
    }
}

pub fn import_any(json: &str) -> Result<AnyState> {
    let (version, vars) = split(serde_json::from_str(json)?)?;
    let shape = detect_shape(&vars, version.as_deref());
    AnyState::from_map(shape, &vars)
}
