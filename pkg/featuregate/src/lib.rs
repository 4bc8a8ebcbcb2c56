//! Feature gates: a validated, frozen set of boolean toggles.
//!
//! A [`FeatureGate`] is built once at startup and then shared by `Arc`;
//! nothing can flip a gate after construction.

use pkg_constants::features::DEFAULT_FEATURE_GATES;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureGateError {
    #[error("unrecognized feature gate: {0}")]
    UnknownFeatureGate(String),
    #[error("invalid value of {name}={value}, expected true or false")]
    InvalidFeatureGateValue { name: String, value: String },
    #[error("missing bool value for {0}")]
    MissingValue(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureGate {
    known: BTreeMap<String, bool>,
    enabled: BTreeMap<String, bool>,
}

impl FeatureGate {
    /// Validate `requested` against the built-in gates and merge it over their defaults.
    pub fn new(requested: &BTreeMap<String, bool>) -> Result<Self, FeatureGateError> {
        let defaults = DEFAULT_FEATURE_GATES
            .iter()
            .map(|(name, default)| (name.to_string(), *default));
        Self::with_known(defaults, requested)
    }

    /// Same as [`FeatureGate::new`] with a caller-supplied set of known gates.
    pub fn with_known(
        known: impl IntoIterator<Item = (String, bool)>,
        requested: &BTreeMap<String, bool>,
    ) -> Result<Self, FeatureGateError> {
        let known: BTreeMap<String, bool> = known.into_iter().collect();
        let mut enabled = known.clone();
        for (name, value) in requested {
            match enabled.get_mut(name) {
                Some(slot) => *slot = *value,
                None => return Err(FeatureGateError::UnknownFeatureGate(name.clone())),
            }
        }
        info!(gates = ?enabled, "Feature gates");
        Ok(Self { known, enabled })
    }

    /// Whether `name` is on. Unknown names are off.
    pub fn enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(false)
    }

    /// Every gate with its effective value.
    pub fn values(&self) -> &BTreeMap<String, bool> {
        &self.enabled
    }

    /// Help text lines, one per known gate.
    pub fn known_features(&self) -> Vec<String> {
        self.known
            .iter()
            .map(|(name, default)| format!("{}=true|false (default={})", name, default))
            .collect()
    }
}

impl Default for FeatureGate {
    fn default() -> Self {
        let known: BTreeMap<String, bool> = DEFAULT_FEATURE_GATES
            .iter()
            .map(|(name, default)| (name.to_string(), *default))
            .collect();
        Self {
            enabled: known.clone(),
            known,
        }
    }
}

/// Parse `--feature-gates` syntax: `A=true,B=false`. Whitespace around items is ignored.
pub fn parse_feature_gates(text: &str) -> Result<BTreeMap<String, bool>, FeatureGateError> {
    let mut gates = BTreeMap::new();
    for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, value) = item
            .split_once('=')
            .ok_or_else(|| FeatureGateError::MissingValue(item.to_string()))?;
        let name = name.trim();
        let value = value.trim();
        let parsed = match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "t" => true,
            "false" | "0" | "f" => false,
            _ => {
                return Err(FeatureGateError::InvalidFeatureGateValue {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        };
        gates.insert(name.to_string(), parsed);
    }
    Ok(gates)
}
