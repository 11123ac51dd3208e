//! Parameter descriptors, concrete values and candidates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::SpaceError;

/// How a parameter is sampled and encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    /// Continuous uniform range [low, high].
    Float { low: f64, high: f64 },
    /// Log-uniform range (sampled in log-space then exponentiated).
    LogFloat { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    Int { low: i64, high: i64 },
    /// Ordered categorical choices.
    Categorical { choices: Vec<serde_json::Value> },
}

/// Kind names as they appear in study files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindName {
    Float,
    LogFloat,
    Int,
    Categorical,
}

impl FromStr for KindName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "float" => Ok(Self::Float),
            "log_float" => Ok(Self::LogFloat),
            "int" => Ok(Self::Int),
            "categorical" => Ok(Self::Categorical),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for KindName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Float => "float",
            Self::LogFloat => "log_float",
            Self::Int => "int",
            Self::Categorical => "categorical",
        };
        f.write_str(name)
    }
}

/// A single named dimension of the search space.
///
/// Built through the validating constructors; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: ParamKind,
}

impl ParamSpec {
    pub fn float(name: impl Into<String>, low: f64, high: f64) -> Result<Self, SpaceError> {
        Self::validated(name.into(), ParamKind::Float { low, high })
    }

    pub fn log_float(name: impl Into<String>, low: f64, high: f64) -> Result<Self, SpaceError> {
        Self::validated(name.into(), ParamKind::LogFloat { low, high })
    }

    pub fn int(name: impl Into<String>, low: i64, high: i64) -> Result<Self, SpaceError> {
        Self::validated(name.into(), ParamKind::Int { low, high })
    }

    pub fn categorical(
        name: impl Into<String>,
        choices: Vec<serde_json::Value>,
    ) -> Result<Self, SpaceError> {
        Self::validated(name.into(), ParamKind::Categorical { choices })
    }

    /// Build a spec from loosely typed parts, e.g. a study-file table.
    pub fn from_parts(
        name: impl Into<String>,
        kind: &str,
        low: Option<f64>,
        high: Option<f64>,
        choices: Option<Vec<serde_json::Value>>,
    ) -> Result<Self, SpaceError> {
        let name = name.into();
        let kind_name = kind.parse::<KindName>().map_err(|kind| SpaceError::UnsupportedKind {
            name: name.clone(),
            kind,
        })?;

        match kind_name {
            KindName::Float | KindName::LogFloat | KindName::Int => {
                let (low, high) = match (low, high) {
                    (Some(low), Some(high)) => (low, high),
                    _ => {
                        return Err(SpaceError::InvalidField {
                            name,
                            message: format!("{kind_name} requires low and high"),
                        })
                    }
                };
                match kind_name {
                    KindName::Float => Self::float(name, low, high),
                    KindName::LogFloat => Self::log_float(name, low, high),
                    _ => {
                        if low.fract() != 0.0 || high.fract() != 0.0 {
                            return Err(SpaceError::InvalidField {
                                name,
                                message: format!(
                                    "int bounds must be integers (low={low}, high={high})"
                                ),
                            });
                        }
                        Self::int(name, low as i64, high as i64)
                    }
                }
            }
            KindName::Categorical => Self::categorical(name, choices.unwrap_or_default()),
        }
    }

    fn validated(name: String, kind: ParamKind) -> Result<Self, SpaceError> {
        let spec = Self { name, kind };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the bounds/choices invariants. Specs that arrive through serde
    /// skip the constructors, so the space re-validates them.
    pub fn validate(&self) -> Result<(), SpaceError> {
        let name = &self.name;
        match &self.kind {
            ParamKind::Float { low, high } | ParamKind::LogFloat { low, high } => {
                // A finite pair can still have an infinite span.
                if !low.is_finite() || !high.is_finite() || !(high - low).is_finite() {
                    return Err(SpaceError::NonFiniteBounds { name: name.clone() });
                }
                if high <= low {
                    return Err(SpaceError::InvertedBounds {
                        name: name.clone(),
                        low: *low,
                        high: *high,
                    });
                }
                if matches!(self.kind, ParamKind::LogFloat { .. }) && *low <= 0.0 {
                    return Err(SpaceError::NonPositiveLogBound {
                        name: name.clone(),
                        low: *low,
                    });
                }
            }
            ParamKind::Int { low, high } => {
                if high <= low {
                    return Err(SpaceError::InvertedBounds {
                        name: name.clone(),
                        low: *low as f64,
                        high: *high as f64,
                    });
                }
            }
            ParamKind::Categorical { choices } => {
                if choices.is_empty() {
                    return Err(SpaceError::EmptyChoices { name: name.clone() });
                }
            }
        }
        Ok(())
    }

    pub fn kind_name(&self) -> KindName {
        match self.kind {
            ParamKind::Float { .. } => KindName::Float,
            ParamKind::LogFloat { .. } => KindName::LogFloat,
            ParamKind::Int { .. } => KindName::Int,
            ParamKind::Categorical { .. } => KindName::Categorical,
        }
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Choice(serde_json::Value),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Choice(v) => v.as_f64(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Choice(serde_json::Value::String(s)) => f.write_str(s),
            Self::Choice(v) => write!(f, "{v}"),
        }
    }
}

/// A full assignment of values to parameters, keyed by name.
///
/// Backed by an ordered map so that serialization, and therefore the
/// canonical key, does not depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(BTreeMap<String, ParamValue>);

impl Candidate {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) -> Option<ParamValue> {
        self.0.insert(name.into(), value)
    }

    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON with sorted keys. Ints and floats serialize differently
    /// (`1` vs `1.0`), so the key is stable per value type.
    pub fn canonical_key(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl FromIterator<(String, ParamValue)> for Candidate {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}
