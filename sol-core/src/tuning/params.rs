//! Hyperparameter sets, range specifications and `name=value` overrides.

use crate::error::SolError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Relative tolerance used when deciding whether a range hits its end exactly.
pub const RANGE_TOLERANCE: f64 = 1e-9;

/// Most values one range may produce, and most candidates one grid may hold.
pub const MAX_GRID_SIZE: usize = 10_000;

/// Significant digits kept when snapping a generated value.
const SNAP_DIGITS: usize = 12;

/// One concrete assignment of values to model parameters.
///
/// Values stay strings; the learner coerces them. Keys iterate in ascending order,
/// which keeps log lines and cache files stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperparamSet(BTreeMap<String, String>);

impl HyperparamSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy of `self` where every key in `overrides` takes the override value.
    pub fn overlay(&self, overrides: &HyperparamSet) -> HyperparamSet {
        let mut merged = self.0.clone();
        for (k, v) in &overrides.0 {
            merged.insert(k.clone(), v.clone());
        }
        Self(merged)
    }

    /// Parse a list of `name=value` strings.
    pub fn parse_overrides<S: AsRef<str>>(items: &[S]) -> Result<Self, SolError> {
        let mut set = Self::new();
        for item in items {
            let item = item.as_ref();
            let (name, value) = split_assignment(item)?;
            if value.is_empty() {
                return Err(SolError::invalid_param(item, "missing value"));
            }
            set.0.insert(name.to_string(), value.to_string());
        }
        Ok(set)
    }
}

impl fmt::Display for HyperparamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(defaults)");
        }
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HyperparamSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn split_assignment(item: &str) -> Result<(&str, &str), SolError> {
    let Some((name, value)) = item.split_once('=') else {
        return Err(SolError::invalid_param(item, "expected name=value"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(SolError::invalid_param(item, "missing parameter name"));
    }
    Ok((name, value.trim()))
}

/// A range of candidate values for one parameter: `name=start:step:end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamRangeSpec {
    pub name: String,
    pub start: f64,
    pub step: f64,
    pub end: f64,
}

impl ParamRangeSpec {
    /// Build a validated range.
    pub fn new(name: impl Into<String>, start: f64, step: f64, end: f64) -> Result<Self, SolError> {
        let name = name.into();
        if !(start.is_finite() && step.is_finite() && end.is_finite()) {
            return Err(SolError::invalid_range(name, "bounds and step must be finite"));
        }
        if step == 0.0 {
            return Err(SolError::invalid_range(name, "step must not be zero"));
        }
        if step > 0.0 && start > end {
            return Err(SolError::invalid_range(
                name,
                format!("positive step {step} but start {start} > end {end}"),
            ));
        }
        if step < 0.0 && start < end {
            return Err(SolError::invalid_range(
                name,
                format!("negative step {step} but start {start} < end {end}"),
            ));
        }
        let spec = Self {
            name,
            start,
            step,
            end,
        };
        spec.count()?;
        Ok(spec)
    }

    /// Number of values the range produces, capped at [`MAX_GRID_SIZE`].
    pub fn count(&self) -> Result<usize, SolError> {
        let span = (self.end - self.start) / self.step;
        let nearest = span.round();
        let steps = if (span - nearest).abs() <= RANGE_TOLERANCE * nearest.abs().max(1.0) {
            nearest
        } else {
            span.floor()
        };
        if !(0.0..MAX_GRID_SIZE as f64).contains(&steps) {
            return Err(SolError::invalid_range(
                &self.name,
                format!("{self} produces more than {MAX_GRID_SIZE} values"),
            ));
        }
        Ok(steps as usize + 1)
    }

    /// Candidate values, inclusive of `end` when it lies on the step lattice.
    pub fn values(&self) -> Result<Vec<f64>, SolError> {
        Ok((0..self.count()?)
            .map(|i| snap(self.start + i as f64 * self.step, self.step))
            .collect())
    }

    /// Candidate values rendered the way they are handed to the learner.
    pub fn rendered_values(&self) -> Result<Vec<String>, SolError> {
        Ok(self.values()?.into_iter().map(render).collect())
    }
}

impl FromStr for ParamRangeSpec {
    type Err = SolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, range) = split_assignment(s)?;
        let parts: Vec<&str> = range.split(':').map(str::trim).collect();
        let [start, step, end] = parts.as_slice() else {
            return Err(SolError::invalid_range(
                name,
                format!("expected start:step:end, got '{range}'"),
            ));
        };
        let parse = |field: &str, raw: &str| {
            raw.parse::<f64>().map_err(|_| {
                SolError::invalid_range(name, format!("{field} '{raw}' is not a number"))
            })
        };
        Self::new(
            name,
            parse("start", start)?,
            parse("step", step)?,
            parse("end", end)?,
        )
    }
}

impl fmt::Display for ParamRangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}:{}:{}",
            self.name,
            format_value(self.start),
            format_value(self.step),
            format_value(self.end)
        )
    }
}

/// Drop accumulated float error below the resolution of `step`.
fn snap(v: f64, step: f64) -> f64 {
    if v.abs() < step.abs() * RANGE_TOLERANCE {
        return 0.0;
    }
    let magnitude = (v.abs() / step.abs()).log10().clamp(0.0, 17.0).ceil() as usize;
    let digits = (SNAP_DIGITS + magnitude).min(17);
    format!("{:.*e}", digits - 1, v).parse().unwrap_or(v)
}

fn render(v: f64) -> String {
    if v == 0.0 {
        "0".to_string()
    } else {
        format!("{v}")
    }
}

/// Shortest round-trip rendering after rounding away accumulated float error.
pub fn format_value(v: f64) -> String {
    render(snap(v, v))
}
