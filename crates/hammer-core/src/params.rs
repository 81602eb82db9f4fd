//! Ordered parameter sets and named parameter points.

use std::ops::Index;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, HammerError};

/// A single sampled parameter with its hard bounds and proposal width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique parameter name.
    pub name: String,
    /// Initial guess used to seed walkers.
    pub initial: f64,
    /// Inclusive lower bound.
    pub lower: f64,
    /// Inclusive upper bound.
    pub upper: f64,
    /// Width of the initial ball of walker positions.
    pub width: f64,
}

impl Parameter {
    /// Creates a validated parameter.
    pub fn new(
        name: impl Into<String>,
        initial: f64,
        lower: f64,
        upper: f64,
        width: f64,
    ) -> Result<Self, HammerError> {
        let parameter = Self {
            name: name.into(),
            initial,
            lower,
            upper,
            width,
        };
        parameter.validate()?;
        Ok(parameter)
    }

    fn validate(&self) -> Result<(), HammerError> {
        let finite = [self.initial, self.lower, self.upper, self.width]
            .iter()
            .all(|value| value.is_finite());
        if !finite {
            return Err(self.invalid("parameter-non-finite", "parameter values must be finite"));
        }
        if !(self.lower <= self.initial && self.initial <= self.upper) {
            return Err(self.invalid(
                "parameter-bounds",
                "initial value must lie within [lower, upper]",
            ));
        }
        if self.width <= 0.0 {
            return Err(self.invalid("parameter-width", "proposal width must be positive"));
        }
        Ok(())
    }

    fn invalid(&self, code: &str, message: &str) -> HammerError {
        HammerError::Config(
            ErrorInfo::new(code, message)
                .with_context("parameter", self.name.clone())
                .with_context(
                    "value",
                    format!(
                        "({}, {}, {}, {})",
                        self.initial, self.lower, self.upper, self.width
                    ),
                ),
        )
    }

    /// Returns true when `value` lies inside the closed bounds.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Length of the bounded interval.
    pub fn span(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Ordered, immutable collection of sampled parameters.
///
/// Insertion order defines the dimension order used by every numeric backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Parameter>", into = "Vec<Parameter>")]
pub struct ParameterSet {
    params: IndexMap<String, Parameter>,
}

impl ParameterSet {
    /// Builds a parameter set from validated parameters, rejecting duplicate names.
    pub fn new(parameters: impl IntoIterator<Item = Parameter>) -> Result<Self, HammerError> {
        let mut params = IndexMap::new();
        for parameter in parameters {
            parameter.validate()?;
            if params.contains_key(&parameter.name) {
                return Err(HammerError::Config(
                    ErrorInfo::new("parameter-duplicate", "parameter names must be unique")
                        .with_context("parameter", parameter.name.clone()),
                ));
            }
            params.insert(parameter.name.clone(), parameter);
        }
        Ok(Self { params })
    }

    /// Builds a parameter set from `(name, (initial, lower, upper, width))` entries.
    pub fn from_tuples<N, I>(entries: I) -> Result<Self, HammerError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, (f64, f64, f64, f64))>,
    {
        let parameters = entries
            .into_iter()
            .map(|(name, (initial, lower, upper, width))| {
                Parameter::new(name, initial, lower, upper, width)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parameters)
    }

    /// Number of parameters (the sampling dimension).
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true when no parameter is defined.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parameter names in dimension order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.params.keys().map(String::as_str)
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    /// Iterates over parameters in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> + '_ {
        self.params.values()
    }

    /// Initial values in dimension order.
    pub fn initial_vector(&self) -> Vec<f64> {
        self.iter().map(|parameter| parameter.initial).collect()
    }

    /// Returns true when every coordinate lies within its parameter's bounds.
    ///
    /// Vectors of the wrong length are never within bounds.
    pub fn contains(&self, values: &[f64]) -> bool {
        values.len() == self.len()
            && self
                .iter()
                .zip(values)
                .all(|(parameter, &value)| parameter.contains(value))
    }

    /// Rebuilds named values from a raw numeric vector, by position.
    pub fn point_from_vector(&self, values: &[f64]) -> Result<ParamPoint, HammerError> {
        if values.len() != self.len() {
            return Err(HammerError::Sampler(
                ErrorInfo::new("point-dimension", "vector length does not match parameter count")
                    .with_context("expected", self.len().to_string())
                    .with_context("actual", values.len().to_string()),
            ));
        }
        Ok(ParamPoint {
            values: self
                .names()
                .zip(values)
                .map(|(name, &value)| (name.to_string(), value))
                .collect(),
        })
    }
}

impl Index<usize> for ParameterSet {
    type Output = Parameter;

    fn index(&self, index: usize) -> &Self::Output {
        &self.params[index]
    }
}

impl TryFrom<Vec<Parameter>> for ParameterSet {
    type Error = HammerError;

    fn try_from(value: Vec<Parameter>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ParameterSet> for Vec<Parameter> {
    fn from(value: ParameterSet) -> Self {
        value.params.into_values().collect()
    }
}

/// Named parameter values handed to core modules.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamPoint {
    values: IndexMap<String, f64>,
}

impl ParamPoint {
    /// Returns the value of the named parameter, if present.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Returns the named value or a module error naming the missing key.
    pub fn require(&self, name: &str) -> Result<f64, HammerError> {
        self.get(name).ok_or_else(|| {
            HammerError::Module(
                ErrorInfo::new("point-missing-parameter", "parameter not sampled by this chain")
                    .with_context("parameter", name),
            )
        })
    }

    /// Iterates over `(name, value)` pairs in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// Number of named values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the point carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_initial_outside_bounds() {
        let err = Parameter::new("a", 2.0, 0.0, 1.0, 0.1).unwrap_err();
        assert_eq!(err.info().code, "parameter-bounds");
    }

    #[test]
    fn rejects_non_positive_width() {
        let err = Parameter::new("a", 0.5, 0.0, 1.0, 0.0).unwrap_err();
        assert_eq!(err.info().code, "parameter-width");
    }

    #[test]
    fn point_from_vector_follows_insertion_order() {
        let params =
            ParameterSet::from_tuples([("b", (0.5, 0.0, 1.0, 0.1)), ("a", (2.0, 1.0, 3.0, 0.2))])
                .unwrap();
        let point = params.point_from_vector(&[0.25, 1.5]).unwrap();
        let pairs: Vec<_> = point.iter().collect();
        assert_eq!(pairs, vec![("b", 0.25), ("a", 1.5)]);
    }
}
