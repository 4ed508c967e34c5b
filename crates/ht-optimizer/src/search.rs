//! Search space definitions, parameter values and point validation.

use ht_types::SpaceError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How values are drawn between a dimension's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prior {
    #[default]
    Uniform,
    /// Sampled in log-space then exponentiated.
    LogUniform,
}

/// A single named dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Parameter name handed to the trainer (e.g. "lr0").
    pub name: String,
    /// The kind of search range.
    pub kind: DimensionKind,
}

/// Describes the domain of a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DimensionKind {
    /// Continuous range [low, high].
    Real {
        low: f64,
        high: f64,
        #[serde(default)]
        prior: Prior,
    },
    /// Integer range [low, high] inclusive.
    Integer {
        low: i64,
        high: i64,
        #[serde(default)]
        prior: Prior,
    },
    /// A fixed set of choices.
    Categorical { categories: Vec<ParameterValue> },
}

/// A concrete parameter value.
///
/// Untagged in JSON. `Int` is tried before `Float` so integers survive a
/// checkpoint round trip; floats are always written with a fraction or
/// exponent and therefore never parse as `Int`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParameterValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Float(_) => "real",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// One sample from the space, positionally aligned with its dimensions.
pub type ParameterPoint = Vec<ParameterValue>;

/// A single name/value pair of a [`NamedParameters`] set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: ParameterValue,
}

/// A validated point keyed by dimension name, in space order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamedParameters(Vec<NamedValue>);

impl NamedParameters {
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.iter().find(|p| p.name == name).map(|p| &p.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.0.iter().map(|p| (p.name.as_str(), &p.value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Dimension {
    /// Check the dimension's own declaration.
    pub fn validate(&self) -> Result<(), SpaceError> {
        let name = self.name.clone();
        match &self.kind {
            DimensionKind::Real { low, high, prior } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(SpaceError::InvalidBounds {
                        name,
                        message: "bounds must be finite".into(),
                    });
                }
                if low >= high {
                    return Err(SpaceError::InvalidBounds {
                        name,
                        message: format!("low {low} must be below high {high}"),
                    });
                }
                if *prior == Prior::LogUniform && *low <= 0.0 {
                    return Err(SpaceError::InvalidPrior {
                        name,
                        message: format!("log-uniform needs a positive lower bound, got {low}"),
                    });
                }
            }
            DimensionKind::Integer { low, high, prior } => {
                if low > high {
                    return Err(SpaceError::InvalidBounds {
                        name,
                        message: format!("low {low} must not exceed high {high}"),
                    });
                }
                if *prior == Prior::LogUniform && *low < 1 {
                    return Err(SpaceError::InvalidPrior {
                        name,
                        message: format!("log-uniform needs a lower bound of at least 1, got {low}"),
                    });
                }
            }
            DimensionKind::Categorical { categories } => {
                if categories.is_empty() {
                    return Err(SpaceError::EmptyCategories { name });
                }
                for (i, category) in categories.iter().enumerate() {
                    if categories[..i].contains(category) {
                        return Err(SpaceError::DuplicateCategory {
                            name,
                            category: category.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Check that `value` belongs to this dimension.
    pub fn check(&self, value: &ParameterValue) -> Result<(), SpaceError> {
        let type_mismatch = |expected: &str| SpaceError::TypeMismatch {
            name: self.name.clone(),
            expected: expected.to_string(),
            actual: value.type_name().to_string(),
        };

        match (&self.kind, value) {
            (DimensionKind::Real { low, high, .. }, ParameterValue::Float(v)) => {
                if v.is_finite() && v >= low && v <= high {
                    Ok(())
                } else {
                    Err(SpaceError::OutOfBounds {
                        name: self.name.clone(),
                        value: v.to_string(),
                        low: low.to_string(),
                        high: high.to_string(),
                    })
                }
            }
            (DimensionKind::Real { .. }, _) => Err(type_mismatch("real")),
            (DimensionKind::Integer { low, high, .. }, ParameterValue::Int(v)) => {
                if v >= low && v <= high {
                    Ok(())
                } else {
                    Err(SpaceError::OutOfBounds {
                        name: self.name.clone(),
                        value: v.to_string(),
                        low: low.to_string(),
                        high: high.to_string(),
                    })
                }
            }
            (DimensionKind::Integer { .. }, _) => Err(type_mismatch("integer")),
            (DimensionKind::Categorical { categories }, v) => {
                if categories.contains(v) {
                    Ok(())
                } else {
                    Err(SpaceError::UnknownCategory {
                        name: self.name.clone(),
                        value: v.to_string(),
                    })
                }
            }
        }
    }

    /// Draw one value from the dimension's prior.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterValue {
        match &self.kind {
            DimensionKind::Real { low, high, prior } => match prior {
                Prior::Uniform => ParameterValue::Float(rng.random_range(*low..=*high)),
                Prior::LogUniform => {
                    let log_val: f64 = rng.random_range(low.ln()..=high.ln());
                    ParameterValue::Float(log_val.exp().clamp(*low, *high))
                }
            },
            DimensionKind::Integer { low, high, prior } => match prior {
                Prior::Uniform => ParameterValue::Int(rng.random_range(*low..=*high)),
                Prior::LogUniform => {
                    let log_low = (*low as f64).ln();
                    let log_high = (*high as f64 + 1.0).ln();
                    let log_val: f64 = rng.random_range(log_low..log_high);
                    ParameterValue::Int((log_val.exp().floor() as i64).clamp(*low, *high))
                }
            },
            DimensionKind::Categorical { categories } => {
                let idx = rng.random_range(0..categories.len());
                categories[idx].clone()
            }
        }
    }

    /// Draw a value near `base`, within 10% of the range (in the prior's
    /// scale). Categorical dimensions and mismatched bases are resampled.
    pub fn perturb<R: Rng + ?Sized>(&self, base: &ParameterValue, rng: &mut R) -> ParameterValue {
        match (&self.kind, base) {
            (
                DimensionKind::Real {
                    low,
                    high,
                    prior: Prior::Uniform,
                },
                ParameterValue::Float(v),
            ) => {
                let noise = rng.random_range(-0.1..0.1) * (high - low);
                ParameterValue::Float((v + noise).clamp(*low, *high))
            }
            (
                DimensionKind::Real {
                    low,
                    high,
                    prior: Prior::LogUniform,
                },
                ParameterValue::Float(v),
            ) => {
                let log_range = high.ln() - low.ln();
                let noise = rng.random_range(-0.1..0.1) * log_range;
                ParameterValue::Float((v.ln() + noise).exp().clamp(*low, *high))
            }
            (DimensionKind::Integer { low, high, .. }, ParameterValue::Int(v)) => {
                let width = (i128::from(*high) - i128::from(*low)) as f64;
                let span = (width * 0.1).round().clamp(1.0, i64::MAX as f64) as i64;
                let delta: i64 = rng.random_range(-span..=span);
                ParameterValue::Int(v.saturating_add(delta).clamp(*low, *high))
            }
            _ => self.sample(rng),
        }
    }
}

/// The full search space: an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    pub dimensions: Vec<Dimension>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            dimensions: Vec::new(),
        }
    }

    pub fn add_real(mut self, name: impl Into<String>, low: f64, high: f64, prior: Prior) -> Self {
        self.dimensions.push(Dimension {
            name: name.into(),
            kind: DimensionKind::Real { low, high, prior },
        });
        self
    }

    pub fn add_log_real(self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.add_real(name, low, high, Prior::LogUniform)
    }

    pub fn add_integer(mut self, name: impl Into<String>, low: i64, high: i64, prior: Prior) -> Self {
        self.dimensions.push(Dimension {
            name: name.into(),
            kind: DimensionKind::Integer { low, high, prior },
        });
        self
    }

    pub fn add_categorical(mut self, name: impl Into<String>, categories: Vec<ParameterValue>) -> Self {
        self.dimensions.push(Dimension {
            name: name.into(),
            kind: DimensionKind::Categorical { categories },
        });
        self
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(|d| d.name.as_str())
    }

    /// Validate every dimension and the uniqueness of names.
    pub fn validate(&self) -> Result<(), SpaceError> {
        if self.dimensions.is_empty() {
            return Err(SpaceError::Empty);
        }
        let mut seen = HashSet::new();
        for (index, dim) in self.dimensions.iter().enumerate() {
            if dim.name.trim().is_empty() {
                return Err(SpaceError::EmptyName { index });
            }
            if !seen.insert(dim.name.as_str()) {
                return Err(SpaceError::DuplicateName {
                    name: dim.name.clone(),
                });
            }
            dim.validate()?;
        }
        Ok(())
    }

    /// Check a positional point against every dimension.
    pub fn check_point(&self, point: &[ParameterValue]) -> Result<(), SpaceError> {
        if point.len() != self.dimensions.len() {
            return Err(SpaceError::DimensionMismatch {
                expected: self.dimensions.len(),
                actual: point.len(),
            });
        }
        self.dimensions
            .iter()
            .zip(point)
            .try_for_each(|(dim, value)| dim.check(value))
    }

    /// Map a positional point to named parameters after validating it.
    pub fn to_named(&self, point: &[ParameterValue]) -> Result<NamedParameters, SpaceError> {
        self.check_point(point)?;
        Ok(NamedParameters(
            self.dimensions
                .iter()
                .zip(point)
                .map(|(dim, value)| NamedValue {
                    name: dim.name.clone(),
                    value: value.clone(),
                })
                .collect(),
        ))
    }

    /// Draw one independent sample per dimension.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterPoint {
        self.dimensions.iter().map(|d| d.sample(rng)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn detection_space() -> SearchSpace {
        SearchSpace::new()
            .add_real("momentum", 0.8, 0.99, Prior::Uniform)
            .add_log_real("lr0", 0.001, 0.1)
            .add_log_real("weight_decay", 0.0001, 0.001)
    }

    #[test]
    fn search_space_builder_chain() {
        let space = SearchSpace::new()
            .add_integer("batch", 8, 64, Prior::Uniform)
            .add_real("momentum", 0.8, 0.99, Prior::Uniform)
            .add_log_real("lr0", 0.001, 0.1)
            .add_categorical("optimizer", vec!["SGD".into(), "AdamW".into()]);
        assert_eq!(space.len(), 4);
        assert!(space.validate().is_ok());
        assert_eq!(
            space.names().collect::<Vec<_>>(),
            vec!["batch", "momentum", "lr0", "optimizer"]
        );
    }

    #[test]
    fn empty_space_is_rejected() {
        assert_eq!(SearchSpace::new().validate(), Err(SpaceError::Empty));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let space = SearchSpace::new()
            .add_real("lr0", 0.1, 0.2, Prior::Uniform)
            .add_log_real("lr0", 0.001, 0.1);
        assert!(matches!(
            space.validate(),
            Err(SpaceError::DuplicateName { name }) if name == "lr0"
        ));
    }

    #[test]
    fn inverted_and_non_finite_bounds_are_rejected() {
        let inverted = SearchSpace::new().add_real("x", 1.0, 0.0, Prior::Uniform);
        assert!(matches!(inverted.validate(), Err(SpaceError::InvalidBounds { .. })));

        let infinite = SearchSpace::new().add_real("x", 0.0, f64::INFINITY, Prior::Uniform);
        assert!(matches!(infinite.validate(), Err(SpaceError::InvalidBounds { .. })));

        let ints = SearchSpace::new().add_integer("n", 5, 4, Prior::Uniform);
        assert!(matches!(ints.validate(), Err(SpaceError::InvalidBounds { .. })));
    }

    #[test]
    fn log_uniform_needs_positive_low() {
        let space = SearchSpace::new().add_log_real("lr", 0.0, 0.1);
        assert!(matches!(space.validate(), Err(SpaceError::InvalidPrior { .. })));

        let ints = SearchSpace::new().add_integer("n", 0, 10, Prior::LogUniform);
        assert!(matches!(ints.validate(), Err(SpaceError::InvalidPrior { .. })));
    }

    #[test]
    fn categorical_needs_distinct_choices() {
        let empty = SearchSpace::new().add_categorical("opt", vec![]);
        assert!(matches!(empty.validate(), Err(SpaceError::EmptyCategories { .. })));

        let dup = SearchSpace::new().add_categorical("opt", vec!["SGD".into(), "SGD".into()]);
        assert!(matches!(dup.validate(), Err(SpaceError::DuplicateCategory { .. })));
    }

    #[test]
    fn blank_name_is_rejected() {
        let space = SearchSpace::new().add_real("  ", 0.0, 1.0, Prior::Uniform);
        assert_eq!(space.validate(), Err(SpaceError::EmptyName { index: 0 }));
    }

    #[test]
    fn samples_respect_bounds() {
        let space = detection_space()
            .add_integer("epochs", 1, 300, Prior::LogUniform)
            .add_categorical("cos_lr", vec![true.into(), false.into()]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..500 {
            let point = space.sample(&mut rng);
            space.check_point(&point).unwrap();
        }
    }

    #[test]
    fn perturbation_stays_in_bounds() {
        let space = detection_space().add_integer("batch", 8, 64, Prior::Uniform);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let base: ParameterPoint = vec![0.99.into(), 0.1.into(), 0.0001.into(), 64i64.into()];
        for _ in 0..200 {
            let point: ParameterPoint = space
                .dimensions
                .iter()
                .zip(&base)
                .map(|(d, v)| d.perturb(v, &mut rng))
                .collect();
            space.check_point(&point).unwrap();
        }
    }

    #[test]
    fn full_range_integer_perturbs_without_overflow() {
        let dim = Dimension {
            name: "seed".into(),
            kind: DimensionKind::Integer {
                low: i64::MIN,
                high: i64::MAX,
                prior: Prior::Uniform,
            },
        };
        assert!(dim.validate().is_ok());
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for base in [i64::MIN, -1, 0, i64::MAX] {
            for _ in 0..50 {
                let value = dim.perturb(&ParameterValue::Int(base), &mut rng);
                dim.check(&value).unwrap();
            }
        }
    }

    #[test]
    fn to_named_preserves_order_and_checks_bounds() {
        let space = detection_space();
        let named = space
            .to_named(&[0.9.into(), 0.01.into(), 0.0005.into()])
            .unwrap();
        let names: Vec<&str> = named.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["momentum", "lr0", "weight_decay"]);
        assert_eq!(named.get("lr0"), Some(&ParameterValue::Float(0.01)));

        let err = space
            .to_named(&[0.5.into(), 0.01.into(), 0.0005.into()])
            .unwrap_err();
        assert!(matches!(err, SpaceError::OutOfBounds { name, .. } if name == "momentum"));
    }

    #[test]
    fn to_named_rejects_wrong_arity_and_type() {
        let space = detection_space();
        assert_eq!(
            space.to_named(&[0.9.into()]),
            Err(SpaceError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        );
        assert!(matches!(
            space.to_named(&[1i64.into(), 0.01.into(), 0.0005.into()]),
            Err(SpaceError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn parameter_values_keep_their_type_through_json() {
        let values: ParameterPoint = vec![
            ParameterValue::Int(3),
            ParameterValue::Float(3.0),
            ParameterValue::Float(1e-5),
            ParameterValue::Bool(true),
            ParameterValue::Text("SGD".into()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        let back: ParameterPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(values, back);
    }

    #[test]
    fn space_json_layout() {
        let space: SearchSpace = serde_json::from_value(serde_json::json!([
            {"name": "momentum", "kind": {"type": "real", "low": 0.8, "high": 0.99}},
            {"name": "lr0", "kind": {"type": "real", "low": 0.001, "high": 0.1, "prior": "log_uniform"}},
            {"name": "optimizer", "kind": {"type": "categorical", "categories": ["SGD", "Adam"]}}
        ]))
        .unwrap();
        assert_eq!(
            space,
            SearchSpace::new()
                .add_real("momentum", 0.8, 0.99, Prior::Uniform)
                .add_log_real("lr0", 0.001, 0.1)
                .add_categorical("optimizer", vec!["SGD".into(), "Adam".into()])
        );
    }
}
