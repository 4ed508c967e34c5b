//! Objective boundary: fixed trainer settings, the evaluator seam and scoring.

use ht_types::ObjectiveError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::search::{NamedParameters, ParameterValue, SearchSpace};
use crate::trial::{Metrics, ObjectiveDirection};

/// Metric read from a detection validation run by default.
pub const DEFAULT_METRIC: &str = "metrics/recall(B)";

/// Trainer keys fixed by [`TrainerSettings`]; sampled parameters may not use them.
pub const RESERVED_KEYS: [&str; 6] = ["data", "epochs", "patience", "single_cls", "plots", "val"];

/// Fixed trainer configuration that every evaluation shares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerSettings {
    /// Dataset identifier (e.g. a dataset YAML).
    pub data: String,
    pub epochs: u32,
    /// Early-stopping patience in epochs.
    pub patience: u32,
    pub single_cls: bool,
    pub plots: bool,
    pub val: bool,
    /// Additional fixed keys passed through unchanged.
    pub extra: Map<String, Value>,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            data: "cocov11.yaml".to_string(),
            epochs: 100,
            patience: 10,
            single_cls: false,
            plots: true,
            val: true,
            extra: Map::new(),
        }
    }
}

impl TrainerSettings {
    /// Reject names that would shadow a fixed setting.
    pub fn check_names<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ObjectiveError> {
        let reserved = |key: &str| {
            if RESERVED_KEYS.contains(&key) {
                Err(ObjectiveError::ReservedKey {
                    key: key.to_string(),
                })
            } else {
                Ok(())
            }
        };
        names.into_iter().try_for_each(reserved)?;
        self.extra.keys().try_for_each(|key| reserved(key))
    }

    /// Merge sampled parameters over the extras, then apply the fixed keys.
    pub fn merge(&self, params: &NamedParameters) -> Result<TrainingConfig, ObjectiveError> {
        self.check_names(params.iter().map(|(name, _)| name))?;

        let mut values = self.extra.clone();
        for (name, value) in params.iter() {
            values.insert(name.to_string(), json_value(value));
        }
        values.insert("data".into(), Value::from(self.data.clone()));
        values.insert("epochs".into(), Value::from(self.epochs));
        values.insert("patience".into(), Value::from(self.patience));
        values.insert("single_cls".into(), Value::from(self.single_cls));
        values.insert("plots".into(), Value::from(self.plots));
        values.insert("val".into(), Value::from(self.val));
        Ok(TrainingConfig { values })
    }
}

fn json_value(value: &ParameterValue) -> Value {
    match value {
        ParameterValue::Int(v) => Value::from(*v),
        ParameterValue::Float(v) => Value::from(*v),
        ParameterValue::Bool(v) => Value::from(*v),
        ParameterValue::Text(v) => Value::from(v.clone()),
    }
}

/// The named configuration handed to a trainer for one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    values: Map<String, Value>,
}

impl TrainingConfig {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Render as `key=value` arguments; strings are passed unquoted.
    pub fn to_args(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
            .collect()
    }
}

/// Trains and validates a model for one configuration.
///
/// Calls are expensive and may leave artifacts behind; the driver never
/// retries them.
pub trait Evaluator {
    fn evaluate(&mut self, config: &TrainingConfig) -> Result<Metrics, ObjectiveError>;
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate(&mut self, config: &TrainingConfig) -> Result<Metrics, ObjectiveError> {
        (**self).evaluate(config)
    }
}

/// Turns trainer metrics into a score to minimize.
pub trait Scorer {
    fn score(&self, metrics: &Metrics) -> Result<f64, ObjectiveError>;

    fn describe(&self) -> String;
}

fn lookup(metrics: &Metrics, metric: &str) -> Result<f64, ObjectiveError> {
    let value = *metrics
        .get(metric)
        .ok_or_else(|| ObjectiveError::MissingMetric {
            metric: metric.to_string(),
        })?;
    if !value.is_finite() {
        return Err(ObjectiveError::NonFiniteMetric {
            metric: metric.to_string(),
            value,
        });
    }
    Ok(value)
}

/// Score on a single metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricScore {
    pub metric: String,
    pub direction: ObjectiveDirection,
}

impl Default for MetricScore {
    fn default() -> Self {
        Self {
            metric: DEFAULT_METRIC.to_string(),
            direction: ObjectiveDirection::Maximize,
        }
    }
}

impl Scorer for MetricScore {
    fn score(&self, metrics: &Metrics) -> Result<f64, ObjectiveError> {
        Ok(self.direction.to_score(lookup(metrics, &self.metric)?))
    }

    fn describe(&self) -> String {
        format!("{:?} {}", self.direction, self.metric)
    }
}

/// One term of a [`WeightedScore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub metric: String,
    pub weight: f64,
}

/// Score on a weighted sum of metrics (e.g. precision and recall).
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedScore {
    pub terms: Vec<WeightedTerm>,
    pub direction: ObjectiveDirection,
}

impl Scorer for WeightedScore {
    fn score(&self, metrics: &Metrics) -> Result<f64, ObjectiveError> {
        let mut total = 0.0;
        for term in &self.terms {
            total += term.weight * lookup(metrics, &term.metric)?;
        }
        Ok(self.direction.to_score(total))
    }

    fn describe(&self) -> String {
        let terms: Vec<String> = self
            .terms
            .iter()
            .map(|t| format!("{}*{}", t.weight, t.metric))
            .collect();
        format!("{:?} {}", self.direction, terms.join(" + "))
    }
}

/// Serializable scorer selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringConfig {
    Metric {
        metric: String,
        #[serde(default)]
        direction: ObjectiveDirection,
    },
    Weighted {
        terms: Vec<WeightedTerm>,
        #[serde(default)]
        direction: ObjectiveDirection,
    },
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self::Metric {
            metric: DEFAULT_METRIC.to_string(),
            direction: ObjectiveDirection::Maximize,
        }
    }
}

impl ScoringConfig {
    pub fn build(&self) -> Box<dyn Scorer> {
        match self {
            Self::Metric { metric, direction } => Box::new(MetricScore {
                metric: metric.clone(),
                direction: *direction,
            }),
            Self::Weighted { terms, direction } => Box::new(WeightedScore {
                terms: terms.clone(),
                direction: *direction,
            }),
        }
    }
}

/// Result of one objective call.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    pub metrics: Metrics,
}

/// The objective the driver minimizes. Owns its evaluator handle.
pub struct Objective<E> {
    evaluator: E,
    scorer: Box<dyn Scorer>,
    base: TrainerSettings,
}

impl<E: Evaluator> Objective<E> {
    pub fn new(evaluator: E, scorer: Box<dyn Scorer>, base: TrainerSettings) -> Self {
        Self {
            evaluator,
            scorer,
            base,
        }
    }

    /// Objective with the default negated-recall scorer.
    pub fn with_defaults(evaluator: E, base: TrainerSettings) -> Self {
        Self::new(evaluator, Box::new(MetricScore::default()), base)
    }

    /// Make sure no dimension would shadow a fixed trainer setting.
    pub fn check_space(&self, space: &SearchSpace) -> Result<(), ObjectiveError> {
        self.base.check_names(space.names())
    }

    pub fn describe(&self) -> String {
        self.scorer.describe()
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn evaluate(&mut self, params: &NamedParameters) -> Result<Evaluation, ObjectiveError> {
        let config = self.base.merge(params)?;
        let mut metrics = self.evaluator.evaluate(&config)?;
        let score = self.scorer.score(&metrics)?;
        metrics.retain(|name, value| {
            let keep = value.is_finite();
            if !keep {
                warn!(metric = %name, "dropping non-finite metric from record");
            }
            keep
        });
        Ok(Evaluation { score, metrics })
    }
}
