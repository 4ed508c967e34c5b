//! Stubs shared by the unit tests.

use chrono::Utc;
use ht_types::ObjectiveError;

use crate::objective::{Evaluator, TrainingConfig, DEFAULT_METRIC};
use crate::search::{ParameterPoint, Prior, SearchSpace};
use crate::trial::{EvaluationRecord, Metrics};

pub(crate) fn detection_space() -> SearchSpace {
    SearchSpace::new()
        .add_real("momentum", 0.8, 0.99, Prior::Uniform)
        .add_log_real("lr0", 0.001, 0.1)
        .add_log_real("weight_decay", 0.0001, 0.001)
}

pub(crate) fn record(index: usize, point: ParameterPoint, score: f64) -> EvaluationRecord {
    EvaluationRecord {
        index,
        point,
        score,
        metrics: Metrics::new(),
        duration_seconds: 0.0,
        completed_at: Utc::now(),
    }
}

/// Smooth recall surface peaking at momentum 0.937, lr0 0.01, weight_decay 5e-4.
#[derive(Debug, Default)]
pub(crate) struct RecallSurface {
    pub calls: usize,
    /// Fail every call once this many have succeeded.
    pub fail_after: Option<usize>,
}

impl RecallSurface {
    pub fn failing_after(n: usize) -> Self {
        Self {
            calls: 0,
            fail_after: Some(n),
        }
    }
}

impl Evaluator for RecallSurface {
    fn evaluate(&mut self, config: &TrainingConfig) -> Result<Metrics, ObjectiveError> {
        if self.fail_after.is_some_and(|n| self.calls >= n) {
            return Err(ObjectiveError::EvaluatorFailed {
                message: "CUDA out of memory".into(),
            });
        }
        self.calls += 1;

        let get = |key: &str| {
            config
                .get_f64(key)
                .ok_or_else(|| ObjectiveError::InvalidOutput {
                    message: format!("{key} missing from config"),
                })
        };
        let momentum = get("momentum")?;
        let lr0 = get("lr0")?;
        let weight_decay = get("weight_decay")?;

        let recall = 0.9
            - 10.0 * (momentum - 0.937).powi(2)
            - 0.01 * (lr0.ln() - 0.01f64.ln()).powi(2)
            - 0.01 * (weight_decay.ln() - 0.0005f64.ln()).powi(2);

        let mut metrics = Metrics::new();
        metrics.insert(DEFAULT_METRIC.to_string(), recall);
        metrics.insert("metrics/precision(B)".to_string(), recall * 0.9);
        Ok(metrics)
    }
}
