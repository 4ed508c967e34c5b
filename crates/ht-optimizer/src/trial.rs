//! Evaluation records and the accumulated search history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::search::ParameterPoint;

/// Named metrics reported by a trainer run.
pub type Metrics = BTreeMap<String, f64>;

/// Whether the underlying metric is better when higher or lower.
///
/// The driver always minimizes; maximized metrics are stored negated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// Convert a raw metric into a score to minimize.
    pub fn to_score(self, metric: f64) -> f64 {
        match self {
            Self::Maximize => -metric,
            Self::Minimize => metric,
        }
    }
}

/// One completed evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    /// Position in the full history, counting resumed records.
    pub index: usize,
    pub point: ParameterPoint,
    /// Score to minimize.
    pub score: f64,
    /// Raw trainer metrics the score was derived from.
    #[serde(default)]
    pub metrics: Metrics,
    pub duration_seconds: f64,
    pub completed_at: DateTime<Utc>,
}

/// Ordered evaluations plus the strategy state needed to continue sampling.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchHistory {
    pub records: Vec<EvaluationRecord>,
    #[serde(default)]
    pub strategy_state: serde_json::Value,
}

impl SearchHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: EvaluationRecord) {
        self.records.push(record);
    }

    /// The lowest-scoring record. Ties keep the earliest.
    pub fn best(&self) -> Option<&EvaluationRecord> {
        self.records.iter().fold(None, |best, r| match best {
            Some(b) if b.score <= r.score => Some(b),
            _ => Some(r),
        })
    }

    /// Best score seen up to and including each evaluation.
    pub fn convergence(&self) -> Vec<f64> {
        best_so_far(&record_scores(&self.records))
    }
}

/// Scores of `records`, in evaluation order.
pub fn record_scores(records: &[EvaluationRecord]) -> Vec<f64> {
    records.iter().map(|r| r.score).collect()
}

/// Running minimum of `scores`; non-increasing by construction.
pub fn best_so_far(scores: &[f64]) -> Vec<f64> {
    scores
        .iter()
        .scan(f64::INFINITY, |best, &score| {
            *best = best.min(score);
            Some(*best)
        })
        .collect()
}
