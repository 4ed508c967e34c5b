//! Final search results and the reporters that consume them.

use ht_types::{validation_error, HtError, HtResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::checkpoint::write_atomic;
use crate::search::{NamedParameters, ParameterPoint, ParameterValue, SearchSpace};
use crate::trial::{EvaluationRecord, SearchHistory};

/// Best point, its score, and the full trace of a finished search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub run_id: Uuid,
    pub space: SearchSpace,
    pub best_index: usize,
    pub best_point: ParameterPoint,
    pub best_parameters: NamedParameters,
    pub best_score: f64,
    pub records: Vec<EvaluationRecord>,
    /// Best score so far after each evaluation.
    pub convergence: Vec<f64>,
}

impl SearchResult {
    pub fn from_history(run_id: Uuid, space: &SearchSpace, history: &SearchHistory) -> HtResult<Self> {
        let best = history
            .best()
            .ok_or_else(|| validation_error!("search finished without any evaluations"))?;
        let best_parameters = space.to_named(&best.point)?;

        Ok(Self {
            run_id,
            space: space.clone(),
            best_index: best.index,
            best_point: best.point.clone(),
            best_parameters,
            best_score: best.score,
            records: history.records.clone(),
            convergence: history.convergence(),
        })
    }

    /// Human-readable summary of the best point.
    pub fn summary(&self) -> String {
        let mut out = String::from("Best parameters:\n");
        for (name, value) in self.best_parameters.iter() {
            match value {
                ParameterValue::Float(v) => {
                    let _ = writeln!(out, "- {name}={v:.6}");
                }
                other => {
                    let _ = writeln!(out, "- {name}={other}");
                }
            }
        }
        let _ = write!(
            out,
            "Best score: {:.6} (evaluation {} of {})",
            self.best_score,
            self.best_index + 1,
            self.records.len()
        );
        out
    }

    pub fn save(&self, path: &Path) -> HtResult<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> HtResult<Self> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Consumes the final result once the evaluation budget is spent.
pub trait Reporter {
    fn report(&mut self, result: &SearchResult) -> HtResult<()>;
}

/// Persists the result as JSON, separate from the checkpoint.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    path: PathBuf,
}

impl ResultWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl Reporter for ResultWriter {
    fn report(&mut self, result: &SearchResult) -> HtResult<()> {
        result.save(&self.path).map_err(|e| match e {
            HtError::Io(io) => HtError::Report(format!(
                "writing result {}: {io}",
                self.path.display()
            )),
            other => other,
        })?;
        info!("search result written to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detection_space, record};

    fn finished_history() -> SearchHistory {
        let mut history = SearchHistory::new();
        let points = [
            (0.85, 0.02, 0.0002, -0.41),
            (0.93, 0.011, 0.0005, -0.78),
            (0.81, 0.09, 0.0009, -0.22),
        ];
        for (i, (m, lr, wd, score)) in points.iter().enumerate() {
            history.push(record(i, vec![(*m).into(), (*lr).into(), (*wd).into()], *score));
        }
        history
    }

    #[test]
    fn result_picks_lowest_score() {
        let result =
            SearchResult::from_history(Uuid::new_v4(), &detection_space(), &finished_history()).unwrap();
        assert_eq!(result.best_index, 1);
        assert_eq!(result.best_score, -0.78);
        assert_eq!(result.best_parameters.get("momentum"), Some(&ParameterValue::Float(0.93)));
        assert_eq!(result.convergence, vec![-0.41, -0.78, -0.78]);
    }

    #[test]
    fn empty_history_has_no_result() {
        let err = SearchResult::from_history(Uuid::new_v4(), &detection_space(), &SearchHistory::new())
            .unwrap_err();
        assert!(matches!(err, HtError::Validation(_)));
    }

    #[test]
    fn summary_lists_best_parameters() {
        let result =
            SearchResult::from_history(Uuid::new_v4(), &detection_space(), &finished_history()).unwrap();
        let summary = result.summary();
        assert!(summary.starts_with("Best parameters:\n"));
        assert!(summary.contains("- momentum=0.930000\n"));
        assert!(summary.contains("- lr0=0.011000\n"));
        assert!(summary.contains("- weight_decay=0.000500\n"));
        assert!(summary.contains("evaluation 2 of 3"));
    }

    #[test]
    fn writer_persists_result_separately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let result =
            SearchResult::from_history(Uuid::new_v4(), &detection_space(), &finished_history()).unwrap();

        ResultWriter::new(&path).report(&result).unwrap();
        assert_eq!(SearchResult::load(&path).unwrap(), result);
    }
}
