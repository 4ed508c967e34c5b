//! Resumable, checkpointed minimization loop.

use chrono::Utc;
use ht_types::{config_error, HtResult};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::objective::{Evaluator, Objective};
use crate::result::{Reporter, SearchResult};
use crate::search::SearchSpace;
use crate::strategy::{build_strategy, SearchStrategy, StrategyKind};
use crate::trial::{EvaluationRecord, SearchHistory};

/// Lifecycle of a driver run.
///
/// `ColdStart → Resuming | Fresh → Evaluating ⇄ Checkpointing → Reporting → Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    ColdStart,
    Resuming,
    Fresh,
    Evaluating,
    Checkpointing,
    Reporting,
    Done,
}

/// Budget and sampling settings for one invocation of the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Evaluations to run in this invocation, on top of any resumed ones.
    pub n_calls: usize,
    /// Purely random evaluations before the strategy takes over.
    pub n_random_starts: usize,
    pub seed: u64,
    /// Probability of exploring instead of exploiting after the random phase.
    pub exploration_weight: f64,
    pub strategy: StrategyKind,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            n_calls: 75,
            n_random_starts: 10,
            seed: 0,
            exploration_weight: 0.3,
            strategy: StrategyKind::Bayesian,
        }
    }
}

impl SearchSettings {
    pub fn with_calls(mut self, n: usize) -> Self {
        self.n_calls = n;
        self
    }

    pub fn with_random_starts(mut self, n: usize) -> Self {
        self.n_random_starts = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Hook run after every evaluation, once the checkpoint is durable.
pub trait EvaluationCallback {
    fn on_evaluation(&mut self, checkpoint: &Checkpoint) -> HtResult<()>;
}

/// Drives a bounded, resumable black-box minimization.
///
/// Exactly one evaluation is in flight at a time. After each one the full
/// history is checkpointed before the strategy is asked for another point, so
/// an interrupted run loses at most the evaluation in progress. Objective
/// failures abort the run and leave the last checkpoint as the recovery point.
pub struct SearchDriver<E> {
    space: SearchSpace,
    objective: Objective<E>,
    settings: SearchSettings,
    strategy: Box<dyn SearchStrategy>,
    store: CheckpointStore,
    callbacks: Vec<Box<dyn EvaluationCallback>>,
    reporters: Vec<Box<dyn Reporter>>,
    state: DriverState,
}

impl<E: Evaluator> SearchDriver<E> {
    /// Validate the space and settings before anything expensive runs.
    pub fn new(
        space: SearchSpace,
        objective: Objective<E>,
        settings: SearchSettings,
        store: CheckpointStore,
    ) -> HtResult<Self> {
        space.validate()?;
        objective.check_space(&space)?;
        if !(0.0..=1.0).contains(&settings.exploration_weight) {
            return Err(config_error!(
                "exploration_weight must lie in [0, 1], got {}",
                settings.exploration_weight
            ));
        }

        let strategy = build_strategy(
            settings.strategy,
            space.clone(),
            settings.seed,
            settings.n_random_starts,
            settings.exploration_weight,
        );

        Ok(Self {
            space,
            objective,
            settings,
            strategy,
            store,
            callbacks: Vec::new(),
            reporters: Vec::new(),
            state: DriverState::ColdStart,
        })
    }

    /// Replace the configured strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn SearchStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_callback(mut self, callback: Box<dyn EvaluationCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn with_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn objective(&self) -> &Objective<E> {
        &self.objective
    }

    fn transition(&mut self, next: DriverState) {
        debug!(from = ?self.state, to = ?next, "driver state change");
        self.state = next;
    }

    /// Load prior progress and seed the strategy with it.
    fn resume(&mut self) -> HtResult<(Uuid, SearchHistory)> {
        self.transition(DriverState::ColdStart);
        let Some(checkpoint) = self.store.load()? else {
            self.transition(DriverState::Fresh);
            info!(
                "no checkpoint at {}, starting a fresh search",
                self.store.path().display()
            );
            return Ok((Uuid::new_v4(), SearchHistory::new()));
        };

        self.transition(DriverState::Resuming);
        checkpoint.validate_against(&self.space, self.store.path())?;
        if checkpoint.strategy != self.strategy.name() {
            return Err(ht_types::CheckpointError::StrategyMismatch {
                expected: self.strategy.name().to_string(),
                found: checkpoint.strategy,
            }
            .into());
        }
        self.strategy
            .restore(&checkpoint.history.records, &checkpoint.history.strategy_state)?;

        info!(
            run_id = %checkpoint.run_id,
            evaluations = checkpoint.history.len(),
            "resuming search from {}",
            self.store.path().display()
        );
        Ok((checkpoint.run_id, checkpoint.history))
    }

    /// Resume, spend the evaluation budget, then report.
    pub fn run(&mut self) -> HtResult<SearchResult> {
        let (run_id, mut history) = self.resume()?;
        let target = history.len() + self.settings.n_calls;
        if self.settings.n_calls == 0 {
            warn!("evaluation budget is zero; reporting existing history only");
        }

        info!(
            run_id = %run_id,
            strategy = self.strategy.name(),
            objective = %self.objective.describe(),
            "running {} evaluations ({} already recorded)",
            self.settings.n_calls,
            history.len()
        );

        while history.len() < target {
            self.transition(DriverState::Evaluating);
            let index = history.len();
            let point = self.strategy.suggest();
            let params = self.space.to_named(&point)?;

            let started = Instant::now();
            let evaluation = self.objective.evaluate(&params)?;
            let duration_seconds = started.elapsed().as_secs_f64();

            self.strategy.report(&point, evaluation.score);
            history.push(EvaluationRecord {
                index,
                point,
                score: evaluation.score,
                metrics: evaluation.metrics,
                duration_seconds,
                completed_at: Utc::now(),
            });
            history.strategy_state = self.strategy.snapshot()?;

            self.transition(DriverState::Checkpointing);
            let checkpoint = Checkpoint::new(run_id, self.strategy.name(), &self.space, &history);
            self.store.save(&checkpoint)?;
            for callback in &mut self.callbacks {
                callback.on_evaluation(&checkpoint)?;
            }

            let best = history.best().map(|r| r.score).unwrap_or(evaluation.score);
            info!(
                evaluation = index + 1,
                score = evaluation.score,
                best,
                duration_seconds,
                "evaluation {}/{} complete",
                index + 1,
                target
            );
        }

        self.transition(DriverState::Reporting);
        let result = SearchResult::from_history(run_id, &self.space, &history)?;
        for reporter in &mut self.reporters {
            reporter.report(&result)?;
        }
        self.transition(DriverState::Done);
        info!(
            best_score = result.best_score,
            evaluations = result.records.len(),
            "search finished"
        );
        Ok(result)
    }
}
