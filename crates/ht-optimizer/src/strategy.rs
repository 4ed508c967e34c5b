//! Sampling strategies that propose the next point to evaluate.

use ht_types::{internal_error, CheckpointError, HtResult};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::search::{ParameterPoint, SearchSpace};
use crate::trial::EvaluationRecord;

/// Common trait for all search strategies.
///
/// The driver calls `suggest` and `report` strictly alternately, one
/// evaluation at a time. `snapshot` is written into every checkpoint and
/// handed back to `restore` together with the recorded evaluations, which
/// must leave the strategy exactly where an uninterrupted run would be.
pub trait SearchStrategy: Send {
    /// Propose the next point to evaluate.
    fn suggest(&mut self) -> ParameterPoint;

    /// Report a completed evaluation so adaptive strategies can learn.
    fn report(&mut self, _point: &ParameterPoint, _score: f64) {}

    /// Internal state needed to resume sampling.
    fn snapshot(&self) -> HtResult<serde_json::Value>;

    /// Rebuild from prior evaluations and the last snapshot.
    fn restore(&mut self, records: &[EvaluationRecord], state: &serde_json::Value) -> HtResult<()>;

    /// Human-readable strategy name, stored in checkpoints.
    fn name(&self) -> &str;
}

/// Strategy selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Random,
    #[default]
    Bayesian,
}

/// Build a boxed strategy for `space`.
pub fn build_strategy(
    kind: StrategyKind,
    space: SearchSpace,
    seed: u64,
    n_random_starts: usize,
    exploration_weight: f64,
) -> Box<dyn SearchStrategy> {
    match kind {
        StrategyKind::Random => Box::new(RandomSearch::new(space, seed)),
        StrategyKind::Bayesian => Box::new(BayesianSearch::new(
            space,
            seed,
            n_random_starts,
            exploration_weight,
        )),
    }
}

/// Serializable position of a seeded ChaCha stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct RngState {
    seed: u64,
    word_pos: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StrategyState {
    rng: RngState,
}

/// A ChaCha RNG that remembers its seed so its position can be checkpointed.
#[derive(Debug, Clone)]
struct SeededRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SeededRng {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    fn snapshot(&self) -> HtResult<serde_json::Value> {
        let word_pos = u64::try_from(self.rng.get_word_pos())
            .map_err(|_| internal_error!("rng stream position overflowed u64"))?;
        let state = StrategyState {
            rng: RngState {
                seed: self.seed,
                word_pos,
            },
        };
        Ok(serde_json::to_value(state)?)
    }

    fn restore(&mut self, state: &serde_json::Value) -> HtResult<()> {
        if state.is_null() {
            // No saved stream: continue from a fresh one.
            *self = Self::new(self.seed);
            return Ok(());
        }
        let state: StrategyState =
            serde_json::from_value(state.clone()).map_err(|e| CheckpointError::Corrupt {
                path: "strategy_state".to_string(),
                message: e.to_string(),
            })?;
        if state.rng.seed != self.seed {
            warn!(
                checkpoint_seed = state.rng.seed,
                configured_seed = self.seed,
                "resuming with the checkpoint's seed"
            );
        }
        let mut rng = ChaCha8Rng::seed_from_u64(state.rng.seed);
        rng.set_word_pos(u128::from(state.rng.word_pos));
        self.seed = state.rng.seed;
        self.rng = rng;
        Ok(())
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
    rng: SeededRng,
}

impl RandomSearch {
    pub fn new(space: SearchSpace, seed: u64) -> Self {
        Self {
            space,
            rng: SeededRng::new(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self) -> ParameterPoint {
        self.space.sample(&mut self.rng.rng)
    }

    fn snapshot(&self) -> HtResult<serde_json::Value> {
        self.rng.snapshot()
    }

    fn restore(&mut self, _records: &[EvaluationRecord], state: &serde_json::Value) -> HtResult<()> {
        self.rng.restore(state)
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search (surrogate-model heuristic) ----

/// Model-guided search after an initial purely random phase.
///
/// The first `n_random_starts` evaluations of a run (counting resumed ones)
/// are independent random samples. Afterwards each suggestion either explores
/// (with probability `exploration_weight`) or perturbs the best point seen so
/// far. A real surrogate such as a Gaussian process can be dropped in by
/// implementing [`SearchStrategy`].
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: SearchSpace,
    rng: SeededRng,
    n_random_starts: usize,
    exploration_weight: f64,
    observations: Vec<(ParameterPoint, f64)>,
}

impl BayesianSearch {
    pub fn new(
        space: SearchSpace,
        seed: u64,
        n_random_starts: usize,
        exploration_weight: f64,
    ) -> Self {
        Self {
            space,
            rng: SeededRng::new(seed),
            n_random_starts,
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
            observations: Vec::new(),
        }
    }

    fn in_random_phase(&self) -> bool {
        self.observations.is_empty() || self.observations.len() < self.n_random_starts
    }

    fn explore(&mut self) -> ParameterPoint {
        self.space.sample(&mut self.rng.rng)
    }

    /// Exploitation: perturb the best-known (lowest score) point.
    fn exploit(&mut self) -> ParameterPoint {
        let best = self
            .observations
            .iter()
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(point, _)| point.clone());

        let Some(base) = best else {
            return self.explore();
        };

        let rng = &mut self.rng.rng;
        self.space
            .dimensions
            .iter()
            .zip(&base)
            .map(|(dim, value)| dim.perturb(value, rng))
            .collect()
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self) -> ParameterPoint {
        if self.in_random_phase() {
            return self.explore();
        }
        if self.rng.rng.random::<f64>() < self.exploration_weight {
            self.explore()
        } else {
            self.exploit()
        }
    }

    fn report(&mut self, point: &ParameterPoint, score: f64) {
        self.observations.push((point.clone(), score));
    }

    fn snapshot(&self) -> HtResult<serde_json::Value> {
        self.rng.snapshot()
    }

    fn restore(&mut self, records: &[EvaluationRecord], state: &serde_json::Value) -> HtResult<()> {
        self.observations = records
            .iter()
            .map(|r| (r.point.clone(), r.score))
            .collect();
        self.rng.restore(state)
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}
