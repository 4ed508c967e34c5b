//! # ht-optimizer
//!
//! Checkpointed black-box parameter search for Hypertune.
//!
//! Provides search space definitions, seeded sampling strategies, the
//! objective boundary to an external trainer, durable checkpoints, and the
//! driver that ties them into a resumable minimization loop.

mod checkpoint;
mod driver;
mod objective;
mod result;
mod search;
mod strategy;
mod trial;

#[cfg(test)]
mod testing;

pub use checkpoint::{Checkpoint, CheckpointStore, CHECKPOINT_FORMAT_VERSION};
pub use driver::{DriverState, EvaluationCallback, SearchDriver, SearchSettings};
pub use objective::{
    Evaluation, Evaluator, MetricScore, Objective, Scorer, ScoringConfig, TrainerSettings,
    TrainingConfig, WeightedScore, WeightedTerm, DEFAULT_METRIC, RESERVED_KEYS,
};
pub use result::{Reporter, ResultWriter, SearchResult};
pub use search::{
    Dimension, DimensionKind, NamedParameters, NamedValue, ParameterPoint, ParameterValue, Prior,
    SearchSpace,
};
pub use strategy::{build_strategy, BayesianSearch, RandomSearch, SearchStrategy, StrategyKind};
pub use trial::{
    best_so_far, record_scores, EvaluationRecord, Metrics, ObjectiveDirection, SearchHistory,
};
